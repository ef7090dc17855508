//! Lodestone Manager - installing, updating and launching titles.
//!
//! This crate drives the release pipeline on top of `lodestone-core`:
//! download an asset, unpack it, move its executable to the install root,
//! and work out how to start it on this host.
//!
//! # Modules
//!
//! - `installer` - Download, extract and lay out release assets
//! - `launch` - Pick the executable and any compatibility layer
//! - `progress` - Installation progress updates
//! - `title` - Per-title lifecycle state machine
//! - `manager` - Shared services and the entry point for callers

pub mod installer;
pub mod launch;
pub mod manager;
pub mod progress;
pub mod title;

// Re-export commonly used types
pub use installer::{
    ensure_executable_at_root, plan_asset, ArchiveInstaller, ArchiveKind, AssetPlan,
    FlattenOutcome, InstallReport,
};
pub use launch::{CompatProbe, CompatibilityKind, CompatibilityLayer, LaunchResolver, LaunchSpec};
pub use manager::ReleaseManager;
pub use progress::{InstallStage, ProgressUpdate};
pub use title::{TitleManager, TitleStatus};

// Re-export lodestone-core types that callers need alongside the manager
pub use lodestone_core::error::{LodestoneError, Result};
pub use lodestone_core::{CancellationToken, ManagerConfig, Release, TargetOs};
