//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific behavior live in this module rather
//! than being scattered across the installer and launcher.
//!
//! - `paths` - per-user directories and Steam installation roots
//! - `permissions` - executable bits
//! - `fs` - deletion with bounded retry

pub mod fs;
pub mod paths;
pub mod permissions;

pub use fs::{remove_path_best_effort, remove_path_with_retry};
pub use permissions::{is_executable, set_executable};

use crate::models::TargetOs;
use std::path::Path;

/// Returns the current platform name.
pub fn current_platform() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(target_os = "windows")]
    {
        "windows"
    }
    #[cfg(target_os = "macos")]
    {
        "macos"
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        "unknown"
    }
}

/// Target OS matching the running host.
///
/// Linux hosts running inside a Flatpak sandbox report
/// [`TargetOs::LinuxFlatpak`]; unknown Unix flavours fall back to Linux x64.
pub fn host_target_os() -> TargetOs {
    match current_platform() {
        "windows" => TargetOs::Windows,
        "macos" => TargetOs::MacOS,
        _ => {
            if is_flatpak_sandbox() {
                TargetOs::LinuxFlatpak
            } else if matches!(std::env::consts::ARCH, "aarch64" | "arm") {
                TargetOs::LinuxArm64
            } else {
                TargetOs::LinuxX64
            }
        }
    }
}

fn is_flatpak_sandbox() -> bool {
    std::env::var_os("FLATPAK_ID").is_some() || Path::new("/.flatpak-info").exists()
}
