//! Lodestone Core - release resolution building blocks.
//!
//! This crate knows how to find out which release of a title is current and
//! which of its assets fits the running platform:
//!
//! - [`VersionCache`] remembers resolutions and decides when to revalidate
//! - [`matcher`] maps asset file names onto platforms
//! - [`ReleaseResolver`] combines both with a [`ReleaseSource`]
//!
//! Installing and launching live in the `lodestone-manager` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use lodestone_core::{ManagerConfig, ReleaseResolver, VersionCache};
//! use lodestone_core::network::{GitHubReleaseSource, HttpClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> lodestone_core::Result<()> {
//!     let config = ManagerConfig::from_default_location()?;
//!     let http = Arc::new(HttpClient::with_timeout(config.request_timeout())?);
//!     let cache = Arc::new(VersionCache::load(config.cache_path()));
//!     let source = Arc::new(GitHubReleaseSource::from_config(&config, http));
//!
//!     let resolver = ReleaseResolver::new(cache, source);
//!     let release = resolver.resolve("owner/game", false, false).await?;
//!     println!("Latest: {}", release.tag);
//!     Ok(())
//! }
//! ```

pub mod atomic;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod models;
pub mod network;
pub mod platform;
pub mod resolver;

pub use cache::{CacheEntry, VersionCache};
pub use cancel::CancellationToken;
pub use config::ManagerConfig;
pub use error::{LodestoneError, Result};
pub use models::{Asset, PlatformDescriptor, PlatformSource, Release, TargetOs};
pub use network::{FetchOutcome, ReleaseSource};
pub use resolver::{select_release, ReleaseResolver};
