//! Data models shared across Lodestone crates.

mod platform;
mod release;

pub use platform::{PlatformDescriptor, PlatformSource, TargetOs};
pub use release::{Asset, GitHubAsset, GitHubRelease, Release};
