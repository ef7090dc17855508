//! Release and asset types.
//!
//! The upstream API payload is decoded into the `GitHub*` wire types and then
//! converted into the domain [`Release`]/[`Asset`] pair that the cache stores
//! and the installer consumes.

use serde::{Deserialize, Serialize};

/// A single downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub file_name: String,
    pub download_url: String,
}

impl Asset {
    pub fn new(file_name: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            download_url: download_url.into(),
        }
    }
}

/// A tagged release of a title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub tag: String,
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub is_prerelease: bool,
}

impl Release {
    /// Find an asset by exact file name.
    pub fn asset_named(&self, file_name: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.file_name == file_name)
    }
}

/// Release as returned by `GET /repos/{owner}/{repo}/releases`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

/// Asset entry inside a [`GitHubRelease`].
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

impl From<GitHubAsset> for Asset {
    fn from(asset: GitHubAsset) -> Self {
        Asset {
            file_name: asset.name,
            download_url: asset.browser_download_url,
        }
    }
}

impl From<GitHubRelease> for Release {
    fn from(release: GitHubRelease) -> Self {
        Release {
            tag: release.tag_name,
            assets: release.assets.into_iter().map(Asset::from).collect(),
            is_prerelease: release.prerelease,
        }
    }
}
