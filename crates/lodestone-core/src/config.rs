//! Centralized configuration for Lodestone.
//!
//! Compile-time constants live on unit structs grouped by concern. Values a
//! deployment may change (API endpoint, token, cache location, platform
//! override) live on [`ManagerConfig`], loaded from a JSON file and the
//! environment.

use crate::models::{PlatformDescriptor, TargetOs};
use crate::{LodestoneError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const DOWNLOAD_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    pub const GITHUB_API_BASE: &'static str = "https://api.github.com";
    pub const GITHUB_ACCEPT: &'static str = "application/vnd.github+json";
    pub const GITHUB_RELEASES_PER_PAGE: u32 = 30;
    pub const FETCH_RETRY_ATTEMPTS: u32 = 3;
    pub const FETCH_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
    /// Pause before each request to a host whose rate limit is nearly spent.
    pub const LOW_BUDGET_PAUSE: Duration = Duration::from_millis(500);
    pub const USER_AGENT: &'static str = "Lodestone/0.3";
}

/// Version cache freshness windows.
pub struct CacheConfig;

impl CacheConfig {
    /// A full check younger than this is trusted without any request.
    pub const FULL_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
    /// Conditional re-validation interval for installed titles.
    pub const INSTALLED_STALE_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
    /// Conditional re-validation interval for titles not installed.
    pub const NOT_INSTALLED_STALE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
    pub const CACHE_FILE_NAME: &'static str = "version-cache.json";
}

/// Installation and on-disk layout constants.
pub struct InstallationConfig;

impl InstallationConfig {
    pub const VERSION_FILE: &'static str = "version.txt";
    pub const PORTABLE_FILE: &'static str = "portable.txt";
    pub const PORTABLE_DISABLED_FILE: &'static str = "portable_disabled.txt";
    pub const SELECTED_EXECUTABLE_FILE: &'static str = "selected_executable.txt";
    pub const LAST_PLAYED_FILE: &'static str = "LastPlayed.txt";

    /// Extensionless files below this size are not treated as executables.
    pub const MIN_EXTENSIONLESS_EXECUTABLE_BYTES: u64 = 64 * 1024;

    /// Bounded retries for deleting scratch data and replaced directories.
    pub const DELETE_RETRY_ATTEMPTS: u32 = 4;
    pub const DELETE_RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

    pub const SCRATCH_DIR_PREFIX: &'static str = ".lodestone-";

    /// Per-title prefix directories for compatibility layers.
    pub const PROTON_COMPAT_DATA_DIR: &'static str = "compatdata";
    pub const WINE_PREFIX_DIR: &'static str = "wineprefix";
}

/// Shared directory and path configurations.
pub struct PathsConfig;

impl PathsConfig {
    pub const APP_DIR_NAME: &'static str = "lodestone";
    pub const CONFIG_FILE_NAME: &'static str = "config.json";
}

/// Environment variables consulted by [`ManagerConfig::with_env_overrides`].
pub struct EnvVars;

impl EnvVars {
    pub const TOKEN: &'static str = "LODESTONE_GITHUB_TOKEN";
    pub const GITHUB_TOKEN: &'static str = "GITHUB_TOKEN";
    pub const API_BASE: &'static str = "LODESTONE_API_BASE";
    pub const PLATFORM: &'static str = "LODESTONE_PLATFORM";
    pub const CACHE_FILE: &'static str = "LODESTONE_CACHE_FILE";
    pub const LOG: &'static str = "LODESTONE_LOG";
}

/// Runtime configuration for a release manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    /// Base URL of the release API.
    pub api_base: String,
    /// Optional bearer token sent with API requests.
    pub github_token: Option<String>,
    /// Location of the version cache file.
    pub cache_file: Option<PathBuf>,
    /// Forces a target platform instead of detecting the host.
    pub platform_override: Option<TargetOs>,
    pub request_timeout_secs: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            api_base: NetworkConfig::GITHUB_API_BASE.to_string(),
            github_token: None,
            cache_file: None,
            platform_override: None,
            request_timeout_secs: NetworkConfig::REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| LodestoneError::io_with_path(e, path))?;
        serde_json::from_str(&contents).map_err(|e| LodestoneError::Config {
            message: format!("Invalid config file {}: {}", path.display(), e),
        })
    }

    /// Load from the per-user config directory and apply environment overrides.
    pub fn from_default_location() -> Result<Self> {
        let config = match crate::platform::paths::config_file() {
            Some(path) => Self::load(&path)?,
            None => {
                warn!("Could not determine config directory, using defaults");
                Self::default()
            }
        };
        Ok(config.with_env_overrides())
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(base) = non_empty(EnvVars::API_BASE) {
            self.api_base = base;
        }
        if let Some(path) = non_empty(EnvVars::CACHE_FILE) {
            self.cache_file = Some(PathBuf::from(path));
        }
        if let Some(platform) = non_empty(EnvVars::PLATFORM) {
            match platform.parse::<TargetOs>() {
                Ok(os) => self.platform_override = Some(os),
                Err(e) => warn!("Ignoring {}: {}", EnvVars::PLATFORM, e),
            }
        }

        // Token lookup order: config file, then dedicated variable, then GITHUB_TOKEN.
        let configured = self
            .github_token
            .take()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self.github_token = configured
            .or_else(|| non_empty(EnvVars::TOKEN))
            .or_else(|| non_empty(EnvVars::GITHUB_TOKEN));

        self
    }

    /// Cache file location, falling back to the per-user config directory.
    pub fn cache_path(&self) -> PathBuf {
        self.cache_file
            .clone()
            .or_else(crate::platform::paths::default_cache_file)
            .unwrap_or_else(|| PathBuf::from(CacheConfig::CACHE_FILE_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Platform every operation of this manager targets.
    pub fn platform(&self) -> PlatformDescriptor {
        PlatformDescriptor::resolve(self.platform_override)
    }
}
