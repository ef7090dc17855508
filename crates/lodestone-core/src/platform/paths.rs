//! Platform-specific directory paths.

use crate::config::{CacheConfig, PathsConfig};
use std::path::{Path, PathBuf};

/// Per-user configuration directory for Lodestone.
///
/// - **Linux**: `~/.config/lodestone`
/// - **macOS**: `~/Library/Application Support/lodestone`
/// - **Windows**: `%APPDATA%\lodestone`
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(PathsConfig::APP_DIR_NAME))
}

pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join(PathsConfig::CONFIG_FILE_NAME))
}

pub fn default_cache_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join(CacheConfig::CACHE_FILE_NAME))
}

/// Candidate Steam installation roots for the current user.
///
/// Only the native, symlinked and Flatpak layouts are listed; callers check
/// existence themselves.
pub fn steam_roots() -> Vec<PathBuf> {
    dirs::home_dir()
        .map(|home| steam_roots_under(&home))
        .unwrap_or_default()
}

/// Steam roots relative to a given home directory.
pub fn steam_roots_under(home: &Path) -> Vec<PathBuf> {
    vec![
        home.join(".steam/steam"),
        home.join(".steam/root"),
        home.join(".local/share/Steam"),
        home.join(".var/app/com.valvesoftware.Steam/data/Steam"),
    ]
}

/// Directories under a Steam root that may contain Proton runtimes.
pub fn proton_search_dirs(steam_root: &Path) -> [PathBuf; 2] {
    [
        steam_root.join("steamapps/common"),
        steam_root.join("compatibilitytools.d"),
    ]
}
