//! Marker files kept at an install root.
//!
//! - `version.txt` - installed release tag, written last on success
//! - `portable.txt` / `portable_disabled.txt` - mutually exclusive portability flag
//! - `selected_executable.txt` - absolute path of the chosen launch target
//! - `LastPlayed.txt` - RFC 3339 timestamp of the last launch

use lodestone_core::config::InstallationConfig;
use lodestone_core::{LodestoneError, Result};
use std::path::{Path, PathBuf};

/// Names of every marker file, so layout passes can ignore them.
pub const MARKER_FILES: &[&str] = &[
    InstallationConfig::VERSION_FILE,
    InstallationConfig::PORTABLE_FILE,
    InstallationConfig::PORTABLE_DISABLED_FILE,
    InstallationConfig::SELECTED_EXECUTABLE_FILE,
    InstallationConfig::LAST_PLAYED_FILE,
];

pub fn is_marker_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| MARKER_FILES.iter().any(|m| n == *m))
        .unwrap_or(false)
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn write_marker(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| LodestoneError::io_with_path(e, path))
}

fn remove_marker(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LodestoneError::io_with_path(e, path)),
    }
}

/// Installed version tag, if any.
pub fn read_version(install_dir: &Path) -> Option<String> {
    read_trimmed(&install_dir.join(InstallationConfig::VERSION_FILE))
}

pub fn write_version(install_dir: &Path, tag: &str) -> Result<()> {
    write_marker(&install_dir.join(InstallationConfig::VERSION_FILE), tag)
}

pub fn clear_version(install_dir: &Path) -> Result<()> {
    remove_marker(&install_dir.join(InstallationConfig::VERSION_FILE))
}

/// Create `portable.txt` unless either portability marker exists.
///
/// Returns `true` when a marker was created.
pub fn ensure_portable_marker(install_dir: &Path) -> Result<bool> {
    let enabled = install_dir.join(InstallationConfig::PORTABLE_FILE);
    let disabled = install_dir.join(InstallationConfig::PORTABLE_DISABLED_FILE);
    if enabled.exists() || disabled.exists() {
        return Ok(false);
    }
    write_marker(&enabled, "")?;
    Ok(true)
}

pub fn is_portable(install_dir: &Path) -> bool {
    install_dir.join(InstallationConfig::PORTABLE_FILE).exists()
}

/// Toggle portable mode by renaming between the two marker files.
pub fn set_portable(install_dir: &Path, portable: bool) -> Result<()> {
    let enabled = install_dir.join(InstallationConfig::PORTABLE_FILE);
    let disabled = install_dir.join(InstallationConfig::PORTABLE_DISABLED_FILE);
    let (from, to) = if portable {
        (disabled, enabled)
    } else {
        (enabled, disabled)
    };

    if from.exists() {
        if to.exists() {
            remove_marker(&from)
        } else {
            std::fs::rename(&from, &to).map_err(|e| LodestoneError::io_with_path(e, &to))
        }
    } else if to.exists() {
        Ok(())
    } else {
        write_marker(&to, "")
    }
}

/// Stored launch preference, resolved against the install directory.
pub fn read_selected_executable(install_dir: &Path) -> Option<PathBuf> {
    let stored = PathBuf::from(read_trimmed(
        &install_dir.join(InstallationConfig::SELECTED_EXECUTABLE_FILE),
    )?);
    if stored.is_absolute() {
        Some(stored)
    } else {
        Some(install_dir.join(stored))
    }
}

pub fn write_selected_executable(install_dir: &Path, executable: &Path) -> Result<()> {
    let absolute = if executable.is_absolute() {
        executable.to_path_buf()
    } else {
        install_dir.join(executable)
    };
    write_marker(
        &install_dir.join(InstallationConfig::SELECTED_EXECUTABLE_FILE),
        &absolute.to_string_lossy(),
    )
}

pub fn write_last_played(install_dir: &Path) -> Result<()> {
    write_marker(
        &install_dir.join(InstallationConfig::LAST_PLAYED_FILE),
        &chrono::Utc::now().to_rfc3339(),
    )
}

pub fn read_last_played(install_dir: &Path) -> Option<chrono::DateTime<chrono::Utc>> {
    let raw = read_trimmed(&install_dir.join(InstallationConfig::LAST_PLAYED_FILE))?;
    chrono::DateTime::parse_from_rfc3339(&raw)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_version_round_trip_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(read_version(temp_dir.path()), None);

        write_version(temp_dir.path(), "v2.0.1").unwrap();
        assert_eq!(read_version(temp_dir.path()).as_deref(), Some("v2.0.1"));

        clear_version(temp_dir.path()).unwrap();
        clear_version(temp_dir.path()).unwrap();
        assert_eq!(read_version(temp_dir.path()), None);
    }

    #[test]
    fn test_portable_marker_created_once() {
        let temp_dir = TempDir::new().unwrap();
        assert!(ensure_portable_marker(temp_dir.path()).unwrap());
        assert!(is_portable(temp_dir.path()));

        set_portable(temp_dir.path(), false).unwrap();
        assert!(!is_portable(temp_dir.path()));
        assert!(temp_dir
            .path()
            .join(InstallationConfig::PORTABLE_DISABLED_FILE)
            .exists());

        assert!(!ensure_portable_marker(temp_dir.path()).unwrap());
        assert!(!is_portable(temp_dir.path()));
    }

    #[test]
    fn test_set_portable_toggles() {
        let temp_dir = TempDir::new().unwrap();
        set_portable(temp_dir.path(), true).unwrap();
        assert!(is_portable(temp_dir.path()));
        set_portable(temp_dir.path(), true).unwrap();
        assert!(is_portable(temp_dir.path()));
        set_portable(temp_dir.path(), false).unwrap();
        set_portable(temp_dir.path(), true).unwrap();
        assert!(is_portable(temp_dir.path()));
        assert!(!temp_dir
            .path()
            .join(InstallationConfig::PORTABLE_DISABLED_FILE)
            .exists());
    }

    #[test]
    fn test_selected_executable_is_stored_absolute() {
        let temp_dir = TempDir::new().unwrap();
        write_selected_executable(temp_dir.path(), Path::new("bin/game")).unwrap();

        let raw = std::fs::read_to_string(
            temp_dir
                .path()
                .join(InstallationConfig::SELECTED_EXECUTABLE_FILE),
        )
        .unwrap();
        assert!(Path::new(&raw).is_absolute());
        assert_eq!(
            read_selected_executable(temp_dir.path()),
            Some(temp_dir.path().join("bin/game"))
        );
    }

    #[test]
    fn test_last_played_is_rfc3339() {
        let temp_dir = TempDir::new().unwrap();
        write_last_played(temp_dir.path()).unwrap();
        assert!(read_last_played(temp_dir.path()).is_some());
    }

    #[test]
    fn test_is_marker_file() {
        assert!(is_marker_file(Path::new("/x/version.txt")));
        assert!(!is_marker_file(Path::new("/x/game.exe")));
    }
}
