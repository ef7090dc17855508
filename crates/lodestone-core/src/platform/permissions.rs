//! Executable bit handling.

use crate::error::{LodestoneError, Result};
use std::path::Path;
use tracing::debug;

/// Make a file executable.
///
/// # Platform Behavior
/// - **Linux/macOS**: adds the execute bits (mode 0o755)
/// - **Windows**: no-op, executability follows the file extension
pub fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata =
            std::fs::metadata(path).map_err(|e| LodestoneError::io_with_path(e, path))?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(permissions.mode() | 0o755);
        std::fs::set_permissions(path, permissions)
            .map_err(|e| LodestoneError::io_with_path(e, path))?;
        debug!("Set executable permissions on: {}", path.display());
    }

    #[cfg(not(unix))]
    {
        if !path.exists() {
            return Err(LodestoneError::io_with_path(
                std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
                path,
            ));
        }
        debug!("Skipping executable bit for: {}", path.display());
    }

    Ok(())
}

/// Check if a file is executable.
///
/// # Platform Behavior
/// - **Linux/macOS**: any execute bit is set
/// - **Windows**: the extension is one of `.exe`, `.bat`, `.cmd`, `.com`
pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| matches!(ext.as_str(), "exe" | "bat" | "cmd" | "com"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    #[cfg(unix)]
    fn test_set_executable_unix() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("Game.x86_64");
        std::fs::write(&file_path, b"\x7fELF").unwrap();

        assert!(!is_executable(&file_path));
        set_executable(&file_path).unwrap();
        assert!(is_executable(&file_path));
    }

    #[test]
    fn test_set_executable_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(set_executable(&temp_dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_directory_is_not_executable_file() {
        let temp_dir = TempDir::new().unwrap();
        #[cfg(unix)]
        assert!(!is_executable(temp_dir.path()));
        let _ = temp_dir;
    }
}
