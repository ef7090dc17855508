//! Atomic JSON persistence.
//!
//! Writes go to a sibling temp file named after the process and thread, are
//! fsynced, and then renamed over the target. A reader never observes a
//! half-written file.

use crate::{LodestoneError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or an error if parsing fails.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LodestoneError::io_with_path(e, path)),
    };

    let data = serde_json::from_str(&contents).map_err(|e| LodestoneError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(Some(data))
}

/// Write data to a JSON file atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| LodestoneError::io_with_path(e, parent))?;
        }
    }

    let serialized = serde_json::to_string_pretty(data).map_err(|e| LodestoneError::Json {
        message: format!("Failed to serialize {}: {}", path.display(), e),
        source: Some(e),
    })?;

    let temp_path = temp_path_for(path);
    let write_result = write_synced(&temp_path, serialized.as_bytes());
    if let Err(e) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        LodestoneError::io_with_path(e, path)
    })?;

    debug!("Wrote {}", path.display());
    Ok(())
}

fn write_synced(temp_path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp_path)
        .map_err(|e| LodestoneError::io_with_path(e, temp_path))?;

    file.write_all(bytes)
        .and_then(|_| file.flush())
        .and_then(|_| file.sync_all())
        .map_err(|e| LodestoneError::io_with_path(e, temp_path))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let pid = std::process::id();
    let tid = format!("{:?}", std::thread::current().id())
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data.json".to_string());
    path.with_file_name(format!(".{}.{}.{}.tmp", file_name, pid, tid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/sample.json");
        let data = Sample {
            name: "game".into(),
            count: 3,
        };

        atomic_write_json(&path, &data).unwrap();
        let read: Option<Sample> = atomic_read_json(&path).unwrap();

        assert_eq!(read, Some(data));
    }

    #[test]
    fn test_read_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let read: Option<Sample> = atomic_read_json(&temp_dir.path().join("none.json")).unwrap();
        assert!(read.is_none());
    }

    #[test]
    fn test_read_corrupt_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        std::fs::write(&path, "{\"name\":").unwrap();

        let read: Result<Option<Sample>> = atomic_read_json(&path);
        assert!(matches!(read, Err(LodestoneError::Json { .. })));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sample.json");
        atomic_write_json(&path, &Sample { name: "a".into(), count: 1 }).unwrap();
        atomic_write_json(&path, &Sample { name: "b".into(), count: 2 }).unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1);
    }
}
