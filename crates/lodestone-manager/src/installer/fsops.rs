//! Filesystem moves used while laying out an installation.

use lodestone_core::{LodestoneError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// What to do when a moved entry already exists at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionPolicy {
    Overwrite,
    Skip,
}

/// Result of [`move_entries_into`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MoveSummary {
    pub moved: usize,
    pub skipped: Vec<PathBuf>,
}

/// Move every top-level entry of `src` into `dst`.
///
/// Directories that already exist under `Overwrite` are merged recursively.
pub fn move_entries_into(src: &Path, dst: &Path, policy: CollisionPolicy) -> Result<MoveSummary> {
    std::fs::create_dir_all(dst).map_err(|e| LodestoneError::io_with_path(e, dst))?;

    let mut summary = MoveSummary::default();
    for entry in read_dir_sorted(src)? {
        let name = match entry.file_name() {
            Some(name) => name.to_os_string(),
            None => continue,
        };
        let target = dst.join(&name);

        if target.exists() || target.is_symlink() {
            match policy {
                CollisionPolicy::Skip => {
                    debug!("Skipping {}: already present", target.display());
                    summary.skipped.push(target);
                    continue;
                }
                CollisionPolicy::Overwrite if entry.is_dir() && target.is_dir() => {
                    let nested = move_entries_into(&entry, &target, policy)?;
                    summary.moved += nested.moved;
                    summary.skipped.extend(nested.skipped);
                    continue;
                }
                CollisionPolicy::Overwrite => {
                    remove_existing(&target)?;
                }
            }
        }

        move_path(&entry, &target)?;
        summary.moved += 1;
    }

    Ok(summary)
}

/// Move a file or directory, falling back to copy+delete across filesystems.
pub fn move_path(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LodestoneError::io_with_path(e, parent))?;
    }

    match std::fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(LodestoneError::PermissionDenied(dest.to_path_buf()))
        }
        Err(_) => {
            if src.is_dir() {
                copy_dir_recursive(src, dest)?;
                std::fs::remove_dir_all(src).map_err(|e| LodestoneError::io_with_path(e, src))?;
            } else {
                std::fs::copy(src, dest).map_err(|e| LodestoneError::io_with_path(e, dest))?;
                std::fs::remove_file(src).map_err(|e| LodestoneError::io_with_path(e, src))?;
            }
            Ok(())
        }
    }
}

/// Recursively copy `src` into `dest`.
pub fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest).map_err(|e| LodestoneError::io_with_path(e, dest))?;

    for src_path in read_dir_sorted(src)? {
        let Some(name) = src_path.file_name() else {
            continue;
        };
        let dest_path = dest.join(name);

        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dest_path)?;
        } else {
            std::fs::copy(&src_path, &dest_path)
                .map_err(|e| LodestoneError::io_with_path(e, &dest_path))?;
        }
    }

    Ok(())
}

/// Remove empty directories from `start` upward, stopping at `stop`.
///
/// `stop` itself is never removed.
pub fn remove_empty_parents(start: &Path, stop: &Path) {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir == stop || !dir.starts_with(stop) {
            break;
        }
        let is_empty = std::fs::read_dir(dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !is_empty || std::fs::remove_dir(dir).is_err() {
            break;
        }
        debug!("Removed empty directory {}", dir.display());
        current = dir.parent();
    }
}

/// Directory listing in a stable order.
pub fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)
        .map_err(|e| LodestoneError::io_with_path(e, dir))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect::<Vec<_>>();
    entries.sort();
    Ok(entries)
}

fn remove_existing(path: &Path) -> Result<()> {
    let result = if path.is_dir() && !path.is_symlink() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|e| LodestoneError::io_with_path(e, path))
}
