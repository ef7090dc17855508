//! Deletion with bounded retry.
//!
//! Freshly extracted executables can stay locked for a moment (antivirus
//! scanners on Windows, a lingering file handle elsewhere). Deletions retry a
//! few times with growing delays before giving up.

use crate::config::InstallationConfig;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Remove a file or directory tree, retrying with exponential backoff.
///
/// A path that does not exist counts as removed.
pub fn remove_path_with_retry(path: &Path, attempts: u32, base_delay: Duration) -> io::Result<()> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        match remove_path(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                if attempt + 1 < attempts {
                    let delay = base_delay * 2u32.saturating_pow(attempt);
                    debug!(
                        "Removing {} failed (attempt {}/{}): {}; retrying in {:?}",
                        path.display(),
                        attempt + 1,
                        attempts,
                        e,
                        delay
                    );
                    std::thread::sleep(delay);
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| io::Error::other("removal failed")))
}

/// Remove a path with the default retry policy, logging instead of failing.
///
/// Returns whether the path is gone.
pub fn remove_path_best_effort(path: &Path) -> bool {
    match remove_path_with_retry(
        path,
        InstallationConfig::DELETE_RETRY_ATTEMPTS,
        InstallationConfig::DELETE_RETRY_BASE_DELAY,
    ) {
        Ok(()) => true,
        Err(e) => {
            warn!("Could not remove {}: {}", path.display(), e);
            false
        }
    }
}

fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = std::fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}
