//! Per-repository version cache with conditional re-validation.
//!
//! Each repository maps to one [`CacheEntry`] holding the last resolved
//! version, the upstream validator token (`ETag`) and the release payload.
//! Freshness is tracked with two clocks:
//!
//! - `last_full_check` advances whenever a full payload was stored;
//! - `last_stale_check` advances on every successful revalidation, including
//!   "not modified" answers.
//!
//! The whole map is rewritten atomically after every mutation.

use crate::atomic::{atomic_read_json, atomic_write_json};
use crate::config::CacheConfig;
use crate::models::Release;
use crate::{LodestoneError, Result};
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Cached resolution state for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub resolved_version: String,
    #[serde(default)]
    pub validator_token: Option<String>,
    #[serde(default)]
    pub cached_release: Option<Release>,
    pub last_full_check: DateTime<Utc>,
    pub last_stale_check: DateTime<Utc>,
}

/// Version cache shared by every title of a release manager.
pub struct VersionCache {
    path: Option<PathBuf>,
    entries: DashMap<String, CacheEntry>,
    /// Serializes file writes; never held while a map shard is locked.
    persist_lock: Mutex<()>,
}

impl VersionCache {
    /// Cache that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: DashMap::new(),
            persist_lock: Mutex::new(()),
        }
    }

    /// Load the cache file, tolerating absence or corruption.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = DashMap::new();

        match atomic_read_json::<BTreeMap<String, CacheEntry>>(&path) {
            Ok(Some(stored)) => {
                for (repo, entry) in stored {
                    if entry.resolved_version.is_empty() {
                        warn!("Dropping cache entry for {} without a version", repo);
                        continue;
                    }
                    entries.insert(repo, entry);
                }
                debug!("Loaded {} version cache entries", entries.len());
            }
            Ok(None) => debug!("No version cache at {}", path.display()),
            Err(e) => warn!(
                "Ignoring unreadable version cache {}: {}",
                path.display(),
                e
            ),
        }

        Self {
            path: Some(path),
            entries,
            persist_lock: Mutex::new(()),
        }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the entry for a repository.
    pub fn get(&self, repo: &str) -> Option<CacheEntry> {
        self.entries.get(repo).map(|e| e.value().clone())
    }

    /// Record a full resolution for a repository.
    ///
    /// Empty or missing fields keep the previous entry's values. Both freshness
    /// clocks advance to now.
    pub fn put(
        &self,
        repo: &str,
        version: &str,
        validator_token: Option<String>,
        release: Option<Release>,
    ) -> Result<CacheEntry> {
        self.put_at(repo, version, validator_token, release, Utc::now())
    }

    pub fn put_at(
        &self,
        repo: &str,
        version: &str,
        validator_token: Option<String>,
        release: Option<Release>,
        now: DateTime<Utc>,
    ) -> Result<CacheEntry> {
        let validator_token = validator_token.filter(|t| !t.is_empty());

        let updated = match self.entries.entry(repo.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if !version.is_empty() {
                    entry.resolved_version = version.to_string();
                }
                if validator_token.is_some() {
                    entry.validator_token = validator_token;
                }
                if release.is_some() {
                    entry.cached_release = release;
                }
                entry.last_full_check = now;
                entry.last_stale_check = now;
                entry.clone()
            }
            Entry::Vacant(vacant) => {
                if version.is_empty() {
                    return Err(LodestoneError::Other(format!(
                        "Refusing to cache an empty version for {}",
                        repo
                    )));
                }
                let entry = CacheEntry {
                    resolved_version: version.to_string(),
                    validator_token,
                    cached_release: release,
                    last_full_check: now,
                    last_stale_check: now,
                };
                vacant.insert(entry.clone());
                entry
            }
        };

        self.persist()?;
        Ok(updated)
    }

    /// Record a "not modified" revalidation: only `last_stale_check` moves.
    ///
    /// Returns `false` when the repository has no entry.
    pub fn touch(&self, repo: &str) -> Result<bool> {
        self.touch_at(repo, Utc::now())
    }

    pub fn touch_at(&self, repo: &str, now: DateTime<Utc>) -> Result<bool> {
        match self.entries.get_mut(repo) {
            Some(mut entry) => entry.last_stale_check = now,
            None => return Ok(false),
        }
        self.persist()?;
        Ok(true)
    }

    /// Whether the upstream must be asked again for this repository.
    pub fn needs_revalidation(&self, repo: &str, installed: bool, force: bool) -> bool {
        self.needs_revalidation_at(repo, installed, force, Utc::now())
    }

    pub fn needs_revalidation_at(
        &self,
        repo: &str,
        installed: bool,
        force: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if force {
            return true;
        }

        let Some(entry) = self.entries.get(repo) else {
            return true;
        };
        if entry.cached_release.is_none() {
            return true;
        }

        if now - entry.last_full_check < interval(CacheConfig::FULL_CHECK_INTERVAL) {
            return false;
        }

        let stale_interval = if installed {
            CacheConfig::INSTALLED_STALE_INTERVAL
        } else {
            CacheConfig::NOT_INSTALLED_STALE_INTERVAL
        };
        now - entry.last_stale_check >= interval(stale_interval)
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self
            .persist_lock
            .lock()
            .map_err(|_| LodestoneError::Other("Version cache lock poisoned".to_string()))?;

        let snapshot: BTreeMap<String, CacheEntry> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        atomic_write_json(path, &snapshot)
    }
}

fn interval(duration: std::time::Duration) -> Duration {
    Duration::seconds(duration.as_secs() as i64)
}
