//! Release resolution against a version cache persisted on disk.

use async_trait::async_trait;
use lodestone_core::network::RetryConfig;
use lodestone_core::{
    Asset, FetchOutcome, LodestoneError, Release, ReleaseResolver, ReleaseSource, Result,
    VersionCache,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const REPO: &str = "studio/game";

fn release(tag: &str, prerelease: bool) -> Release {
    Release {
        tag: tag.to_string(),
        assets: vec![Asset::new(
            format!("Game-{}-linux-x86_64.tar.gz", tag),
            "https://example.invalid/game.tar.gz",
        )],
        is_prerelease: prerelease,
    }
}

/// Upstream whose answers can be swapped between calls.
struct Upstream {
    answer: Mutex<Option<Result<FetchOutcome>>>,
    validators: Mutex<Vec<Option<String>>>,
    calls: AtomicUsize,
}

impl Upstream {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(None),
            validators: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn answer(&self, outcome: Result<FetchOutcome>) {
        *self.answer.lock().unwrap() = Some(outcome);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseSource for Upstream {
    async fn fetch_releases(&self, _repo: &str, validator: Option<&str>) -> Result<FetchOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.validators
            .lock()
            .unwrap()
            .push(validator.map(str::to_string));
        self.answer
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(LodestoneError::Other("no answer scripted".into())))
    }
}

fn resolver(cache_path: &Path, upstream: Arc<Upstream>) -> ReleaseResolver {
    ReleaseResolver::new(Arc::new(VersionCache::load(cache_path)), upstream)
        .with_retry(RetryConfig::new().with_max_attempts(1).with_base_delay(Duration::ZERO))
}

#[tokio::test]
async fn test_resolution_persists_across_reload() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("state/version-cache.json");
    let upstream = Upstream::new();
    upstream.answer(Ok(FetchOutcome::Fetched {
        releases: vec![release("v2.0.0-beta", true), release("v1.4.0", false)],
        validator: Some("\"abc\"".to_string()),
    }));

    let first = resolver(&cache_path, upstream.clone());
    assert_eq!(first.resolve(REPO, false, false).await.unwrap().tag, "v1.4.0");
    assert!(cache_path.exists());

    let reloaded = resolver(&cache_path, upstream.clone());
    let entry = reloaded.cache().get(REPO).unwrap();
    assert_eq!(entry.resolved_version, "v1.4.0");
    assert_eq!(entry.validator_token.as_deref(), Some("\"abc\""));

    assert_eq!(reloaded.resolve(REPO, true, false).await.unwrap().tag, "v1.4.0");
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn test_forced_revalidation_sends_stored_validator() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("version-cache.json");
    let upstream = Upstream::new();
    upstream.answer(Ok(FetchOutcome::Fetched {
        releases: vec![release("v1.0.0", false)],
        validator: Some("\"etag-7\"".to_string()),
    }));
    let resolver = resolver(&cache_path, upstream.clone());
    resolver.resolve(REPO, true, false).await.unwrap();
    let checked_before = resolver.cache().get(REPO).unwrap().last_stale_check;

    upstream.answer(Ok(FetchOutcome::NotModified));
    let release = resolver.resolve(REPO, true, true).await.unwrap();

    assert_eq!(release.tag, "v1.0.0");
    assert_eq!(upstream.calls(), 2);
    assert_eq!(
        upstream.validators.lock().unwrap()[1].as_deref(),
        Some("\"etag-7\"")
    );
    assert!(resolver.cache().get(REPO).unwrap().last_stale_check >= checked_before);
}

#[tokio::test]
async fn test_outage_served_from_disk_cache() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("version-cache.json");
    let upstream = Upstream::new();
    upstream.answer(Ok(FetchOutcome::Fetched {
        releases: vec![release("v1.0.0", false)],
        validator: None,
    }));
    resolver(&cache_path, upstream.clone())
        .resolve(REPO, false, false)
        .await
        .unwrap();

    upstream.answer(Err(LodestoneError::UpstreamApi {
        message: "Service Unavailable".to_string(),
        status_code: Some(503),
    }));
    let restarted = resolver(&cache_path, upstream.clone());
    let release = restarted.resolve(REPO, false, true).await.unwrap();

    assert_eq!(release.tag, "v1.0.0");
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn test_outage_without_cache_is_unavailable() {
    let temp_dir = TempDir::new().unwrap();
    let upstream = Upstream::new();
    upstream.answer(Err(LodestoneError::UpstreamApi {
        message: "Bad Gateway".to_string(),
        status_code: Some(502),
    }));

    let err = resolver(&temp_dir.path().join("cache.json"), upstream)
        .resolve(REPO, false, false)
        .await
        .unwrap_err();
    assert!(matches!(err, LodestoneError::UpstreamUnavailable { .. }));
}

#[test]
fn test_corrupt_cache_file_starts_empty() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("version-cache.json");
    std::fs::write(&cache_path, b"{ not json").unwrap();

    let cache = VersionCache::load(&cache_path);
    assert!(cache.is_empty());
    assert!(cache.get(REPO).is_none());
}
