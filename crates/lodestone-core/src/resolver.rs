//! Release resolution on top of the version cache.
//!
//! Order of operations for [`ReleaseResolver::resolve`]:
//! 1. Cached release inside its freshness window: returned, no request.
//! 2. Otherwise a conditional request with the stored validator.
//!    - not modified: the stale clock advances, cached release returned
//!    - new listing: stable-first selection, cache updated
//! 3. Upstream failures fall back to the cached release when there is one.

use crate::cache::VersionCache;
use crate::config::NetworkConfig;
use crate::models::Release;
use crate::network::github::{FetchOutcome, ReleaseSource};
use crate::network::retry::{retry_async, RetryConfig};
use crate::{LodestoneError, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pick the release to offer: the newest stable one, else the newest
/// prerelease. Upstream lists newest first.
pub fn select_release(releases: &[Release]) -> Option<&Release> {
    releases
        .iter()
        .find(|r| !r.is_prerelease)
        .or_else(|| releases.first())
}

/// Resolves the current release of a repository.
pub struct ReleaseResolver {
    cache: Arc<VersionCache>,
    source: Arc<dyn ReleaseSource>,
    retry: RetryConfig,
}

impl ReleaseResolver {
    pub fn new(cache: Arc<VersionCache>, source: Arc<dyn ReleaseSource>) -> Self {
        Self {
            cache,
            source,
            retry: RetryConfig::new()
                .with_max_attempts(NetworkConfig::FETCH_RETRY_ATTEMPTS)
                .with_base_delay(NetworkConfig::FETCH_RETRY_BASE_DELAY),
        }
    }

    /// Override the retry policy for upstream requests.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &Arc<VersionCache> {
        &self.cache
    }

    /// Last resolved release for a repository, without any network traffic.
    pub fn current_release(&self, repo: &str) -> Option<Release> {
        self.cache.get(repo).and_then(|e| e.cached_release)
    }

    /// Resolve the release to offer for `repo`.
    ///
    /// `installed` selects the shorter revalidation interval; `force_revalidate`
    /// skips the freshness window entirely.
    pub async fn resolve(
        &self,
        repo: &str,
        installed: bool,
        force_revalidate: bool,
    ) -> Result<Release> {
        let cached = self.current_release(repo);

        if !self.cache.needs_revalidation(repo, installed, force_revalidate) {
            if let Some(release) = cached {
                debug!("Using cached release {} for {}", release.tag, repo);
                return Ok(release);
            }
        }

        let validator = cached
            .as_ref()
            .and_then(|_| self.cache.get(repo))
            .and_then(|e| e.validator_token);

        match self.fetch(repo, validator.as_deref()).await {
            Ok(FetchOutcome::NotModified) => match cached {
                Some(release) => {
                    if let Err(e) = self.cache.touch(repo) {
                        warn!("Failed to persist revalidation of {}: {}", repo, e);
                    }
                    debug!("Release {} for {} still current", release.tag, repo);
                    Ok(release)
                }
                None => self.refetch_unconditionally(repo).await,
            },
            Ok(FetchOutcome::Fetched {
                releases,
                validator,
            }) => self.store(repo, &releases, validator),
            Err(e) => self.fallback(repo, cached, e),
        }
    }

    async fn fetch(&self, repo: &str, validator: Option<&str>) -> Result<FetchOutcome> {
        retry_async(
            &self.retry,
            || self.source.fetch_releases(repo, validator),
            |e: &LodestoneError| e.is_retryable(),
        )
        .await
    }

    /// A 304 without anything cached to stand behind it: ask again without
    /// the validator.
    async fn refetch_unconditionally(&self, repo: &str) -> Result<Release> {
        warn!("Not modified for {} but nothing cached, refetching", repo);
        match self.fetch(repo, None).await {
            Ok(FetchOutcome::Fetched {
                releases,
                validator,
            }) => self.store(repo, &releases, validator),
            Ok(FetchOutcome::NotModified) => Err(LodestoneError::UpstreamUnavailable {
                repo: repo.to_string(),
                message: "Upstream answered not modified to an unconditional request".to_string(),
            }),
            Err(e) => self.fallback(repo, None, e),
        }
    }

    fn store(&self, repo: &str, releases: &[Release], validator: Option<String>) -> Result<Release> {
        let release = select_release(releases)
            .cloned()
            .ok_or_else(|| LodestoneError::NoReleasesFound {
                repo: repo.to_string(),
            })?;

        if let Err(e) = self
            .cache
            .put(repo, &release.tag, validator, Some(release.clone()))
        {
            warn!("Failed to persist version cache for {}: {}", repo, e);
        }
        info!("Resolved {} to {}", repo, release.tag);
        Ok(release)
    }

    fn fallback(&self, repo: &str, cached: Option<Release>, error: LodestoneError) -> Result<Release> {
        match cached {
            Some(release) if error.allows_cache_fallback() => {
                warn!(
                    "Upstream failed for {} ({}), using cached release {}",
                    repo, error, release.tag
                );
                Ok(release)
            }
            _ if error.allows_cache_fallback() => Err(LodestoneError::UpstreamUnavailable {
                repo: repo.to_string(),
                message: error.to_string(),
            }),
            _ => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Asset;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn release(tag: &str, prerelease: bool) -> Release {
        Release {
            tag: tag.to_string(),
            assets: vec![Asset::new("Game-linux-x86_64.tar.gz", "https://x/g.tar.gz")],
            is_prerelease: prerelease,
        }
    }

    /// Scripted upstream that records every call.
    struct ScriptedSource {
        responses: Mutex<Vec<Result<FetchOutcome>>>,
        calls: AtomicUsize,
        validators: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<FetchOutcome>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
                validators: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReleaseSource for ScriptedSource {
        async fn fetch_releases(&self, _repo: &str, validator: Option<&str>) -> Result<FetchOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.validators
                .lock()
                .unwrap()
                .push(validator.map(str::to_string));
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                panic!("unexpected upstream call");
            }
            responses.remove(0)
        }
    }

    fn fetched(releases: Vec<Release>, etag: &str) -> Result<FetchOutcome> {
        Ok(FetchOutcome::Fetched {
            releases,
            validator: Some(etag.to_string()),
        })
    }

    fn resolver(source: Arc<ScriptedSource>) -> ReleaseResolver {
        ReleaseResolver::new(Arc::new(VersionCache::in_memory()), source)
            .with_retry(RetryConfig::new().with_max_attempts(1))
    }

    #[test]
    fn test_select_release_prefers_stable() {
        let releases = vec![release("v2.0-beta", true), release("v1.9", false)];
        assert_eq!(select_release(&releases).map(|r| r.tag.as_str()), Some("v1.9"));

        let only_pre = vec![release("v2.0-rc2", true), release("v2.0-rc1", true)];
        assert_eq!(
            select_release(&only_pre).map(|r| r.tag.as_str()),
            Some("v2.0-rc2")
        );
        assert!(select_release(&[]).is_none());
    }

    #[tokio::test]
    async fn test_second_resolve_in_window_makes_no_request() {
        let source = ScriptedSource::new(vec![fetched(vec![release("v1.0", false)], "e1")]);
        let resolver = resolver(source.clone());

        let first = resolver.resolve("owner/game", false, false).await.unwrap();
        let second = resolver.resolve("owner/game", false, false).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_not_modified_keeps_release_and_sends_validator() {
        let source = ScriptedSource::new(vec![
            fetched(vec![release("v1.0", false)], "\"e1\""),
            Ok(FetchOutcome::NotModified),
        ]);
        let resolver = resolver(source.clone());

        resolver.resolve("owner/game", true, false).await.unwrap();
        let before = resolver.cache().get("owner/game").unwrap();
        let again = resolver.resolve("owner/game", true, true).await.unwrap();
        let after = resolver.cache().get("owner/game").unwrap();

        assert_eq!(again.tag, "v1.0");
        assert_eq!(after.cached_release, before.cached_release);
        assert_eq!(after.last_full_check, before.last_full_check);
        assert!(after.last_stale_check >= before.last_stale_check);
        assert_eq!(
            source.validators.lock().unwrap().clone(),
            vec![None, Some("\"e1\"".to_string())]
        );
    }

    #[tokio::test]
    async fn test_new_release_replaces_cache() {
        let source = ScriptedSource::new(vec![
            fetched(vec![release("v1.0", false)], "e1"),
            fetched(vec![release("v1.1", false), release("v1.0", false)], "e2"),
        ]);
        let resolver = resolver(source);

        resolver.resolve("owner/game", true, false).await.unwrap();
        let updated = resolver.resolve("owner/game", true, true).await.unwrap();

        assert_eq!(updated.tag, "v1.1");
        let entry = resolver.cache().get("owner/game").unwrap();
        assert_eq!(entry.resolved_version, "v1.1");
        assert_eq!(entry.validator_token.as_deref(), Some("e2"));
    }

    #[tokio::test]
    async fn test_empty_listing_is_no_releases() {
        let source = ScriptedSource::new(vec![fetched(vec![], "e0")]);
        let err = resolver(source)
            .resolve("owner/game", false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, LodestoneError::NoReleasesFound { .. }));
    }

    #[tokio::test]
    async fn test_network_failure_falls_back_to_cache() {
        let source = ScriptedSource::new(vec![
            fetched(vec![release("v1.0", false)], "e1"),
            Err(LodestoneError::Network {
                message: "connection reset".into(),
                source: None,
            }),
        ]);
        let resolver = resolver(source);

        resolver.resolve("owner/game", true, false).await.unwrap();
        let fallback = resolver.resolve("owner/game", true, true).await.unwrap();
        assert_eq!(fallback.tag, "v1.0");
    }

    #[tokio::test]
    async fn test_failure_without_cache_is_upstream_unavailable() {
        let source = ScriptedSource::new(vec![Err(LodestoneError::UpstreamApi {
            message: "boom".into(),
            status_code: Some(503),
        })]);
        let err = resolver(source)
            .resolve("owner/game", false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, LodestoneError::UpstreamUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_not_modified_without_cache_refetches() {
        let source = ScriptedSource::new(vec![
            Ok(FetchOutcome::NotModified),
            fetched(vec![release("v3.0", false)], "e3"),
        ]);
        let resolver = resolver(source.clone());

        let resolved = resolver.resolve("owner/game", false, false).await.unwrap();
        assert_eq!(resolved.tag, "v3.0");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors() {
        let source = ScriptedSource::new(vec![
            Err(LodestoneError::Timeout(std::time::Duration::from_secs(1))),
            fetched(vec![release("v1.0", false)], "e1"),
        ]);
        let resolver = ReleaseResolver::new(Arc::new(VersionCache::in_memory()), source.clone())
            .with_retry(
                RetryConfig::new()
                    .with_max_attempts(2)
                    .with_base_delay(std::time::Duration::from_millis(10)),
            );

        let resolved = resolver.resolve("owner/game", false, false).await.unwrap();
        assert_eq!(resolved.tag, "v1.0");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_current_release_accessor() {
        let source = ScriptedSource::new(vec![fetched(vec![release("v1.0", false)], "e1")]);
        let resolver = resolver(source);
        assert!(resolver.current_release("owner/game").is_none());

        resolver.resolve("owner/game", false, false).await.unwrap();
        assert_eq!(
            resolver.current_release("owner/game").map(|r| r.tag),
            Some("v1.0".to_string())
        );
    }
}
