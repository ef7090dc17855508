//! Top-level entry point wiring the shared components together.

use crate::installer::ArchiveInstaller;
use crate::launch::{CompatProbe, LaunchResolver};
use crate::title::TitleManager;
use lodestone_core::network::github::validate_repo;
use lodestone_core::network::{GitHubReleaseSource, HttpClient};
use lodestone_core::{
    ManagerConfig, PlatformDescriptor, ReleaseResolver, ReleaseSource, Result, VersionCache,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Owns the version cache and the services every title shares.
///
/// Construct one per process and hand out [`TitleManager`]s from it.
pub struct ReleaseManager {
    config: ManagerConfig,
    platform: PlatformDescriptor,
    cache: Arc<VersionCache>,
    resolver: Arc<ReleaseResolver>,
    installer: Arc<ArchiveInstaller>,
    launcher: Arc<LaunchResolver>,
}

impl ReleaseManager {
    /// Build a manager that talks to the configured release API.
    pub fn new(config: ManagerConfig) -> Result<Self> {
        let http = Arc::new(HttpClient::with_timeout(config.request_timeout())?);
        let source = Arc::new(GitHubReleaseSource::from_config(&config, http.clone()));
        let cache = Arc::new(VersionCache::load(config.cache_path()));
        Ok(Self::with_parts(
            config,
            cache,
            source,
            http,
            CompatProbe::from_env(),
        ))
    }

    /// Load configuration from the per-user config file and environment.
    pub fn from_default_location() -> Result<Self> {
        Self::new(ManagerConfig::from_default_location()?)
    }

    /// Build a manager from explicit parts.
    pub fn with_parts(
        config: ManagerConfig,
        cache: Arc<VersionCache>,
        source: Arc<dyn ReleaseSource>,
        http: Arc<HttpClient>,
        probe: CompatProbe,
    ) -> Self {
        let platform = config.platform();
        info!(
            "Release manager targeting {} ({:?}), cache at {:?}",
            platform.os,
            platform.source,
            cache.path()
        );

        Self {
            resolver: Arc::new(ReleaseResolver::new(cache.clone(), source)),
            installer: Arc::new(ArchiveInstaller::new(http)),
            launcher: Arc::new(LaunchResolver::new(probe)),
            config,
            platform,
            cache,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn platform(&self) -> PlatformDescriptor {
        self.platform
    }

    pub fn cache(&self) -> &Arc<VersionCache> {
        &self.cache
    }

    pub fn resolver(&self) -> &Arc<ReleaseResolver> {
        &self.resolver
    }

    /// Manager for `repo` installed at `install_dir`.
    pub fn title(&self, repo: &str, install_dir: impl Into<PathBuf>) -> Result<TitleManager> {
        validate_repo(repo)?;
        Ok(TitleManager::new(
            repo,
            install_dir,
            self.platform,
            self.resolver.clone(),
            self.installer.clone(),
            self.launcher.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_core::{FetchOutcome, LodestoneError, TargetOs};

    struct EmptySource;

    #[async_trait::async_trait]
    impl ReleaseSource for EmptySource {
        async fn fetch_releases(&self, _repo: &str, _validator: Option<&str>) -> Result<FetchOutcome> {
            Ok(FetchOutcome::Fetched {
                releases: Vec::new(),
                validator: None,
            })
        }
    }

    fn manager() -> ReleaseManager {
        let config = ManagerConfig {
            platform_override: Some(TargetOs::LinuxArm64),
            ..ManagerConfig::default()
        };
        ReleaseManager::with_parts(
            config,
            Arc::new(VersionCache::in_memory()),
            Arc::new(EmptySource),
            Arc::new(HttpClient::new().unwrap()),
            CompatProbe::empty(),
        )
    }

    #[test]
    fn test_platform_override_applies_to_titles() {
        let manager = manager();
        let title = manager.title("owner/game", "/tmp/lodestone-game").unwrap();
        assert_eq!(title.platform().os, TargetOs::LinuxArm64);
        assert_eq!(manager.platform().os, TargetOs::LinuxArm64);
    }

    #[test]
    fn test_invalid_repo_rejected() {
        assert!(manager().title("not a repo", "/tmp/x").is_err());
    }

    #[tokio::test]
    async fn test_titles_share_one_cache() {
        let manager = manager();
        let a = manager.title("owner/a", "/tmp/lodestone-a").unwrap();
        let err = a.refresh_status(false).await.unwrap_err();
        assert!(matches!(err, LodestoneError::NoReleasesFound { .. }));
        assert!(Arc::ptr_eq(manager.cache(), manager.resolver().cache()));
    }
}
