//! Upstream release source.
//!
//! [`ReleaseSource`] is the seam between the resolver and the network. The
//! production implementation talks to the GitHub releases API with
//! conditional requests: the stored validator goes out as `If-None-Match`
//! and a `304 Not Modified` answer comes back as [`FetchOutcome::NotModified`].

use crate::config::{ManagerConfig, NetworkConfig};
use crate::models::{GitHubRelease, Release};
use crate::network::client::HttpClient;
use crate::{LodestoneError, Result};
use async_trait::async_trait;
use reqwest::{header, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// Result of a conditional release listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The validator still matches; the cached payload is current.
    NotModified,
    /// A fresh listing, newest first, with the validator for next time.
    Fetched {
        releases: Vec<Release>,
        validator: Option<String>,
    },
}

/// Anything that can list the releases of a repository.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// List releases for `owner/name`, revalidating against `validator`.
    async fn fetch_releases(&self, repo: &str, validator: Option<&str>) -> Result<FetchOutcome>;
}

/// GitHub releases API client.
pub struct GitHubReleaseSource {
    http: Arc<HttpClient>,
    api_base: String,
    token: Option<String>,
}

impl GitHubReleaseSource {
    pub fn new(http: Arc<HttpClient>, api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn from_config(config: &ManagerConfig, http: Arc<HttpClient>) -> Self {
        Self::new(http, config.api_base.clone(), config.github_token.clone())
    }

    fn releases_url(&self, repo: &str) -> String {
        format!(
            "{}/repos/{}/releases?per_page={}",
            self.api_base,
            repo,
            NetworkConfig::GITHUB_RELEASES_PER_PAGE
        )
    }

    fn request_headers(&self, validator: Option<&str>) -> Vec<(&'static str, String)> {
        let mut headers = vec![("accept", NetworkConfig::GITHUB_ACCEPT.to_string())];
        if let Some(token) = &self.token {
            headers.push(("authorization", format!("Bearer {}", token.trim())));
        }
        if let Some(validator) = validator.filter(|v| !v.is_empty()) {
            headers.push(("if-none-match", validator.to_string()));
        }
        headers
    }
}

#[async_trait]
impl ReleaseSource for GitHubReleaseSource {
    async fn fetch_releases(&self, repo: &str, validator: Option<&str>) -> Result<FetchOutcome> {
        validate_repo(repo)?;

        let url = self.releases_url(repo);
        let response = self
            .http
            .get_with_headers(&url, &self.request_headers(validator))
            .await?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            debug!("Releases for {} not modified", repo);
            return Ok(FetchOutcome::NotModified);
        }

        if !status.is_success() {
            return Err(LodestoneError::UpstreamApi {
                message: format!("GET {} returned {}", url, status),
                status_code: Some(status.as_u16()),
            });
        }

        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let wire: Vec<GitHubRelease> = response.json().await.map_err(|e| LodestoneError::UpstreamApi {
            message: format!("Failed to parse releases for {}: {}", repo, e),
            status_code: Some(status.as_u16()),
        })?;

        let releases: Vec<Release> = wire
            .into_iter()
            .filter(|r| !r.draft)
            .map(Release::from)
            .collect();
        debug!("Fetched {} releases for {}", releases.len(), repo);

        Ok(FetchOutcome::Fetched {
            releases,
            validator: etag,
        })
    }
}

/// Repositories are addressed as `owner/name`.
pub fn validate_repo(repo: &str) -> Result<()> {
    let mut parts = repo.split('/');
    let valid = matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None)
            if !owner.is_empty()
                && !name.is_empty()
                && repo
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    );

    if valid {
        Ok(())
    } else {
        Err(LodestoneError::Config {
            message: format!("Invalid repository identifier '{}', expected owner/name", repo),
        })
    }
}
