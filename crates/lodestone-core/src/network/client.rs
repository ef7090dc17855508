//! HTTP client that keeps track of upstream rate limits.
//!
//! Budgets reported through `X-RateLimit-*` headers are remembered per host.
//! A host whose budget is spent is not contacted again until its reset time;
//! a host running low is approached with a short pause between requests.

use crate::config::NetworkConfig;
use crate::{LodestoneError, Result};
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const LIMIT_HEADER: &str = "x-ratelimit-limit";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Last rate limit budget a host reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining: Option<u64>,
    pub limit: Option<u64>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitState {
    /// Budget advertised by a response, if it carries any rate limit headers.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let number = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
        };
        let state = Self {
            remaining: number(REMAINING_HEADER),
            limit: number(LIMIT_HEADER),
            reset_at: number(RESET_HEADER)
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        };
        (state != Self::default()).then_some(state)
    }

    /// Less than a tenth of the budget is left.
    pub fn is_low(&self) -> bool {
        match (self.remaining, self.limit) {
            (Some(remaining), Some(limit)) if limit > 0 => remaining < (limit / 10).max(1),
            _ => false,
        }
    }

    /// Seconds until the budget refills, when it is spent and the reset lies ahead.
    pub fn blocked_for(&self, now: DateTime<Utc>) -> Option<u64> {
        if self.remaining != Some(0) {
            return None;
        }
        let reset_at = self.reset_at?;
        let wait = (reset_at - now).num_seconds();
        (wait > 0).then_some(wait as u64)
    }
}

/// HTTP client shared by the release source and the downloader.
pub struct HttpClient {
    client: Client,
    timeout: Duration,
    budgets: DashMap<String, RateLimitState>,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Client whose connect and read timeouts are `timeout`.
    ///
    /// The whole body is not bounded, so long downloads keep going as long as
    /// data arrives.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| LodestoneError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self {
            client,
            timeout,
            budgets: DashMap::new(),
        })
    }

    /// Last known budget for `host`.
    pub fn rate_limit(&self, host: &str) -> Option<RateLimitState> {
        self.budgets.get(host).map(|state| *state)
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        self.get_with_headers(url, &[]).await
    }

    /// GET with extra request headers.
    ///
    /// Statuses other than rate limiting are handed back untouched; the
    /// caller decides what a 304 or a 404 means.
    pub async fn get_with_headers(&self, url: &str, headers: &[(&str, String)]) -> Result<Response> {
        let host = host_of(url);
        self.respect_budget(&host).await?;

        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LodestoneError::Timeout(self.timeout)
            } else {
                LodestoneError::Network {
                    message: format!("GET {} failed: {}", url, e),
                    source: Some(e),
                }
            }
        })?;

        if let Some(state) = RateLimitState::from_headers(response.headers()) {
            debug!("{} budget: {:?}/{:?}", host, state.remaining, state.limit);
            self.budgets.insert(host.clone(), state);
        }
        self.reject_rate_limited(response, host)
    }

    /// Statuses worth another attempt.
    pub fn is_retryable_status(status: StatusCode) -> bool {
        matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
    }

    async fn respect_budget(&self, host: &str) -> Result<()> {
        let Some(state) = self.rate_limit(host) else {
            return Ok(());
        };

        if let Some(wait) = state.blocked_for(Utc::now()) {
            return Err(LodestoneError::RateLimited {
                service: host.to_string(),
                retry_after_secs: Some(wait),
            });
        }
        if state.is_low() {
            warn!(
                "{} rate limit nearly spent ({:?} of {:?} left), pausing {:?}",
                host,
                state.remaining,
                state.limit,
                NetworkConfig::LOW_BUDGET_PAUSE
            );
            tokio::time::sleep(NetworkConfig::LOW_BUDGET_PAUSE).await;
        }
        Ok(())
    }

    fn reject_rate_limited(&self, response: Response, host: String) -> Result<Response> {
        let status = response.status();
        let spent = status == StatusCode::FORBIDDEN
            && self.rate_limit(&host).and_then(|s| s.remaining) == Some(0);

        if status != StatusCode::TOO_MANY_REQUESTS && !spent {
            return Ok(response);
        }

        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .or_else(|| {
                self.rate_limit(&host)
                    .and_then(|s| s.blocked_for(Utc::now()))
            });

        Err(LodestoneError::RateLimited {
            service: host,
            retry_after_secs,
        })
    }
}

/// Host part of a URL, or `"unknown"`.
pub fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}
