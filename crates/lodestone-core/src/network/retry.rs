//! Retry with exponential backoff and jitter for upstream requests.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Randomize each delay by a factor in `0.5..1.5`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retrying after the given (0-indexed) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16) as i32;
        let secs = (self.base_delay.as_secs_f64() * 2f64.powi(exponent))
            .min(self.max_delay.as_secs_f64());

        let secs = if self.jitter {
            let factor = rand::rng().random_range(0.5..1.5);
            (secs * factor).min(self.max_delay.as_secs_f64())
        } else {
            secs
        };

        Duration::from_secs_f64(secs)
    }
}

/// Run an async operation until it succeeds, fails with a non-retryable
/// error, or runs out of attempts.
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("Succeeded after {} attempts", attempt + 1);
                }
                return Ok(value);
            }
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) if attempt + 1 >= max_attempts => {
                warn!("Giving up after {} attempts: {}", max_attempts, e);
                return Err(e);
            }
            Err(e) => {
                let delay = config.delay_for(attempt);
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt + 1,
                    max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
