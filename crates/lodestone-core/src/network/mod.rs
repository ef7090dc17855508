//! Network layer: HTTP client, retry policy, upstream release source and
//! asset downloads.

pub mod client;
pub mod download;
pub mod github;
pub mod retry;

pub use client::{HttpClient, RateLimitState};
pub use download::{DownloadProgress, Downloader};
pub use github::{FetchOutcome, GitHubReleaseSource, ReleaseSource};
pub use retry::{retry_async, RetryConfig};
