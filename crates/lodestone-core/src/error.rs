//! Error types for Lodestone.
//!
//! Every failure surfaced by the release pipeline maps onto one variant of
//! [`LodestoneError`]. Callers match on the variant to decide between
//! retrying, falling back to cached data, prompting the user, or aborting.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Lodestone crates.
#[derive(Debug, Error)]
pub enum LodestoneError {
    // Release resolution
    #[error("Upstream unavailable for {repo}: {message}")]
    UpstreamUnavailable { repo: String, message: String },

    #[error("No releases found for {repo}")]
    NoReleasesFound { repo: String },

    #[error("No asset in release {tag} matches platform {platform}")]
    NoCompatibleAsset { tag: String, platform: String },

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited by {service}, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Upstream API error ({status_code:?}): {message}")]
    UpstreamApi {
        message: String,
        status_code: Option<u16>,
    },

    // Installation
    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("Download cancelled")]
    DownloadCancelled,

    #[error("Unsupported archive format: {file_name}")]
    UnsupportedArchiveFormat { file_name: String },

    #[error("Extraction failed: {message}")]
    ExtractionFailed { message: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("An installation is already in progress for {title}")]
    InstallInProgress { title: String },

    // Launch resolution
    #[error("Multiple executables found, a selection is required")]
    SelectionRequired { candidates: Vec<PathBuf> },

    #[error("No executable found in {0}")]
    NoExecutableFound(PathBuf),

    #[error("Compatibility layer unavailable: {guidance}")]
    CompatibilityLayerUnavailable { guidance: String },

    #[error("Failed to launch {command}: {message}")]
    LaunchFailed { command: String, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Lodestone operations.
pub type Result<T> = std::result::Result<T, LodestoneError>;

impl From<std::io::Error> for LodestoneError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            return LodestoneError::PermissionDenied(PathBuf::new());
        }
        LodestoneError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for LodestoneError {
    fn from(err: serde_json::Error) -> Self {
        LodestoneError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for LodestoneError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LodestoneError::Timeout(std::time::Duration::from_secs(0))
        } else {
            LodestoneError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl From<zip::result::ZipError> for LodestoneError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => LodestoneError::extraction_io(io, None),
            other => LodestoneError::ExtractionFailed {
                message: other.to_string(),
            },
        }
    }
}

impl LodestoneError {
    /// Create an IO error with path context.
    ///
    /// Permission failures become [`LodestoneError::PermissionDenied`] so the
    /// caller can point the user at the offending path.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            return LodestoneError::PermissionDenied(path);
        }
        LodestoneError::Io {
            message: err.to_string(),
            path: Some(path),
            source: Some(err),
        }
    }

    /// Wrap an IO failure that happened while unpacking an archive.
    pub fn extraction_io(err: std::io::Error, path: Option<&std::path::Path>) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            return LodestoneError::PermissionDenied(
                path.map(|p| p.to_path_buf()).unwrap_or_default(),
            );
        }
        let message = match path {
            Some(p) => format!("{}: {}", p.display(), err),
            None => err.to_string(),
        };
        LodestoneError::ExtractionFailed { message }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            LodestoneError::Network { .. }
            | LodestoneError::Timeout(_)
            | LodestoneError::RateLimited { .. } => true,
            LodestoneError::UpstreamApi {
                status_code: Some(code),
                ..
            } => matches!(code, 408 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// Whether the resolver may answer from its cache instead of failing.
    pub fn allows_cache_fallback(&self) -> bool {
        self.is_retryable()
            || matches!(
                self,
                LodestoneError::UpstreamApi { .. } | LodestoneError::UpstreamUnavailable { .. }
            )
    }

    /// Selection prompts are part of normal control flow, not failures.
    pub fn is_control_flow(&self) -> bool {
        matches!(self, LodestoneError::SelectionRequired { .. })
    }

    /// Short, user-facing guidance for the error.
    pub fn user_message(&self) -> String {
        match self {
            LodestoneError::UpstreamUnavailable { .. }
            | LodestoneError::Network { .. }
            | LodestoneError::Timeout(_) => {
                "Could not reach the release server. Check your connection and try again."
                    .to_string()
            }
            LodestoneError::RateLimited { .. } => {
                "The release server is rate limiting requests. Try again later or configure an access token."
                    .to_string()
            }
            LodestoneError::NoCompatibleAsset { platform, .. } => {
                format!("This title has no build for {}.", platform)
            }
            LodestoneError::PermissionDenied(path) => format!(
                "Permission denied at {}. Choose a different install location or fix its permissions.",
                path.display()
            ),
            LodestoneError::CompatibilityLayerUnavailable { guidance } => guidance.clone(),
            LodestoneError::SelectionRequired { .. } => {
                "Choose which executable to launch.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LodestoneError::NoReleasesFound {
            repo: "owner/game".into(),
        };
        assert_eq!(err.to_string(), "No releases found for owner/game");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LodestoneError::Timeout(std::time::Duration::from_secs(5)).is_retryable());
        assert!(LodestoneError::UpstreamApi {
            message: "bad gateway".into(),
            status_code: Some(502),
        }
        .is_retryable());
        assert!(!LodestoneError::UpstreamApi {
            message: "not found".into(),
            status_code: Some(404),
        }
        .is_retryable());
        assert!(!LodestoneError::DownloadCancelled.is_retryable());
    }

    #[test]
    fn test_permission_denied_mapping() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = LodestoneError::io_with_path(io, "/opt/games");
        assert!(matches!(err, LodestoneError::PermissionDenied(ref p) if p == std::path::Path::new("/opt/games")));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(
            LodestoneError::from(io),
            LodestoneError::PermissionDenied(_)
        ));
    }

    #[test]
    fn test_extraction_io_keeps_path() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated");
        let err = LodestoneError::extraction_io(io, Some(std::path::Path::new("game.tar.gz")));
        assert!(err.to_string().contains("game.tar.gz"));
    }

    #[test]
    fn test_selection_is_control_flow() {
        let err = LodestoneError::SelectionRequired { candidates: vec![] };
        assert!(err.is_control_flow());
        assert!(!LodestoneError::DownloadCancelled.is_control_flow());
    }

    #[test]
    fn test_compat_guidance_is_user_message() {
        let err = LodestoneError::CompatibilityLayerUnavailable {
            guidance: "Install Wine".into(),
        };
        assert_eq!(err.user_message(), "Install Wine");
    }
}
