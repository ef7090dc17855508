//! Installation progress reporting.
//!
//! The installer sends [`ProgressUpdate`]s over a `tokio::sync::mpsc`
//! channel. Overall progress is mapped onto fixed bands: pre-flight 0-10%,
//! download 10-90%, extraction and flattening 90-100%.

use serde::Serialize;

/// Installation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStage {
    Preflight,
    Download,
    Extract,
    Flatten,
    Finalize,
}

impl InstallStage {
    /// Overall percentage at which the stage starts.
    pub fn start_percent(&self) -> f32 {
        match self {
            InstallStage::Preflight => 0.0,
            InstallStage::Download => 10.0,
            InstallStage::Extract => 90.0,
            InstallStage::Flatten => 95.0,
            InstallStage::Finalize => 99.0,
        }
    }
}

/// Progress update sent through channels.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressUpdate {
    StageChanged {
        stage: InstallStage,
        message: String,
    },
    Download {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    },
    Overall {
        progress_percent: f32,
    },
    Completed {
        version: String,
    },
}

impl ProgressUpdate {
    pub fn stage(stage: InstallStage, message: impl Into<String>) -> Self {
        ProgressUpdate::StageChanged {
            stage,
            message: message.into(),
        }
    }

    pub fn overall(progress_percent: f32) -> Self {
        ProgressUpdate::Overall {
            progress_percent: progress_percent.clamp(0.0, 100.0),
        }
    }
}

/// Map a download fraction onto the 10-90% band.
pub fn download_percent(fraction: f64) -> f32 {
    let fraction = fraction.clamp(0.0, 1.0) as f32;
    let start = InstallStage::Download.start_percent();
    start + (InstallStage::Extract.start_percent() - start) * fraction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_band() {
        assert_eq!(download_percent(0.0), 10.0);
        assert_eq!(download_percent(0.5), 50.0);
        assert_eq!(download_percent(1.0), 90.0);
        assert_eq!(download_percent(7.0), 90.0);
    }

    #[test]
    fn test_stage_order_is_monotonic() {
        let stages = [
            InstallStage::Preflight,
            InstallStage::Download,
            InstallStage::Extract,
            InstallStage::Flatten,
            InstallStage::Finalize,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].start_percent() < pair[1].start_percent());
        }
    }

    #[test]
    fn test_update_serializes_with_tag() {
        let json = serde_json::to_value(ProgressUpdate::overall(120.0)).unwrap();
        assert_eq!(json["type"], "overall");
        assert_eq!(json["progress_percent"], 100.0);
    }
}
