//! Streaming downloads with progress reporting and cancellation.
//!
//! Bytes are streamed into `<destination>.part` and renamed into place once
//! complete; any failure or cancellation removes the partial file. `file://`
//! URLs are copied with the same semantics so releases can be served from a
//! local mirror.

use crate::cancel::CancellationToken;
use crate::config::NetworkConfig;
use crate::network::client::HttpClient;
use crate::{LodestoneError, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

const FILE_COPY_CHUNK: usize = 64 * 1024;

/// Progress of a single download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub bytes_downloaded: u64,
    /// Total size, when the server reports one.
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    /// Completed fraction in `0.0..=1.0`, if the total is known.
    pub fn fraction(&self) -> Option<f64> {
        self.total_bytes
            .filter(|total| *total > 0)
            .map(|total| (self.bytes_downloaded as f64 / total as f64).clamp(0.0, 1.0))
    }
}

/// Downloads release assets to disk.
pub struct Downloader {
    http: Arc<HttpClient>,
}

impl Downloader {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    /// Download `url` to `destination`, returning the number of bytes written.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        progress_tx: Option<mpsc::Sender<DownloadProgress>>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LodestoneError::io_with_path(e, parent))?;
        }

        let temp_path = part_path(destination);
        let result = match local_source(url) {
            Some(source) => {
                self.copy_local(&source, &temp_path, progress_tx.as_ref(), cancel)
                    .await
            }
            None => {
                self.stream_remote(url, &temp_path, progress_tx.as_ref(), cancel)
                    .await
            }
        };

        match result {
            Ok(bytes) => {
                tokio::fs::rename(&temp_path, destination)
                    .await
                    .map_err(|e| LodestoneError::io_with_path(e, destination))?;
                info!("Downloaded {} bytes to {}", bytes, destination.display());
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }

    async fn stream_remote(
        &self,
        url: &str,
        temp_path: &Path,
        progress_tx: Option<&mpsc::Sender<DownloadProgress>>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let response = self.http.get(url).await.map_err(|e| match e {
            LodestoneError::DownloadCancelled => e,
            other => LodestoneError::DownloadFailed {
                url: url.to_string(),
                message: other.to_string(),
            },
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LodestoneError::DownloadFailed {
                url: url.to_string(),
                message: format!("Server responded with status {}", status),
            });
        }

        let total_bytes = response.content_length();
        let mut file = tokio::fs::File::create(temp_path)
            .await
            .map_err(|e| LodestoneError::io_with_path(e, temp_path))?;
        let mut reporter = ProgressReporter::new(progress_tx, total_bytes);
        reporter.report(0, true).await;

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LodestoneError::DownloadCancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };

            let chunk = chunk.map_err(|e| LodestoneError::DownloadFailed {
                url: url.to_string(),
                message: format!("Error reading download stream: {}", e),
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| LodestoneError::io_with_path(e, temp_path))?;

            written += chunk.len() as u64;
            reporter.report(written, false).await;
        }

        file.flush()
            .await
            .map_err(|e| LodestoneError::io_with_path(e, temp_path))?;
        cancel.check()?;

        if let Some(expected) = total_bytes {
            if written != expected {
                return Err(LodestoneError::DownloadFailed {
                    url: url.to_string(),
                    message: format!("Expected {} bytes, received {}", expected, written),
                });
            }
        }

        reporter.report(written, true).await;
        Ok(written)
    }

    async fn copy_local(
        &self,
        source: &Path,
        temp_path: &Path,
        progress_tx: Option<&mpsc::Sender<DownloadProgress>>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        debug!("Copying local asset {}", source.display());
        let mut input = tokio::fs::File::open(source).await.map_err(|e| {
            LodestoneError::DownloadFailed {
                url: source.display().to_string(),
                message: e.to_string(),
            }
        })?;
        let total_bytes = input.metadata().await.ok().map(|m| m.len());
        let mut output = tokio::fs::File::create(temp_path)
            .await
            .map_err(|e| LodestoneError::io_with_path(e, temp_path))?;
        let mut reporter = ProgressReporter::new(progress_tx, total_bytes);
        reporter.report(0, true).await;

        let mut buffer = vec![0u8; FILE_COPY_CHUNK];
        let mut written: u64 = 0;
        loop {
            cancel.check()?;
            let read = input
                .read(&mut buffer)
                .await
                .map_err(|e| LodestoneError::io_with_path(e, source))?;
            if read == 0 {
                break;
            }
            output
                .write_all(&buffer[..read])
                .await
                .map_err(|e| LodestoneError::io_with_path(e, temp_path))?;
            written += read as u64;
            reporter.report(written, false).await;
        }

        output
            .flush()
            .await
            .map_err(|e| LodestoneError::io_with_path(e, temp_path))?;
        reporter.report(written, true).await;
        Ok(written)
    }
}

/// Rate-limits progress messages to one per interval, plus forced ones.
struct ProgressReporter<'a> {
    tx: Option<&'a mpsc::Sender<DownloadProgress>>,
    total_bytes: Option<u64>,
    last_sent: Option<Instant>,
}

impl<'a> ProgressReporter<'a> {
    fn new(tx: Option<&'a mpsc::Sender<DownloadProgress>>, total_bytes: Option<u64>) -> Self {
        Self {
            tx,
            total_bytes,
            last_sent: None,
        }
    }

    async fn report(&mut self, bytes_downloaded: u64, force: bool) {
        let Some(tx) = self.tx else {
            return;
        };
        let due = self
            .last_sent
            .map_or(true, |t| t.elapsed() >= NetworkConfig::DOWNLOAD_PROGRESS_INTERVAL);
        if force || due {
            let _ = tx
                .send(DownloadProgress {
                    bytes_downloaded,
                    total_bytes: self.total_bytes,
                })
                .await;
            self.last_sent = Some(Instant::now());
        }
    }
}

fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(NetworkConfig::DOWNLOAD_TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Filesystem path behind a `file://` URL.
fn local_source(url: &str) -> Option<PathBuf> {
    let parsed = url::Url::parse(url).ok()?;
    if parsed.scheme() != "file" {
        return None;
    }
    parsed.to_file_path().ok()
}
