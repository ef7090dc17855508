//! Cooperative cancellation for downloads and installs.
//!
//! The downloader races every network read against [`CancellationToken::cancelled`],
//! so a stalled connection is abandoned as soon as cancellation is requested.
//! Extraction is never interrupted midway: a cancelled install either stops
//! before extraction or finishes it before the cancellation is observed.

use crate::error::{LodestoneError, Result};
use std::sync::Arc;
use tokio::sync::watch;

/// Handle shared between the caller and a running install.
///
/// Clones observe the same state: cancelling any clone cancels them all.
///
/// ```
/// use lodestone_core::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
///
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// `Err(DownloadCancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(LodestoneError::DownloadCancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so waiting cannot fail.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
