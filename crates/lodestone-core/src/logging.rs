//! Tracing subscriber setup for binaries and tests embedding Lodestone.

use crate::config::EnvVars;
use tracing_subscriber::EnvFilter;

/// Install a compact fmt subscriber filtered by `LODESTONE_LOG`.
///
/// Falls back to `default_directive` (for example `"info"`) when the
/// variable is unset or invalid. Calling it more than once is harmless; only
/// the first call installs a subscriber.
pub fn init_logging(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_env(EnvVars::LOG)
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .is_ok()
}
