//! Release version caching.

mod version_cache;

pub use version_cache::{CacheEntry, VersionCache};
