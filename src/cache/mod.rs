//! Cache Module
//!
//! Provides in-process caching with per-entry TTL, lazy and active expiry,
//! and hit/miss statistics.

pub(crate) mod entry;
mod handle;
mod stats;
pub(crate) mod store;


// Re-export public types
pub use handle::Cache;
pub use stats::CacheStats;
