//! Mem Cache - An in-process key-value cache
//!
//! Provides per-entry TTL expiration with lazy and background expiry,
//! hit/miss statistics, and value isolation between the cache and its callers.

pub mod cache;
pub mod config;
pub mod error;
mod tasks;

pub use cache::{Cache, CacheStats};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
