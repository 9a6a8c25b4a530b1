//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// Lookups never fail; a missing or expired key is reported as `None`.
/// Errors only arise when the cache needs a tokio runtime to schedule
/// background work and none is available.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A background task had to be spawned outside of a tokio runtime
    #[error("Tokio runtime unavailable: {0}")]
    RuntimeUnavailable(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
