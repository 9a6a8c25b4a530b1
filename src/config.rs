//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::time::Duration;

/// Default lifetime of an entry set without an explicit TTL, in milliseconds
pub const DEFAULT_TTL_MS: u64 = 100_000;

/// Default period between background sweeps, in milliseconds
pub const DEFAULT_CHECK_PERIOD_MS: u64 = 600_000;

/// Cache configuration parameters.
///
/// A zero `ttl` means entries never expire unless a TTL is given per entry.
/// A zero `check_period` disables the background sweep entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Default TTL for entries set without an explicit TTL
    pub ttl: Duration,
    /// Interval between active sweeps of expired entries
    pub check_period: Duration,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_TTL_MS` - Default TTL in milliseconds (default: 100000)
    /// - `CACHE_CHECK_PERIOD_MS` - Sweep period in milliseconds (default: 600000)
    pub fn from_env() -> Self {
        Self {
            ttl: Duration::from_millis(
                env::var("CACHE_TTL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_TTL_MS),
            ),
            check_period: Duration::from_millis(
                env::var("CACHE_CHECK_PERIOD_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_CHECK_PERIOD_MS),
            ),
        }
    }

    /// Sets the default entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the sweep period. `Duration::ZERO` disables sweeping.
    pub fn with_check_period(mut self, check_period: Duration) -> Self {
        self.check_period = check_period;
        self
    }

    /// Returns true if a background sweep should be started.
    pub fn sweep_enabled(&self) -> bool {
        !self.check_period.is_zero()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(DEFAULT_TTL_MS),
            check_period: Duration::from_millis(DEFAULT_CHECK_PERIOD_MS),
        }
    }
}
