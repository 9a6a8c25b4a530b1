//! Cache Entry Module
//!
//! Defines individual cache entries with TTL support and the optional
//! expiry hook attached to them.

use std::fmt;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Callback invoked with the value of an entry that expired.
pub(crate) type ExpiryCallback<V> = Box<dyn FnOnce(V) + Send + 'static>;

// == Expiry Hook ==
/// One-shot expiry notification bound to a single entry.
///
/// Dropping the hook aborts its pending timer and discards the callback
/// without running it. Only [`ExpiryHook::fire`] runs the callback.
pub(crate) struct ExpiryHook<V> {
    callback: Option<ExpiryCallback<V>>,
    timer: Option<JoinHandle<()>>,
}

impl<V> ExpiryHook<V> {
    pub(crate) fn new(callback: ExpiryCallback<V>) -> Self {
        Self {
            callback: Some(callback),
            timer: None,
        }
    }

    /// Attaches the timer task that will expire the entry.
    pub(crate) fn arm(&mut self, timer: JoinHandle<()>) {
        if let Some(previous) = self.timer.replace(timer) {
            previous.abort();
        }
    }

    /// Forgets the timer without aborting it. Used by the timer task itself.
    pub(crate) fn detach(&mut self) {
        self.timer.take();
    }

    /// Cancels the timer (if still pending) and invokes the callback.
    pub(crate) fn fire(mut self, value: V) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(callback) = self.callback.take() {
            callback(value);
        }
    }
}

impl<V> Drop for ExpiryHook<V> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl<V> fmt::Debug for ExpiryHook<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiryHook")
            .field("armed", &self.timer.is_some())
            .finish()
    }
}

/// Instant at which a TTL started now elapses.
///
/// None for a zero TTL or one that overflows the clock.
pub(crate) fn deadline(ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() {
        return None;
    }
    Instant::now().checked_add(ttl)
}

// == Cache Entry ==
/// A single stored value with its expiry metadata.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Expiration instant, None = never expires
    pub expires_at: Option<Instant>,
    /// Identity of this entry; unique per store across overwrites
    pub generation: u64,
    /// Pending expiry notification, if one was requested
    pub hook: Option<ExpiryHook<V>>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// A zero or absent TTL never expires, and neither does a TTL too large
    /// to be represented as an instant.
    pub fn new(value: V, ttl: Option<Duration>, generation: u64) -> Self {
        let expires_at = ttl.and_then(deadline);

        Self {
            value,
            expires_at,
            generation,
            hook: None,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its expiration
    /// instant, so a TTL that has fully elapsed is never observed as live.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }

    // == Time To Live ==
    /// Returns remaining lifetime, or None if no expiration is set.
    ///
    /// - `Some(Duration::ZERO)` if the entry has expired
    /// - `Some(remaining)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        self.expires_at
            .map(|expires| expires.saturating_duration_since(now))
    }
}
