//! Cache Handle Module
//!
//! The public, thread-safe cache. Owns the store behind a mutex together
//! with the lifecycle of its background sweep and expiry timers.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::entry::ExpiryHook;
use crate::cache::store::{self, CacheStore, Expiration, SharedStore};
use crate::cache::CacheStats;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_expiry_timer, spawn_sweep_task};

// == Cache ==
/// In-process key-value cache with per-entry TTL.
///
/// Expired entries are removed lazily by [`Cache::get`] and actively by a
/// background sweep running every `check_period`. Values are isolated from
/// callers: `set` takes ownership and `get` hands out a clone, so a value's
/// `Clone` must produce an independent copy for the isolation to hold
/// (types sharing state through `Arc<Mutex<_>>` opt out of it).
///
/// Dropping the cache (or calling [`Cache::close`]) stops the sweep and
/// cancels every pending expiry callback.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use mem_cache::{Cache, CacheConfig};
///
/// let config = CacheConfig::default().with_check_period(Duration::ZERO);
/// let cache: Cache<String, String> = Cache::new(config).unwrap();
///
/// cache.set("foo".to_string(), "bar".to_string());
/// assert_eq!(cache.get("foo").as_deref(), Some("bar"));
/// assert_eq!(cache.stats().hits, 1);
/// ```
pub struct Cache<K, V> {
    store: SharedStore<K, V>,
    config: CacheConfig,
    sweep: Option<JoinHandle<()>>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    // == Constructor ==
    /// Creates a cache and, if `check_period` is non-zero, starts its
    /// background sweep on the current tokio runtime.
    ///
    /// Fails with [`CacheError::RuntimeUnavailable`] when a sweep is
    /// requested outside of a tokio runtime.
    pub fn new(config: CacheConfig) -> Result<Self> {
        let store: SharedStore<K, V> = Arc::new(Mutex::new(CacheStore::new(config.ttl)));

        let sweep = if config.sweep_enabled() {
            let runtime = current_runtime("expiry sweep")?;
            Some(spawn_sweep_task(
                &runtime,
                Arc::downgrade(&store),
                config.check_period,
            ))
        } else {
            None
        };

        debug!(
            "Cache created: ttl={:?}, check_period={:?}",
            config.ttl, config.check_period
        );

        Ok(Self {
            store,
            config,
            sweep,
        })
    }

    // == Has ==
    /// Raw membership check.
    ///
    /// True for an expired entry that has not been removed yet. Does not
    /// touch the statistics. See [`Cache::contains_live`] for the
    /// liveness-checked variant.
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().has(key)
    }

    /// True if `key` holds an entry that has not expired.
    ///
    /// Neither removes the entry nor touches the statistics.
    pub fn contains_live<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().contains_live(key)
    }

    // == Get ==
    /// Returns a copy of the live value stored under `key`.
    ///
    /// Counts a hit when a live value is found, otherwise a miss. An expired
    /// entry is removed on the spot, running its expiry callback if it has
    /// one.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (value, expiration) = self.lock().get(key);
        if let Some(expiration) = expiration {
            expiration.notify();
        }
        value
    }

    // == Set ==
    /// Stores `value` under `key` with the default TTL.
    ///
    /// Replaces any previous entry, cancelling its pending expiry callback.
    pub fn set(&self, key: K, value: V) -> &Self {
        let inserted = self.lock().insert(key, value, None);
        drop(inserted);
        self
    }

    /// Stores `value` under `key` expiring after `ttl`.
    ///
    /// A zero `ttl` stores an entry that never expires, and so does a `ttl`
    /// too large for the clock to represent.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) -> &Self {
        let inserted = self.lock().insert(key, value, Some(ttl));
        drop(inserted);
        self
    }

    /// Stores `value` under `key` and runs `on_expire` with the stored value
    /// once this entry expires.
    ///
    /// `ttl` of None applies the default TTL. The callback runs at most once,
    /// and only if this very entry expires: deleting, overwriting or clearing
    /// it first cancels the callback, as does dropping the cache. An entry
    /// that never expires never runs its callback.
    ///
    /// Requires a tokio runtime to schedule the expiry timer.
    pub fn set_with_callback<F>(
        &self,
        key: K,
        value: V,
        ttl: Option<Duration>,
        on_expire: F,
    ) -> Result<&Self>
    where
        F: FnOnce(V) + Send + 'static,
    {
        let runtime = current_runtime("expiry timer")?;

        let mut store = self.lock();
        let Some(resolved) = store.resolve_ttl(ttl) else {
            let inserted = store.insert(key, value, ttl);
            drop(store);
            debug!("Expiry callback dropped: entry never expires");
            drop((inserted, on_expire));
            return Ok(self);
        };

        let inserted = store.insert(key.clone(), value, ttl);

        let mut hook = ExpiryHook::new(Box::new(on_expire));
        hook.arm(spawn_expiry_timer(
            &runtime,
            Arc::downgrade(&self.store),
            key.clone(),
            inserted.generation,
            resolved,
        ));
        let rejected = store.attach_hook(&key, inserted.generation, hook);
        drop(store);

        // Replaced entries and hooks may own values that re-enter the cache
        drop((inserted, rejected));
        Ok(self)
    }

    // == Delete ==
    /// Removes `key` regardless of expiry. Returns true if it was present.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.lock().delete(key);
        removed.is_some()
    }

    // == Delete Expired ==
    /// Removes every expired entry now, without waiting for the next sweep.
    ///
    /// Returns the number of entries removed. Statistics are not affected.
    pub fn delete_expired(&self) -> usize {
        let sweep = self.lock().delete_expired();
        sweep.expirations.into_iter().for_each(Expiration::notify);
        sweep.removed
    }

    // == Clear ==
    /// Removes all entries and resets the statistics together.
    pub fn clear(&self) {
        let removed = self.lock().clear();
        drop(removed);
    }

    // == Size ==
    /// Raw entry count, including expired entries not removed yet.
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    /// Number of entries that have not expired.
    pub fn live_size(&self) -> usize {
        self.lock().live_len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // == Stats ==
    /// Snapshot of the hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    /// Remaining lifetime of `key`.
    ///
    /// `None` if the key is absent or never expires, `Some(Duration::ZERO)`
    /// if it has expired but was not removed yet.
    pub fn ttl_remaining<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock().ttl_remaining(key)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // == Close ==
    /// Tears the cache down: stops the sweep and cancels pending expiry
    /// callbacks. Equivalent to dropping it.
    pub fn close(self) {}

    fn lock(&self) -> MutexGuard<'_, CacheStore<K, V>> {
        store::lock(&self.store)
    }
}

impl<K, V> Cache<K, V> {
    /// True while the background sweep is scheduled.
    pub fn is_sweeping(&self) -> bool {
        self.sweep.as_ref().is_some_and(|sweep| !sweep.is_finished())
    }
}

impl<K, V> Drop for Cache<K, V> {
    fn drop(&mut self) {
        if let Some(sweep) = self.sweep.take() {
            sweep.abort();
            debug!("Expiry sweep task aborted");
        }
        let hooks = store::lock(&self.store).take_hooks();
        drop(hooks);
    }
}

impl<K, V> fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.config)
            .field("sweeping", &self.is_sweeping())
            .finish()
    }
}

fn current_runtime(task: &str) -> Result<Handle> {
    Handle::try_current().map_err(|err| CacheError::RuntimeUnavailable(format!("{task}: {err}")))
}
