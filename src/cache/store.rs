//! Cache Store Module
//!
//! Synchronous cache engine: HashMap storage with lazy and active TTL
//! expiration. Holds no lock of its own; [`crate::cache::Cache`] wraps it
//! in a mutex and owns the background tasks that touch it.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::entry::{self, CacheEntry, ExpiryHook};
use crate::cache::CacheStats;

/// Store shared between the cache handle and its background tasks.
pub(crate) type SharedStore<K, V> = Arc<Mutex<CacheStore<K, V>>>;

/// Locks the store, recovering from poisoning.
///
/// Callbacks never run under the lock, so a poisoned guard still protects
/// a consistent map.
pub(crate) fn lock<K, V>(store: &Mutex<CacheStore<K, V>>) -> MutexGuard<'_, CacheStore<K, V>> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

// == Expiration ==
/// An entry that left the store because it expired.
///
/// Must be notified after the lock is released: notifying runs the
/// entry's expiry callback, if any, and drops the value.
pub(crate) struct Expiration<V> {
    entry: CacheEntry<V>,
}

impl<V> Expiration<V> {
    pub(crate) fn notify(self) {
        let CacheEntry { value, hook, .. } = self.entry;
        if let Some(hook) = hook {
            hook.fire(value);
        }
    }

    #[cfg(test)]
    pub(crate) fn has_callback(&self) -> bool {
        self.entry.hook.is_some()
    }
}

/// Outcome of an active sweep.
pub(crate) struct Sweep<V> {
    /// Number of expired entries removed
    pub removed: usize,
    /// Removed entries, to notify once the lock is released
    pub expirations: Vec<Expiration<V>>,
}

/// Outcome of an insert.
pub(crate) struct Inserted<V> {
    /// Identity of the new entry
    pub generation: u64,
    /// Entry previously stored under the key. Drop it after unlocking.
    pub displaced: Option<CacheEntry<V>>,
}

// == Cache Store ==
/// Key-value storage with per-entry TTL and hit/miss accounting.
#[derive(Debug)]
pub(crate) struct CacheStore<K, V> {
    /// Key-value storage
    entries: HashMap<K, CacheEntry<V>>,
    /// Lookup statistics
    stats: CacheStats,
    /// TTL applied when none is given; zero means never expire
    default_ttl: Duration,
    /// Identity handed to the next inserted entry
    next_generation: u64,
}

impl<K, V> CacheStore<K, V> {
    /// Detaches every pending expiry hook, keeping the entries.
    ///
    /// Dropping the returned hooks cancels them; do so after unlocking.
    pub fn take_hooks(&mut self) -> Vec<ExpiryHook<V>> {
        self.entries
            .values_mut()
            .filter_map(|entry| entry.hook.take())
            .collect()
    }
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // == Constructor ==
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::new(),
            default_ttl,
            next_generation: 0,
        }
    }

    /// Resolves an optional per-entry TTL against the default.
    ///
    /// Returns None when the entry will never expire: a zero TTL, or one
    /// too large for the clock to represent.
    pub fn resolve_ttl(&self, ttl: Option<Duration>) -> Option<Duration> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        entry::deadline(ttl).map(|_| ttl)
    }

    // == Has ==
    /// Raw membership: true for expired entries not yet removed.
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Liveness-checked membership. Removes nothing.
    pub fn contains_live<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).is_some_and(|entry| !entry.is_expired())
    }

    // == Get ==
    /// Retrieves a copy of the value stored under `key`.
    ///
    /// An expired entry is removed and counted as a miss, and returned
    /// alongside to be notified once the lock is released.
    pub fn get<Q>(&mut self, key: &Q) -> (Option<V>, Option<Expiration<V>>)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.entries.get(key) {
            None => {
                self.stats.record_miss();
                return (None, None);
            }
            Some(entry) if !entry.is_expired() => {
                self.stats.record_hit();
                return (Some(entry.value.clone()), None);
            }
            Some(_) => {}
        }

        // Lazy expiry
        self.stats.record_miss();
        let expiration = self.entries.remove(key).map(|entry| Expiration { entry });
        (None, expiration)
    }

    // == Insert ==
    /// Stores a value, replacing any previous entry under the same key.
    ///
    /// `ttl` of None applies the default TTL. The replaced entry is handed
    /// back; dropping it cancels its expiry callback.
    pub fn insert(&mut self, key: K, value: V, ttl: Option<Duration>) -> Inserted<V> {
        let generation = self.next_generation;
        self.next_generation += 1;

        let entry = CacheEntry::new(value, self.resolve_ttl(ttl), generation);
        let displaced = self.entries.insert(key, entry);
        Inserted {
            generation,
            displaced,
        }
    }

    /// Attaches an expiry hook to the entry created with `generation`.
    ///
    /// Hands the hook back if that entry is no longer stored.
    pub fn attach_hook<Q>(
        &mut self,
        key: &Q,
        generation: u64,
        hook: ExpiryHook<V>,
    ) -> Option<ExpiryHook<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.entries.get_mut(key) {
            Some(entry) if entry.generation == generation => {
                entry.hook = Some(hook);
                None
            }
            _ => Some(hook),
        }
    }

    // == Delete ==
    /// Removes an entry regardless of its expiry state.
    ///
    /// Returns the removed entry. Dropping it cancels a pending expiry
    /// callback without running it.
    pub fn delete<Q>(&mut self, key: &Q) -> Option<CacheEntry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key)
    }

    // == Clear ==
    /// Empties the store and resets the statistics in one step.
    ///
    /// Returns the removed entries, to be dropped after unlocking.
    pub fn clear(&mut self) -> HashMap<K, CacheEntry<V>> {
        self.stats.reset();
        mem::take(&mut self.entries)
    }

    // == Delete Expired ==
    /// Removes every expired entry. Does not touch the statistics.
    pub fn delete_expired(&mut self) -> Sweep<V> {
        let now = Instant::now();
        let expired_keys: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        let removed = expired_keys.len();
        let expirations = expired_keys
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .map(|entry| Expiration { entry })
            .collect();

        Sweep {
            removed,
            expirations,
        }
    }

    /// Expires the entry a timer was scheduled for.
    ///
    /// Does nothing unless the entry with `generation` is still stored and
    /// has expired.
    pub fn expire_scheduled<Q>(&mut self, key: &Q, generation: u64) -> Option<Expiration<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let due = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation && entry.is_expired());
        if !due {
            return None;
        }

        let mut entry = self.entries.remove(key)?;
        if let Some(hook) = entry.hook.as_mut() {
            hook.detach();
        }
        Some(Expiration { entry })
    }

    /// Remaining lifetime of an entry. Touches no statistics.
    pub fn ttl_remaining<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).and_then(CacheEntry::ttl_remaining)
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    // == Length ==
    /// Raw entry count, including expired entries not yet removed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries that have not expired.
    pub fn live_len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LONG_TTL: Duration = Duration::from_secs(300);

    fn counting_hook(counter: &Arc<AtomicUsize>) -> ExpiryHook<String> {
        let counter = counter.clone();
        ExpiryHook::new(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_store_new() {
        let store: CacheStore<String, String> = CacheStore::new(LONG_TTL);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.stats(), CacheStats::default());
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = CacheStore::new(LONG_TTL);

        store.insert("key1".to_string(), "value1".to_string(), None);
        let (value, expiration) = store.get("key1");

        assert_eq!(value.as_deref(), Some("value1"));
        assert!(expiration.is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().hits, 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store: CacheStore<String, String> = CacheStore::new(LONG_TTL);

        let (value, _) = store.get("nonexistent");
        assert!(value.is_none());
        assert_eq!(store.stats(), CacheStats { hits: 0, misses: 1 });
    }

    #[test]
    fn test_store_has_does_not_touch_stats() {
        let mut store = CacheStore::new(LONG_TTL);
        store.insert("key1".to_string(), 1, None);

        assert!(store.has("key1"));
        assert!(!store.has("key2"));
        assert_eq!(store.stats(), CacheStats::default());
    }

    #[test]
    fn test_store_delete() {
        let mut store = CacheStore::new(LONG_TTL);

        store.insert("key1".to_string(), "value1".to_string(), None);
        let removed = store.delete("key1").expect("entry should be removed");
        assert_eq!(removed.value, "value1");
        assert!(store.delete("key1").is_none());

        assert!(store.is_empty());
        assert!(store.get("key1").0.is_none());
    }

    #[test]
    fn test_store_overwrite() {
        let mut store = CacheStore::new(LONG_TTL);

        let first = store.insert("key1".to_string(), "value1".to_string(), None);
        assert!(first.displaced.is_none());
        let second = store.insert("key1".to_string(), "value2".to_string(), None);

        assert_ne!(first.generation, second.generation);
        assert_eq!(second.displaced.map(|entry| entry.value).as_deref(), Some("value1"));
        assert_eq!(store.get("key1").0.as_deref(), Some("value2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_clear_resets_stats() {
        let mut store = CacheStore::new(LONG_TTL);
        store.insert("key1".to_string(), 1, None);
        store.get("key1");
        store.get("missing");

        let removed = store.clear();

        assert_eq!(removed.len(), 1);
        assert!(store.is_empty());
        assert_eq!(store.stats(), CacheStats::default());
    }

    #[test]
    fn test_resolve_ttl() {
        let store: CacheStore<String, u8> = CacheStore::new(LONG_TTL);
        assert_eq!(store.resolve_ttl(None), Some(LONG_TTL));
        assert_eq!(store.resolve_ttl(Some(Duration::ZERO)), None);
        assert_eq!(
            store.resolve_ttl(Some(Duration::from_secs(1))),
            Some(Duration::from_secs(1))
        );

        let store: CacheStore<String, u8> = CacheStore::new(Duration::ZERO);
        assert_eq!(store.resolve_ttl(None), None);
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let mut store = CacheStore::new(Duration::MAX);
        assert_eq!(store.resolve_ttl(None), None);
        assert_eq!(store.resolve_ttl(Some(Duration::MAX)), None);

        store.insert("default".to_string(), 1, None);
        store.insert("explicit".to_string(), 2, Some(Duration::MAX));

        assert_eq!(store.get("default").0, Some(1));
        assert_eq!(store.get("explicit").0, Some(2));
        assert_eq!(store.ttl_remaining("explicit"), None);
        assert_eq!(store.live_len(), 2);
        assert_eq!(store.delete_expired().removed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_ttl_expiration() {
        let mut store = CacheStore::new(LONG_TTL);
        store.insert("key1".to_string(), "value1".to_string(), Some(Duration::from_millis(100)));

        assert!(store.get("key1").0.is_some());

        tokio::time::advance(Duration::from_millis(101)).await;

        // Expired but still physically present until read or swept
        assert!(store.has("key1"));
        assert!(!store.contains_live("key1"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.live_len(), 0);

        assert!(store.get("key1").0.is_none());
        assert!(!store.has("key1"));
        assert_eq!(store.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_delete_expired() {
        let mut store = CacheStore::new(LONG_TTL);

        store.insert("key1".to_string(), "value1".to_string(), Some(Duration::from_millis(100)));
        store.insert("key2".to_string(), "value2".to_string(), Some(Duration::from_secs(10)));
        store.insert("key3".to_string(), "value3".to_string(), Some(Duration::ZERO));

        tokio::time::advance(Duration::from_millis(150)).await;

        let sweep = store.delete_expired();
        assert_eq!(sweep.removed, 1);
        assert_eq!(sweep.expirations.len(), 1);
        assert!(!sweep.expirations[0].has_callback());
        assert_eq!(store.len(), 2);
        assert_eq!(store.stats(), CacheStats::default(), "Sweeps must not touch stats");
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_expiry_returns_owed_callback() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut store = CacheStore::new(LONG_TTL);

        let generation = store
            .insert("key1".to_string(), "v".to_string(), Some(Duration::from_millis(10)))
            .generation;
        store.attach_hook("key1", generation, counting_hook(&fired));

        tokio::time::advance(Duration::from_millis(20)).await;

        let (value, expiration) = store.get("key1");
        assert!(value.is_none());
        expiration.expect("expired entry should owe a callback").notify();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_returns_owed_callbacks() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut store = CacheStore::new(LONG_TTL);

        for key in ["a", "b"] {
            let generation = store
                .insert(key.to_string(), key.to_string(), Some(Duration::from_millis(10)))
                .generation;
            store.attach_hook(key, generation, counting_hook(&fired));
        }

        tokio::time::advance(Duration::from_millis(20)).await;

        let sweep = store.delete_expired();
        assert_eq!(sweep.removed, 2);
        sweep.expirations.into_iter().for_each(Expiration::notify);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_delete_and_overwrite_cancel_callback() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut store = CacheStore::new(LONG_TTL);

        let generation = store.insert("key1".to_string(), "v1".to_string(), None).generation;
        store.attach_hook("key1", generation, counting_hook(&fired));
        let displaced = store.insert("key1".to_string(), "v2".to_string(), None).displaced;
        drop(displaced);

        let generation = store.insert("key2".to_string(), "v".to_string(), None).generation;
        store.attach_hook("key2", generation, counting_hook(&fired));
        drop(store.delete("key2"));

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_attach_hook_to_replaced_entry_is_rejected() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut store = CacheStore::new(LONG_TTL);

        let stale = store.insert("key1".to_string(), "v1".to_string(), None).generation;
        store.insert("key1".to_string(), "v2".to_string(), None);
        let rejected = store.attach_hook("key1", stale, counting_hook(&fired));

        assert!(rejected.is_some(), "Hook for a replaced entry is handed back");
        drop(rejected);
        assert!(store.expire_scheduled("key1", stale).is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_scheduled_checks_identity_and_expiry() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut store = CacheStore::new(LONG_TTL);

        let generation = store
            .insert("key1".to_string(), "v".to_string(), Some(Duration::from_millis(50)))
            .generation;
        store.attach_hook("key1", generation, counting_hook(&fired));

        // Not yet due
        assert!(store.expire_scheduled("key1", generation).is_none());
        assert!(store.has("key1"));

        tokio::time::advance(Duration::from_millis(50)).await;

        assert!(store.expire_scheduled("key1", generation + 1).is_none());
        store
            .expire_scheduled("key1", generation)
            .expect("entry should be due")
            .notify();

        assert!(!store.has("key1"));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_remaining() {
        let mut store = CacheStore::new(LONG_TTL);
        store.insert("key1".to_string(), 1, Some(Duration::from_millis(100)));
        store.insert("key2".to_string(), 2, Some(Duration::ZERO));

        tokio::time::advance(Duration::from_millis(40)).await;

        assert_eq!(store.ttl_remaining("key1"), Some(Duration::from_millis(60)));
        assert_eq!(store.ttl_remaining("key2"), None);
        assert_eq!(store.ttl_remaining("missing"), None);
        assert_eq!(store.stats(), CacheStats::default());
    }
}
