//! Per-entry Expiry Timers
//!
//! One-shot tasks that expire a single entry when its TTL elapses and run
//! the entry's expiry callback.

use std::hash::Hash;
use std::sync::{Mutex, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::store::{self, CacheStore};

/// Spawns a timer that expires the entry `generation` under `key` after `ttl`.
///
/// When it fires, the timer removes the entry only if that exact entry is
/// still stored; an entry deleted or overwritten in the meantime is left
/// alone. The callback runs after the store lock is released.
pub(crate) fn spawn_expiry_timer<K, V>(
    runtime: &Handle,
    shared: Weak<Mutex<CacheStore<K, V>>>,
    key: K,
    generation: u64,
    ttl: Duration,
) -> JoinHandle<()>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    runtime.spawn(async move {
        tokio::time::sleep(ttl).await;

        let Some(shared) = shared.upgrade() else {
            return;
        };

        let expiration = store::lock(&shared).expire_scheduled(&key, generation);
        drop(shared);

        match expiration {
            Some(expiration) => {
                debug!("Expiry timer fired for entry generation {}", generation);
                expiration.notify();
            }
            None => debug!("Expiry timer for entry generation {} found nothing to expire", generation),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cache::entry::ExpiryHook;

    type Shared = Arc<Mutex<CacheStore<String, String>>>;

    fn schedule(cache: &Shared, key: &str, value: &str, ttl: Duration, seen: &Arc<Mutex<Vec<String>>>) {
        let seen = seen.clone();
        let mut hook: ExpiryHook<String> = ExpiryHook::new(Box::new(move |value| {
            seen.lock().unwrap().push(value);
        }));

        let mut guard = store::lock(cache);
        let generation = guard.insert(key.to_string(), value.to_string(), Some(ttl)).generation;
        hook.arm(spawn_expiry_timer(
            &Handle::current(),
            Arc::downgrade(cache),
            key.to_string(),
            generation,
            ttl,
        ));
        guard.attach_hook(key, generation, hook);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_expires_entry_and_runs_callback() {
        let cache: Shared = Arc::new(Mutex::new(CacheStore::new(Duration::from_secs(300))));
        let seen = Arc::new(Mutex::new(Vec::new()));

        schedule(&cache, "k", "original", Duration::from_millis(50), &seen);

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(*seen.lock().unwrap(), vec!["original".to_string()]);
        assert!(!store::lock(&cache).has("k"));
        assert_eq!(store::lock(&cache).stats().misses, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_skips_overwritten_entry() {
        let cache: Shared = Arc::new(Mutex::new(CacheStore::new(Duration::from_secs(300))));
        let seen = Arc::new(Mutex::new(Vec::new()));

        schedule(&cache, "k", "original", Duration::from_millis(50), &seen);
        store::lock(&cache).insert("k".to_string(), "replacement".to_string(), None);

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(store::lock(&cache).get("k").0.as_deref(), Some("replacement"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_exits_quietly_when_store_dropped() {
        let cache: Shared = Arc::new(Mutex::new(CacheStore::new(Duration::from_secs(300))));

        let handle = spawn_expiry_timer(
            &Handle::current(),
            Arc::downgrade(&cache),
            "k".to_string(),
            0,
            Duration::from_millis(10),
        );
        drop(cache);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.is_finished());
    }
}
