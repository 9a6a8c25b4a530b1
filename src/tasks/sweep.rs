//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries.

use std::hash::Hash;
use std::sync::{Mutex, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::store::{self, CacheStore, Expiration};

/// Longest period the ticker is scheduled with. Longer periods never come
/// around in practice, and the clock cannot represent arbitrary ones.
const MAX_PERIOD: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Spawns a background task that sweeps expired entries every `period`.
///
/// The task only holds a weak reference to the store and stops on its own
/// once the cache is gone. The owning cache aborts the returned handle on
/// teardown; a sweep already in progress finishes its pass because the
/// store is swept synchronously between await points.
pub(crate) fn spawn_sweep_task<K, V>(
    runtime: &Handle,
    shared: Weak<Mutex<CacheStore<K, V>>>,
    period: Duration,
) -> JoinHandle<()>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    runtime.spawn(async move {
        info!("Starting expiry sweep task with period of {:?}", period);

        let period = period.min(MAX_PERIOD);
        let Some(start) = Instant::now().checked_add(period) else {
            debug!("Expiry sweep period out of range, sweep will never run");
            std::future::pending::<()>().await;
            return;
        };

        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(shared) = shared.upgrade() else {
                break;
            };

            let sweep = store::lock(&shared).delete_expired();
            drop(shared);

            if sweep.removed > 0 {
                info!("Expiry sweep: removed {} expired entries", sweep.removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }

            sweep.expirations.into_iter().for_each(Expiration::notify);
        }

        debug!("Expiry sweep task stopped: cache dropped");
    })
}
