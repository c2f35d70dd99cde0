//! Expiry Sweep Task
//!
//! Expired keys are already invisible to readers; the sweep reclaims their
//! memory so idle keys do not hold capacity until the LRU evicts them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backend::memory::MemoryStore;

/// Spawns the sweep loop over `store`, running every `interval_secs`.
///
/// The handle is aborted on shutdown.
pub fn spawn_cleanup_task(store: Arc<RwLock<MemoryStore>>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "expiry sweep started");

        let mut ticker = tokio::time::interval(interval);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let (removed, remaining) = {
                let mut guard = store.write().await;
                let removed = guard.cleanup_expired();
                (removed, guard.len())
            };

            if removed > 0 {
                info!(removed, remaining, "expired entries swept");
            } else {
                debug!(remaining, "expiry sweep found nothing");
            }
        }
    })
}
