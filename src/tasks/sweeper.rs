//! Expiry Sweeper Task
//!
//! Background task that periodically purges expired keys from a
//! [`MemoryStore`]. Reads already ignore expired keys; the sweep bounds the
//! memory held by keys nobody reads again.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::store::MemoryStore;

/// Shortest period the sweeper will run at
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Spawns a task that purges expired keys from `store` every `interval`.
///
/// The task loops until aborted through the returned handle.
///
/// # Example
/// ```ignore
/// let store = MemoryStore::new();
/// let sweeper = spawn_sweep_task(store.clone(), config.sweep_interval());
/// // Later, during shutdown:
/// sweeper.abort();
/// ```
pub fn spawn_sweep_task(store: MemoryStore, interval: Duration) -> JoinHandle<()> {
    let interval = interval.max(MIN_SWEEP_INTERVAL);

    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "starting expiry sweeper");

        loop {
            tokio::time::sleep(interval).await;

            let removed = store.purge_expired().await;
            if removed > 0 {
                info!(removed, "expiry sweep removed keys");
            } else {
                debug!("expiry sweep found nothing to remove");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KeyValueStore;

    #[tokio::test]
    async fn test_sweeper_removes_expired_keys() {
        let store = MemoryStore::new();
        store
            .set("expire_soon", "value", Some(Duration::from_millis(50)))
            .await
            .unwrap();

        let handle = spawn_sweep_task(store.clone(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(store.is_empty().await, "expired key should have been swept");
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweeper_preserves_live_keys() {
        let store = MemoryStore::new();
        store
            .set("long_lived", "value", Some(Duration::from_secs(3600)))
            .await
            .unwrap();
        store.set("persistent", "value", None).await.unwrap();

        let handle = spawn_sweep_task(store.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(store.len().await, 2);
        assert_eq!(
            store.get("long_lived").await.unwrap().as_deref(),
            Some("value")
        );
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweeper_can_be_aborted() {
        let handle = spawn_sweep_task(MemoryStore::new(), Duration::from_secs(1));

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "task should be finished after abort");
    }
}
