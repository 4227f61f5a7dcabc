//! Expiry Sweep Task
//!
//! Scans every stored key and removes those whose expiry has passed,
//! spreading the per-key checks across a bounded pool of worker threads.
//! Each check is an independent read-then-maybe-delete, so no ordering
//! is needed across keys and the sweep is safe to run concurrently with
//! live traffic; a key deleted by a racing reader simply reads as
//! already absent.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::manager::CacheManager;

// == Sweep All ==
/// Removes every expired entry, returning how many were deleted.
///
/// `workers` bounds the thread pool; keys are split into contiguous
/// batches, one per worker.
pub fn sweep_expired(manager: &CacheManager, workers: usize) -> usize {
    let keys = manager.all_keys();
    if keys.is_empty() {
        return 0;
    }

    let workers = workers.max(1);
    let batch_size = (keys.len() + workers - 1) / workers;
    let removed = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for batch in keys.chunks(batch_size) {
            let removed = &removed;
            scope.spawn(move || {
                for key in batch {
                    match manager.evict_if_expired(key) {
                        Ok(true) => {
                            removed.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(false) => {}
                        Err(e) => warn!(key = %key, error = %e, "sweep check failed"),
                    }
                }
            });
        }
    });

    removed.load(Ordering::Relaxed)
}

// == Periodic Task ==
/// Spawns a background task that sweeps expired entries at a fixed
/// interval.
///
/// Returns the task's JoinHandle so it can be aborted at shutdown. The
/// sweep itself is blocking file-system work, so each run is moved off
/// the async runtime.
pub fn spawn_sweep_task(
    manager: Arc<CacheManager>,
    interval_secs: u64,
    workers: usize,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(interval_secs, workers, "starting expiry sweep task");

        loop {
            tokio::time::sleep(interval).await;

            let manager = Arc::clone(&manager);
            let removed =
                tokio::task::spawn_blocking(move || sweep_expired(&manager, workers)).await;

            match removed {
                Ok(removed) if removed > 0 => info!(removed, "expiry sweep removed entries"),
                Ok(_) => debug!("expiry sweep found no expired entries"),
                Err(e) => warn!(error = %e, "expiry sweep task panicked"),
            }
        }
    })
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::document::Document;
    use crate::store::EvictionPolicy;
    use std::thread::sleep;
    use tempfile::{tempdir, TempDir};

    fn open_cache(dir: &TempDir) -> CacheManager {
        let config = CacheConfig {
            directory: dir.path().to_path_buf(),
            max_size_bytes: 1024 * 1024,
            eviction_policy: EvictionPolicy::LeastRecentlyStored,
            default_ttl: None,
            ..CacheConfig::default()
        };
        CacheManager::open(&config).unwrap()
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let dir = tempdir().unwrap();
        let cache = open_cache(&dir);

        cache
            .set("expires", &Document::from("soon gone"), Some(1), false)
            .unwrap();
        cache
            .set("keeps", &Document::from("still here"), Some(3600), false)
            .unwrap();
        cache
            .set("forever", &Document::from("no ttl"), None, false)
            .unwrap();

        sleep(Duration::from_millis(1100));
        let removed = sweep_expired(&cache, 4);

        assert_eq!(removed, 1);
        assert!(cache.get("expires").unwrap().is_none());
        assert!(cache.get("keeps").unwrap().is_some());
        assert!(cache.get("forever").unwrap().is_some());
    }

    #[test]
    fn test_sweep_empty_store() {
        let dir = tempdir().unwrap();
        let cache = open_cache(&dir);
        assert_eq!(sweep_expired(&cache, 4), 0);
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let dir = tempdir().unwrap();
        let cache = open_cache(&dir);

        cache
            .set("expires", &Document::from("x"), Some(1), false)
            .unwrap();
        sleep(Duration::from_millis(1100));

        assert_eq!(sweep_expired(&cache, 2), 1);
        assert_eq!(sweep_expired(&cache, 2), 0);
    }

    #[test]
    fn test_sweep_single_worker() {
        let dir = tempdir().unwrap();
        let cache = open_cache(&dir);

        for i in 0..10 {
            cache
                .set(&format!("k{i}"), &Document::Int(i), Some(1), false)
                .unwrap();
        }
        sleep(Duration::from_millis(1100));

        assert_eq!(sweep_expired(&cache, 1), 10);
        assert!(cache.live_keys().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_task_removes_expired_entries() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(open_cache(&dir));

        cache
            .set("expire_soon", &Document::from("v"), Some(1), false)
            .unwrap();

        let handle = spawn_sweep_task(Arc::clone(&cache), 1, 2);
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert!(cache.get("expire_soon").unwrap().is_none());
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_can_be_aborted() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(open_cache(&dir));

        let handle = spawn_sweep_task(cache, 1, 2);
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "task should be finished after abort");
    }
}
