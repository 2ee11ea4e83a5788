//! TTL Cleanup Task
//!
//! Background task that periodically removes expired entries from the
//! in-process cache engine. Redis expires keys on its own.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheEngine;

/// Spawns a background task that periodically cleans up expired cache entries.
///
/// The task runs until aborted, sleeping `cleanup_interval_secs` between
/// sweeps and holding the engine write lock only while sweeping.
///
/// # Example
/// ```ignore
/// let cache = MemoryOrderCache::new(50 * 1024 * 1024);
/// let cleanup_handle = spawn_cleanup_task(cache.engine(), 1);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(
    engine: Arc<RwLock<CacheEngine>>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = engine.write().await.cleanup_expired();

            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}
