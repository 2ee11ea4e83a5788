//! Supervised cache fills
//!
//! Cache writes after a persist or a read-miss run as detached tasks. Each one
//! is bounded by a timeout and its outcome lands in shared counters, so a slow
//! or failing cache shows up in `/stats` instead of leaking tasks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::OrderCache;
use crate::models::Order;

#[derive(Debug, Default)]
struct FillCounters {
    spawned: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

/// Point-in-time view of the fill counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FillSnapshot {
    pub spawned: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub in_flight: u64,
}

/// Spawns bounded, counted fire-and-forget cache writes.
#[derive(Clone)]
pub struct CacheFiller {
    cache: Arc<dyn OrderCache>,
    ttl: Duration,
    timeout: Duration,
    counters: Arc<FillCounters>,
}

impl CacheFiller {
    pub fn new(cache: Arc<dyn OrderCache>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            cache,
            ttl,
            timeout,
            counters: Arc::new(FillCounters::default()),
        }
    }

    /// Writes `order` to the cache in the background.
    ///
    /// The caller never observes the outcome; the handle is only useful to
    /// tests that need to wait for the write.
    pub fn spawn(&self, order: Order) -> JoinHandle<()> {
        self.counters.spawned.fetch_add(1, Ordering::Relaxed);

        let cache = self.cache.clone();
        let counters = self.counters.clone();
        let ttl = self.ttl;
        let timeout = self.timeout;

        tokio::spawn(async move {
            let key = order.order_uid.as_str();
            match tokio::time::timeout(timeout, cache.set(key, &order, ttl)).await {
                Ok(Ok(())) => {
                    counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    debug!("Background cache fill stored order_uid={}", key);
                }
                Ok(Err(err)) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!("Failed to cache order_uid={}: {}", key, err);
                }
                Err(_) => {
                    counters.timed_out.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Cache fill for order_uid={} timed out after {:?}",
                        key, timeout
                    );
                }
            }
        })
    }

    pub fn snapshot(&self) -> FillSnapshot {
        let spawned = self.counters.spawned.load(Ordering::Relaxed);
        let succeeded = self.counters.succeeded.load(Ordering::Relaxed);
        let failed = self.counters.failed.load(Ordering::Relaxed);
        let timed_out = self.counters.timed_out.load(Ordering::Relaxed);

        FillSnapshot {
            spawned,
            succeeded,
            failed,
            timed_out,
            in_flight: spawned.saturating_sub(succeeded + failed + timed_out),
        }
    }
}
