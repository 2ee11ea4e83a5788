//! Cache Module
//!
//! TTL-keyed store of fully materialized order snapshots. The cache never
//! holds partial data: every entry is the JSON of a whole [`Order`].
//!
//! Two backends implement [`OrderCache`]: Redis for deployments, and an
//! in-process engine with LRU eviction under a memory cap.

mod engine;
mod entry;
mod lru;
mod memory;
mod redis_cache;
mod stats;


use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::CacheError;
use crate::models::Order;

// Re-export public types
pub use engine::CacheEngine;
pub use entry::CacheEntry;
pub use lru::LruTracker;
pub use memory::MemoryOrderCache;
pub use redis_cache::RedisOrderCache;
pub use stats::CacheStats;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

// == Order Cache ==
/// Cache-aside storage keyed by order identifier.
#[async_trait]
pub trait OrderCache: Send + Sync {
    /// Returns the cached snapshot, `Ok(None)` on a miss.
    ///
    /// Backend and decode failures are errors and must never be read as a miss.
    async fn get(&self, key: &str) -> Result<Option<Order>, CacheError>;

    /// Stores `order` under `key`, unconditionally replacing any entry.
    async fn set(&self, key: &str, order: &Order, ttl: Duration) -> Result<(), CacheError>;

    /// Checks the backend is reachable.
    async fn ping(&self) -> Result<(), CacheError>;

    /// In-process engine counters, when the backend keeps any.
    async fn engine_stats(&self) -> Option<CacheStats> {
        None
    }

    /// Bulk pre-load. A failing entry is logged and skipped.
    async fn populate(&self, orders: &[Order], ttl: Duration) -> PopulateReport {
        let mut report = PopulateReport::default();
        for order in orders {
            match self.set(&order.order_uid, order, ttl).await {
                Ok(()) => report.loaded += 1,
                Err(err) => {
                    warn!(order_uid = %order.order_uid, error = %err, "Cache warm-up entry failed");
                    report.failed += 1;
                }
            }
        }
        info!(
            "Cache populated: {} loaded, {} failed",
            report.loaded, report.failed
        );
        report
    }
}

/// Outcome of a bulk [`OrderCache::populate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateReport {
    pub loaded: usize,
    pub failed: usize,
}

pub(crate) fn encode(key: &str, order: &Order) -> Result<String, CacheError> {
    serde_json::to_string(order).map_err(|source| CacheError::Serialize {
        key: key.to_string(),
        source,
    })
}

pub(crate) fn decode(key: &str, raw: &[u8]) -> Result<Order, CacheError> {
    serde_json::from_slice(raw).map_err(|source| CacheError::Deserialize {
        key: key.to_string(),
        source,
    })
}
