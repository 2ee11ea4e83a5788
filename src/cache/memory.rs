//! In-process cache backend
//!
//! Wraps a [`CacheEngine`] behind an async lock and stores the same JSON
//! snapshots the Redis backend does.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::{decode, encode, CacheEngine, CacheStats, OrderCache};
use crate::error::CacheError;
use crate::models::Order;

/// [`OrderCache`] backed by a process-local [`CacheEngine`].
#[derive(Clone)]
pub struct MemoryOrderCache {
    engine: Arc<RwLock<CacheEngine>>,
}

impl MemoryOrderCache {
    /// Creates a cache holding at most `max_bytes` of snapshots.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            engine: Arc::new(RwLock::new(CacheEngine::new(max_bytes))),
        }
    }

    /// Shared handle to the engine, for the TTL sweeper.
    pub fn engine(&self) -> Arc<RwLock<CacheEngine>> {
        self.engine.clone()
    }
}

#[async_trait]
impl OrderCache for MemoryOrderCache {
    async fn get(&self, key: &str) -> Result<Option<Order>, CacheError> {
        // Write lock: a lookup updates LRU order and stats
        let raw = self.engine.write().await.get(key);
        match raw {
            Some(raw) => {
                debug!("got order_uid={} from cache", key);
                decode(key, raw.as_bytes()).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, order: &Order, ttl: Duration) -> Result<(), CacheError> {
        let raw = encode(key, order)?;
        self.engine.write().await.set(key.to_string(), raw, ttl)?;
        debug!("set order_uid={} in cache", key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn engine_stats(&self) -> Option<CacheStats> {
        Some(self.engine.read().await.stats())
    }
}
