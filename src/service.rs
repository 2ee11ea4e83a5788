//! Read/Write Orchestrator
//!
//! Writes go to the store first and reach the cache in the background. Reads
//! are cache-aside: a hit returns immediately, a miss falls through to the
//! store and schedules a refill, and a cache failure aborts the read.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::cache::{CacheStats, OrderCache, PopulateReport};
use crate::error::{ServiceError, StoreError};
use crate::models::Order;
use crate::store::OrderStore;
use crate::tasks::{CacheFiller, FillSnapshot};

/// Terminal result of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The order was persisted by this call
    Stored,
    /// The identifier was already persisted, typically a redelivery
    AlreadyStored,
}

/// Coordinates the store and the cache for both paths.
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn OrderCache>,
    filler: CacheFiller,
    cache_ttl: Duration,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: Arc<dyn OrderCache>,
        cache_ttl: Duration,
        fill_timeout: Duration,
    ) -> Self {
        let filler = CacheFiller::new(cache.clone(), cache_ttl, fill_timeout);
        Self {
            store,
            cache,
            filler,
            cache_ttl,
        }
    }

    /// Persists `order`, then caches it without waiting for the cache.
    ///
    /// A duplicate identifier is reported as [`SaveOutcome::AlreadyStored`]
    /// rather than an error. Any other store failure is returned as is.
    pub async fn save(&self, order: Order) -> Result<SaveOutcome, ServiceError> {
        match self.store.persist_order(&order).await {
            Ok(()) => {
                debug!("Persisted order_uid={}", order.order_uid);
                self.filler.spawn(order);
                Ok(SaveOutcome::Stored)
            }
            Err(StoreError::Duplicate(uid)) => {
                info!("Order {} already stored, skipping", uid);
                Ok(SaveOutcome::AlreadyStored)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Cache-aside lookup.
    pub async fn get(&self, order_uid: &str) -> Result<Order, ServiceError> {
        if let Some(order) = self.cache.get(order_uid).await? {
            debug!("Cache hit for order_uid={}", order_uid);
            return Ok(order);
        }

        debug!("Cache miss for order_uid={}, reading store", order_uid);
        let order = self.store.get_order(order_uid).await?;
        self.filler.spawn(order.clone());
        Ok(order)
    }

    /// Loads up to `limit` recent orders into the cache.
    pub async fn warm_up(&self, limit: i64) -> Result<PopulateReport, ServiceError> {
        let orders = self.store.recent_orders(limit).await?;
        debug!("Warming cache with {} orders", orders.len());
        Ok(self.cache.populate(&orders, self.cache_ttl).await)
    }

    /// Probes both dependencies, rendering failures as text.
    pub async fn probe(&self) -> (Result<(), String>, Result<(), String>) {
        let store = self.store.ping().await.map_err(|e| e.to_string());
        let cache = self.cache.ping().await.map_err(|e| e.to_string());
        (store, cache)
    }

    pub fn fill_snapshot(&self) -> FillSnapshot {
        self.filler.snapshot()
    }

    pub async fn cache_engine_stats(&self) -> Option<CacheStats> {
        self.cache.engine_stats().await
    }
}
