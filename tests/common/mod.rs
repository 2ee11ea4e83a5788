//! Shared fixtures and fault-injecting doubles for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use order_service::cache::{CacheStats, MemoryOrderCache, OrderCache};
use order_service::error::{CacheError, StoreError};
use order_service::models::{Delivery, Item, Order, Payment};
use order_service::store::{MemoryOrderStore, OrderStore};
use order_service::OrderService;

pub const TEST_TTL: Duration = Duration::from_secs(300);
pub const TEST_FILL_TIMEOUT: Duration = Duration::from_secs(1);

// == Fixtures ==

pub fn order(order_uid: &str) -> Order {
    Order {
        order_uid: order_uid.to_string(),
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: "+9720000000".to_string(),
            zip: "2639809".to_string(),
            city: "Москва".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: order_uid.to_string(),
            request_id: String::new(),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: 1637907727,
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        },
        items: vec![Item {
            chrt_id: 87654321,
            track_number: "WBILMTESTTRACK".to_string(),
            price: 453,
            rid: "ab4219087a764ae0btest".to_string(),
            name: "Mascaras".to_string(),
            sale: 30,
            size: "0".to_string(),
            total_price: 317,
            nm_id: 2389212,
            brand: "Vivienne Sabo".to_string(),
            status: 202,
        }],
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: "test".to_string(),
        delivery_service: "meest".to_string(),
        shardkey: "9".to_string(),
        sm_id: 99,
        date_created: Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap(),
        oof_shard: "1".to_string(),
    }
}

pub fn payload(order: &Order) -> Vec<u8> {
    serde_json::to_vec(order).unwrap()
}

pub fn service(store: Arc<dyn OrderStore>, cache: Arc<dyn OrderCache>) -> Arc<OrderService> {
    Arc::new(OrderService::new(store, cache, TEST_TTL, TEST_FILL_TIMEOUT))
}

pub fn memory_cache() -> Arc<MemoryOrderCache> {
    Arc::new(MemoryOrderCache::new(1 << 20))
}

/// Waits until every background cache fill has finished.
pub async fn settle(service: &OrderService) {
    while service.fill_snapshot().in_flight > 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// == Fault-injecting doubles ==

/// Store whose reads can be switched off, simulating an outage.
#[derive(Default)]
pub struct SwitchableStore {
    inner: MemoryOrderStore,
    down: AtomicBool,
}

impl SwitchableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryOrderStore {
        &self.inner
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("store switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl OrderStore for SwitchableStore {
    async fn persist_order(&self, order: &Order) -> Result<(), StoreError> {
        self.check()?;
        self.inner.persist_order(order).await
    }

    async fn get_order(&self, order_uid: &str) -> Result<Order, StoreError> {
        self.check()?;
        self.inner.get_order(order_uid).await
    }

    async fn recent_orders(&self, limit: i64) -> Result<Vec<Order>, StoreError> {
        self.check()?;
        self.inner.recent_orders(limit).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }
}

/// Store that fails the first `failures` persists with a given error kind.
pub struct FlakyStore {
    inner: MemoryOrderStore,
    remaining: AtomicU32,
    transient: bool,
    pub attempts: AtomicU32,
}

impl FlakyStore {
    pub fn transient(failures: u32) -> Self {
        Self::build(failures, true)
    }

    pub fn permanent(failures: u32) -> Self {
        Self::build(failures, false)
    }

    fn build(failures: u32, transient: bool) -> Self {
        Self {
            inner: MemoryOrderStore::new(),
            remaining: AtomicU32::new(failures),
            transient,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn inner(&self) -> &MemoryOrderStore {
        &self.inner
    }
}

#[async_trait]
impl OrderStore for FlakyStore {
    async fn persist_order(&self, order: &Order) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(if self.transient {
                StoreError::Transient("injected".to_string())
            } else {
                StoreError::Database(sqlx::Error::RowNotFound)
            });
        }
        self.inner.persist_order(order).await
    }

    async fn get_order(&self, order_uid: &str) -> Result<Order, StoreError> {
        self.inner.get_order(order_uid).await
    }

    async fn recent_orders(&self, limit: i64) -> Result<Vec<Order>, StoreError> {
        self.inner.recent_orders(limit).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Cache backend that is unreachable for every call.
pub struct DownCache;

#[async_trait]
impl OrderCache for DownCache {
    async fn get(&self, _key: &str) -> Result<Option<Order>, CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _order: &Order, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    async fn engine_stats(&self) -> Option<CacheStats> {
        None
    }
}
