//! In-process order store
//!
//! Keeps the same normalized layout as the Postgres schema (delivery dedup
//! table, payment rows, item rows, junction) so dedup behavior can be
//! observed through row counts. Nothing survives a restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::models::{Delivery, Item, Order, Payment};
use crate::store::OrderStore;

/// Order header with references into the other tables.
#[derive(Debug, Clone)]
struct OrderRecord {
    /// Order with `items` emptied; delivery and payment are overwritten on read
    header: Order,
    delivery_id: usize,
    payment_id: usize,
    item_ids: Vec<usize>,
}

#[derive(Debug, Default)]
struct Tables {
    deliveries: Vec<Delivery>,
    delivery_ids: HashMap<Delivery, usize>,
    payments: Vec<Payment>,
    items: Vec<Item>,
    orders: HashMap<String, OrderRecord>,
}

impl Tables {
    fn hydrate(&self, record: &OrderRecord) -> Order {
        let mut order = record.header.clone();
        order.delivery = self.deliveries[record.delivery_id].clone();
        order.payment = self.payments[record.payment_id].clone();
        order.items = record
            .item_ids
            .iter()
            .map(|&id| self.items[id].clone())
            .collect();
        order
    }
}

/// [`OrderStore`] kept in process memory.
#[derive(Clone, Default)]
pub struct MemoryOrderStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn delivery_count(&self) -> usize {
        self.tables.read().await.deliveries.len()
    }

    pub async fn payment_count(&self) -> usize {
        self.tables.read().await.payments.len()
    }

    pub async fn item_count(&self) -> usize {
        self.tables.read().await.items.len()
    }

    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn persist_order(&self, order: &Order) -> Result<(), StoreError> {
        // One write lock for the whole order: nothing is visible half-written
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;

        // Checked before any row is added so a rejected order leaves no trace
        if tables.orders.contains_key(&order.order_uid) {
            return Err(StoreError::Duplicate(order.order_uid.clone()));
        }

        let delivery_id = match tables.delivery_ids.get(&order.delivery) {
            Some(&id) => id,
            None => {
                let id = tables.deliveries.len();
                tables.deliveries.push(order.delivery.clone());
                tables.delivery_ids.insert(order.delivery.clone(), id);
                debug!(delivery_id = id, "New delivery inserted");
                id
            }
        };

        let payment_id = tables.payments.len();
        tables.payments.push(order.payment.clone());

        let mut item_ids = Vec::with_capacity(order.items.len());
        for item in &order.items {
            item_ids.push(tables.items.len());
            tables.items.push(item.clone());
        }

        let header = Order {
            items: Vec::new(),
            ..order.clone()
        };
        tables.orders.insert(
            order.order_uid.clone(),
            OrderRecord {
                header,
                delivery_id,
                payment_id,
                item_ids,
            },
        );

        Ok(())
    }

    async fn get_order(&self, order_uid: &str) -> Result<Order, StoreError> {
        let tables = self.tables.read().await;
        tables
            .orders
            .get(order_uid)
            .map(|record| tables.hydrate(record))
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))
    }

    async fn recent_orders(&self, limit: i64) -> Result<Vec<Order>, StoreError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let tables = self.tables.read().await;

        let mut records: Vec<&OrderRecord> = tables.orders.values().collect();
        records.sort_by(|a, b| b.header.date_created.cmp(&a.header.date_created));

        Ok(records
            .into_iter()
            .take(limit)
            .map(|record| tables.hydrate(record))
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::fixtures::sample_order;
    use chrono::Duration;

    #[tokio::test]
    async fn test_persist_then_get_is_deep_equal() {
        let store = MemoryOrderStore::new();
        let order = sample_order("order_uid1");

        store.persist_order(&order).await.unwrap();

        assert_eq!(store.get_order("order_uid1").await.unwrap(), order);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryOrderStore::new();
        let result = store.get_order("nonexistent").await;
        assert!(matches!(result, Err(StoreError::NotFound(ref uid)) if uid == "nonexistent"));
    }

    #[tokio::test]
    async fn test_identical_deliveries_share_one_row() {
        let store = MemoryOrderStore::new();

        store.persist_order(&sample_order("a")).await.unwrap();
        store.persist_order(&sample_order("b")).await.unwrap();

        assert_eq!(store.delivery_count().await, 1);
        assert_eq!(store.payment_count().await, 2);
        assert_eq!(store.item_count().await, 2);
        assert_eq!(
            store.get_order("a").await.unwrap().delivery,
            store.get_order("b").await.unwrap().delivery
        );
    }

    #[tokio::test]
    async fn test_different_deliveries_get_own_rows() {
        let store = MemoryOrderStore::new();
        let mut other = sample_order("b");
        other.delivery.zip = "190000".to_string();

        store.persist_order(&sample_order("a")).await.unwrap();
        store.persist_order(&other).await.unwrap();

        assert_eq!(store.delivery_count().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_order_rejected_without_side_effects() {
        let store = MemoryOrderStore::new();
        store.persist_order(&sample_order("a")).await.unwrap();

        let result = store.persist_order(&sample_order("a")).await;

        assert!(matches!(result, Err(StoreError::Duplicate(_))));
        assert_eq!(store.order_count().await, 1);
        assert_eq!(store.payment_count().await, 1);
        assert_eq!(store.item_count().await, 1);
    }

    #[tokio::test]
    async fn test_recent_orders_newest_first_and_limited() {
        let store = MemoryOrderStore::new();
        for (i, uid) in ["old", "mid", "new"].iter().enumerate() {
            let mut order = sample_order(uid);
            order.date_created += Duration::hours(i as i64);
            store.persist_order(&order).await.unwrap();
        }

        let recent = store.recent_orders(2).await.unwrap();
        let uids: Vec<&str> = recent.iter().map(|o| o.order_uid.as_str()).collect();

        assert_eq!(uids, vec!["new", "mid"]);
        assert_eq!(recent[0].items.len(), 1);
        assert!(store.recent_orders(-1).await.unwrap().is_empty());
    }
}
