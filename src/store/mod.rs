//! Durable Store Module
//!
//! Transactional persistence of orders with normalized sub-entities.
//!
//! # Schema
//! - `deliveries` - shared contact bundles, unique over the whole tuple
//! - `payments` - one fresh row per order
//! - `orders` - root rows referencing a delivery and a payment
//! - `items` + `orders_x_items` - line items and their junction to orders
//!
//! Writes happen in dependency order inside one transaction, so a partially
//! persisted order is never observable.

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::Order;

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

// == Order Store ==
/// Authoritative order storage.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists an order and its sub-entities atomically.
    ///
    /// The delivery is get-or-created by its full tuple. Fails with
    /// [`StoreError::Duplicate`] when the identifier is already stored.
    async fn persist_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Loads a fully hydrated order, [`StoreError::NotFound`] when absent.
    async fn get_order(&self, order_uid: &str) -> Result<Order, StoreError>;

    /// Up to `limit` most recently created orders, newest first.
    async fn recent_orders(&self, limit: i64) -> Result<Vec<Order>, StoreError>;

    /// Checks the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}
