//! Order data model
//!
//! The wire shape consumed from the queue, cached as a JSON snapshot and
//! returned by the HTTP API. Field names follow the upstream producer exactly.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

// == Order ==
/// Root entity. Owns exactly one delivery, one payment and its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i64,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

/// Fractional digits of `date_created` that survive a `TIMESTAMPTZ` column.
pub const TIMESTAMP_PRECISION: u16 = 6;

impl Order {
    /// Decodes a queue payload into an order.
    ///
    /// An order without an identifier cannot be keyed anywhere, so it is
    /// rejected the same way as malformed JSON. `date_created` is cut to
    /// microseconds so the stored, cached and served values are identical.
    pub fn from_slice(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut order: Order = serde_json::from_slice(payload)?;
        if order.order_uid.trim().is_empty() {
            return Err(DecodeError::MissingOrderUid);
        }
        order.date_created = order.date_created.trunc_subsecs(TIMESTAMP_PRECISION);
        Ok(order)
    }
}

// == Delivery ==
/// Recipient contact and address bundle.
///
/// Identical tuples are shared between orders in the store, so equality and
/// hashing cover every field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

// == Payment ==
/// Transaction record. Persisted as a fresh row per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

// == Item ==
/// Order line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i64,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i64,
}

// == Decode Error ==
/// Why a queue payload could not become an [`Order`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed order json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("order_uid is empty")]
    MissingOrderUid,
}
