//! Postgres-backed order store
//!
//! Runtime-checked `sqlx` queries against the schema in `migrations/`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::{debug, info, instrument};

use crate::error::StoreError;
use crate::models::{Delivery, Item, Order, Payment};
use crate::store::OrderStore;

// == Queries ==
const SELECT_ORDERS: &str = r"
    SELECT
        o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
        o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created, o.oof_shard,
        d.name AS delivery_name, d.phone AS delivery_phone, d.zip AS delivery_zip,
        d.city AS delivery_city, d.address AS delivery_address,
        d.region AS delivery_region, d.email AS delivery_email,
        p.transaction AS payment_transaction, p.request_id AS payment_request_id,
        p.currency AS payment_currency, p.provider AS payment_provider,
        p.amount AS payment_amount, p.payment_dt AS payment_payment_dt,
        p.bank AS payment_bank, p.delivery_cost AS payment_delivery_cost,
        p.goods_total AS payment_goods_total, p.custom_fee AS payment_custom_fee
    FROM orders o
    JOIN deliveries d ON o.delivery_id = d.id
    JOIN payments p ON o.payment_id = p.id";

const SELECT_ITEMS: &str = r"
    SELECT
        oi.order_uid, i.chrt_id, i.track_number, i.price, i.rid, i.name, i.sale,
        i.size, i.total_price, i.nm_id, i.brand, i.status
    FROM items i
    JOIN orders_x_items oi ON i.id = oi.item_id
    WHERE oi.order_uid = ANY($1)
    ORDER BY i.id";

// Single-statement get-or-create keyed on the tuple digest. The no-op update
// makes RETURNING yield the existing id on conflict, and the row lock
// serializes racing writers.
const UPSERT_DELIVERY: &str = r"
    INSERT INTO deliveries (name, phone, zip, city, address, region, email, tuple_hash)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (tuple_hash)
    DO UPDATE SET name = EXCLUDED.name
    RETURNING id";

const INSERT_PAYMENT: &str = r"
    INSERT INTO payments (transaction, request_id, currency, provider, amount,
                          payment_dt, bank, delivery_cost, goods_total, custom_fee)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    RETURNING id";

const INSERT_ORDER: &str = r"
    INSERT INTO orders (order_uid, track_number, entry, delivery_id, payment_id, locale,
                        internal_signature, customer_id, delivery_service, shardkey,
                        sm_id, date_created, oof_shard)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)";

const INSERT_ITEM: &str = r"
    INSERT INTO items (chrt_id, track_number, price, rid, name, sale, size,
                       total_price, nm_id, brand, status)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    RETURNING id";

const INSERT_ORDER_ITEM: &str = "INSERT INTO orders_x_items (order_uid, item_id) VALUES ($1, $2)";

const ORDERS_PKEY: &str = "orders_pkey";

// == Rows ==
#[derive(Debug, FromRow)]
struct OrderRow {
    order_uid: String,
    track_number: String,
    entry: String,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i64,
    date_created: DateTime<Utc>,
    oof_shard: String,

    delivery_name: String,
    delivery_phone: String,
    delivery_zip: String,
    delivery_city: String,
    delivery_address: String,
    delivery_region: String,
    delivery_email: String,

    payment_transaction: String,
    payment_request_id: String,
    payment_currency: String,
    payment_provider: String,
    payment_amount: i64,
    payment_payment_dt: i64,
    payment_bank: String,
    payment_delivery_cost: i64,
    payment_goods_total: i64,
    payment_custom_fee: i64,
}

impl OrderRow {
    fn into_order(self, items: Vec<Item>) -> Order {
        Order {
            order_uid: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery: Delivery {
                name: self.delivery_name,
                phone: self.delivery_phone,
                zip: self.delivery_zip,
                city: self.delivery_city,
                address: self.delivery_address,
                region: self.delivery_region,
                email: self.delivery_email,
            },
            payment: Payment {
                transaction: self.payment_transaction,
                request_id: self.payment_request_id,
                currency: self.payment_currency,
                provider: self.payment_provider,
                amount: self.payment_amount,
                payment_dt: self.payment_payment_dt,
                bank: self.payment_bank,
                delivery_cost: self.payment_delivery_cost,
                goods_total: self.payment_goods_total,
                custom_fee: self.payment_custom_fee,
            },
            items,
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shardkey: self.shardkey,
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard,
        }
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    order_uid: String,
    chrt_id: i64,
    track_number: String,
    price: i64,
    rid: String,
    name: String,
    sale: i64,
    size: String,
    total_price: i64,
    nm_id: i64,
    brand: String,
    status: i64,
}

impl ItemRow {
    fn into_parts(self) -> (String, Item) {
        (
            self.order_uid,
            Item {
                chrt_id: self.chrt_id,
                track_number: self.track_number,
                price: self.price,
                rid: self.rid,
                name: self.name,
                sale: self.sale,
                size: self.size,
                total_price: self.total_price,
                nm_id: self.nm_id,
                brand: self.brand,
                status: self.status,
            },
        )
    }
}

// == Postgres Store ==
/// [`OrderStore`] on a Postgres connection pool.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Wraps an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool against `database_url`, optionally applying migrations.
    pub async fn connect(
        database_url: &SecretString,
        max_connections: u32,
        run_migrations: bool,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url.expose_secret())
            .await?;
        info!("Connected to Postgres");

        if run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database migrations applied");
        }

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Unit separator between tuple fields, so shifted boundaries hash apart.
const FIELD_SEPARATOR: &str = "\u{1f}";

/// SHA-256 over the UTF-8 delivery fields joined by [`FIELD_SEPARATOR`].
///
/// Must agree with the backfill expression in the tuple hash migration.
fn delivery_digest(delivery: &Delivery) -> Vec<u8> {
    let fields = [
        &delivery.name,
        &delivery.phone,
        &delivery.zip,
        &delivery.city,
        &delivery.address,
        &delivery.region,
        &delivery.email,
    ];

    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update(FIELD_SEPARATOR.as_bytes());
        }
        hasher.update(field.as_bytes());
    }
    hasher.finalize().to_vec()
}

/// Get-or-create the delivery tuple, returning its surrogate id.
async fn upsert_delivery(conn: &mut PgConnection, delivery: &Delivery) -> Result<i64, StoreError> {
    let id: Option<i64> = sqlx::query_scalar(UPSERT_DELIVERY)
        .bind(&delivery.name)
        .bind(&delivery.phone)
        .bind(&delivery.zip)
        .bind(&delivery.city)
        .bind(&delivery.address)
        .bind(&delivery.region)
        .bind(&delivery.email)
        .bind(delivery_digest(delivery))
        .fetch_optional(conn)
        .await?;

    id.ok_or_else(|| StoreError::Transient("delivery upsert returned no row".to_string()))
}

/// Loads items for the given orders, grouped by order and in insertion order.
async fn fetch_items(
    conn: &mut PgConnection,
    order_uids: &[String],
) -> Result<HashMap<String, Vec<Item>>, StoreError> {
    let rows: Vec<ItemRow> = sqlx::query_as(SELECT_ITEMS)
        .bind(order_uids)
        .fetch_all(conn)
        .await?;

    let mut grouped: HashMap<String, Vec<Item>> = HashMap::new();
    for row in rows {
        let (order_uid, item) = row.into_parts();
        grouped.entry(order_uid).or_default().push(item);
    }
    Ok(grouped)
}

/// Both order reads run two statements; a snapshot keeps them consistent.
async fn begin_read_snapshot(conn: &mut PgConnection) -> Result<(), StoreError> {
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(conn)
        .await?;
    Ok(())
}

fn map_order_insert_error(err: sqlx::Error, order_uid: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() && db.constraint() == Some(ORDERS_PKEY) {
            return StoreError::Duplicate(order_uid.to_string());
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl OrderStore for PgOrderStore {
    #[instrument(skip(self, order), fields(order_uid = %order.order_uid))]
    async fn persist_order(&self, order: &Order) -> Result<(), StoreError> {
        // Dropping the transaction without commit rolls everything back
        let mut tx = self.pool.begin().await?;

        let delivery_id = upsert_delivery(&mut *tx, &order.delivery).await?;

        let payment = &order.payment;
        let payment_id: i64 = sqlx::query_scalar(INSERT_PAYMENT)
            .bind(&payment.transaction)
            .bind(&payment.request_id)
            .bind(&payment.currency)
            .bind(&payment.provider)
            .bind(payment.amount)
            .bind(payment.payment_dt)
            .bind(&payment.bank)
            .bind(payment.delivery_cost)
            .bind(payment.goods_total)
            .bind(payment.custom_fee)
            .fetch_one(&mut *tx)
            .await?;

        debug!(delivery_id, payment_id, "Sub-entities written");

        sqlx::query(INSERT_ORDER)
            .bind(&order.order_uid)
            .bind(&order.track_number)
            .bind(&order.entry)
            .bind(delivery_id)
            .bind(payment_id)
            .bind(&order.locale)
            .bind(&order.internal_signature)
            .bind(&order.customer_id)
            .bind(&order.delivery_service)
            .bind(&order.shardkey)
            .bind(order.sm_id)
            .bind(order.date_created)
            .bind(&order.oof_shard)
            .execute(&mut *tx)
            .await
            .map_err(|err| map_order_insert_error(err, &order.order_uid))?;

        for item in &order.items {
            let item_id: i64 = sqlx::query_scalar(INSERT_ITEM)
                .bind(item.chrt_id)
                .bind(&item.track_number)
                .bind(item.price)
                .bind(&item.rid)
                .bind(&item.name)
                .bind(item.sale)
                .bind(&item.size)
                .bind(item.total_price)
                .bind(item.nm_id)
                .bind(&item.brand)
                .bind(item.status)
                .fetch_one(&mut *tx)
                .await?;

            sqlx::query(INSERT_ORDER_ITEM)
                .bind(&order.order_uid)
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(items = order.items.len(), "Order persisted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_order(&self, order_uid: &str) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        begin_read_snapshot(&mut *tx).await?;

        let row: Option<OrderRow> = sqlx::query_as(&format!("{SELECT_ORDERS} WHERE o.order_uid = $1"))
            .bind(order_uid)
            .fetch_optional(&mut *tx)
            .await?;
        let row = row.ok_or_else(|| StoreError::NotFound(order_uid.to_string()))?;

        let mut items = fetch_items(&mut *tx, &[order_uid.to_string()]).await?;
        tx.commit().await?;

        let items = items.remove(order_uid).unwrap_or_default();
        Ok(row.into_order(items))
    }

    #[instrument(skip(self))]
    async fn recent_orders(&self, limit: i64) -> Result<Vec<Order>, StoreError> {
        let mut tx = self.pool.begin().await?;
        begin_read_snapshot(&mut *tx).await?;

        let rows: Vec<OrderRow> =
            sqlx::query_as(&format!("{SELECT_ORDERS} ORDER BY o.date_created DESC LIMIT $1"))
                .bind(limit.max(0))
                .fetch_all(&mut *tx)
                .await?;

        let uids: Vec<String> = rows.iter().map(|row| row.order_uid.clone()).collect();
        let mut items = fetch_items(&mut *tx, &uids).await?;
        tx.commit().await?;

        let orders = rows
            .into_iter()
            .map(|row| {
                let order_items = items.remove(&row.order_uid).unwrap_or_default();
                row.into_order(order_items)
            })
            .collect::<Vec<_>>();

        debug!(count = orders.len(), "Loaded recent orders");
        Ok(orders)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::fixtures::sample_order;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn test_delivery_digest_matches_sql_backfill() {
        // sha256(convert_to(name || chr(31) || ... || email, 'UTF8'))
        let delivery = sample_order("order_1").delivery;
        assert_eq!(
            hex(&delivery_digest(&delivery)),
            "71c2999a7bcb415cfadb45a66076b75deefb5fb5603ebc9e8b3092fdb8bdd890"
        );
    }

    #[test]
    fn test_delivery_digest_separates_fields() {
        let mut shifted = sample_order("order_1").delivery;
        let original = shifted.clone();
        shifted.zip.push_str(&shifted.city);
        shifted.city.clear();

        assert_ne!(delivery_digest(&shifted), delivery_digest(&original));
    }

    #[test]
    fn test_delivery_digest_is_fixed_size() {
        let mut delivery = sample_order("order_1").delivery;
        delivery.address = "x".repeat(10_000);
        assert_eq!(delivery_digest(&delivery).len(), 32);
    }

    #[test]
    fn test_non_database_insert_error_is_passed_through() {
        let err = map_order_insert_error(sqlx::Error::PoolTimedOut, "order_1");
        assert!(matches!(err, StoreError::Database(sqlx::Error::PoolTimedOut)));
    }

    #[test]
    fn test_item_row_into_parts() {
        let row = ItemRow {
            order_uid: "order_1".to_string(),
            chrt_id: 87654321,
            track_number: "T".to_string(),
            price: 453,
            rid: "r".to_string(),
            name: "Mascaras".to_string(),
            sale: 30,
            size: "0".to_string(),
            total_price: 317,
            nm_id: 2389212,
            brand: "Vivienne Sabo".to_string(),
            status: 202,
        };

        let (uid, item) = row.into_parts();
        assert_eq!(uid, "order_1");
        assert_eq!(item.chrt_id, 87654321);
        assert_eq!(item.total_price, 317);
    }
}
