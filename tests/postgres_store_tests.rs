//! Postgres store tests against a live database.
//!
//! Ignored by default. Run with a disposable database:
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

mod common;

use std::sync::Arc;

use secrecy::SecretString;

use order_service::error::StoreError;
use order_service::models::Order;
use order_service::store::{OrderStore, PgOrderStore};

use common::order;

async fn connect() -> PgOrderStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    PgOrderStore::connect(&SecretString::from(url), 4, true)
        .await
        .expect("failed to connect")
}

fn unique(prefix: &str) -> String {
    format!(
        "{}_{}",
        prefix,
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

async fn count_deliveries_for(store: &PgOrderStore, email: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM deliveries WHERE email = $1")
        .bind(email)
        .fetch_one(store.pool())
        .await
        .unwrap()
}

#[tokio::test]
#[ignore]
async fn test_persist_then_get_is_deep_equal() {
    let store = connect().await;
    let original = order(&unique("roundtrip"));

    store.persist_order(&original).await.unwrap();

    assert_eq!(store.get_order(&original.order_uid).await.unwrap(), original);
}

#[tokio::test]
#[ignore]
async fn test_nanosecond_timestamp_survives_round_trip() {
    let store = connect().await;
    let mut json = serde_json::to_value(order(&unique("nanos"))).unwrap();
    json["date_created"] = "2021-11-26T06:22:19.123456789Z".into();
    let decoded = Order::from_slice(&serde_json::to_vec(&json).unwrap()).unwrap();

    store.persist_order(&decoded).await.unwrap();

    assert_eq!(store.get_order(&decoded.order_uid).await.unwrap(), decoded);
}

/// Deterministic letters that defeat TOAST compression.
fn scrambled_letters(len: usize) -> String {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (b'a' + (state % 26) as u8) as char
        })
        .collect()
}

#[tokio::test]
#[ignore]
async fn test_long_delivery_tuple_is_deduplicated() {
    let store = connect().await;
    let email = format!("{}@example.com", unique("long"));
    let address = scrambled_letters(3000);
    let mut first = order(&unique("long_a"));
    first.delivery.email = email.clone();
    first.delivery.address = address.clone();
    let mut second = order(&unique("long_b"));
    second.delivery = first.delivery.clone();

    store.persist_order(&first).await.unwrap();
    store.persist_order(&second).await.unwrap();

    assert_eq!(count_deliveries_for(&store, &email).await, 1);
    assert_eq!(
        store.get_order(&second.order_uid).await.unwrap().delivery.address,
        address
    );
}

#[tokio::test]
#[ignore]
async fn test_missing_order_is_not_found() {
    let store = connect().await;
    let uid = unique("missing");

    let result = store.get_order(&uid).await;

    assert!(matches!(result, Err(StoreError::NotFound(ref got)) if *got == uid));
}

#[tokio::test]
#[ignore]
async fn test_identical_deliveries_share_one_row() {
    let store = connect().await;
    let email = format!("{}@example.com", unique("dedup"));
    let mut first = order(&unique("dedup_a"));
    first.delivery.email = email.clone();
    let mut second = order(&unique("dedup_b"));
    second.delivery.email = email.clone();

    store.persist_order(&first).await.unwrap();
    store.persist_order(&second).await.unwrap();

    assert_eq!(count_deliveries_for(&store, &email).await, 1);
    assert_eq!(
        store.get_order(&first.order_uid).await.unwrap().delivery,
        store.get_order(&second.order_uid).await.unwrap().delivery
    );
}

#[tokio::test]
#[ignore]
async fn test_concurrent_upserts_create_one_delivery() {
    let store = Arc::new(connect().await);
    let email = format!("{}@example.com", unique("race"));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        let mut racing = order(&unique(&format!("race_{}", i)));
        racing.delivery.email = email.clone();
        tasks.push(tokio::spawn(async move { store.persist_order(&racing).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(count_deliveries_for(&store, &email).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_duplicate_order_rolls_back() {
    let store = connect().await;
    let original = order(&unique("dup"));
    store.persist_order(&original).await.unwrap();

    let result = store.persist_order(&original).await;

    assert!(matches!(result, Err(StoreError::Duplicate(_))));
    let payments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE transaction = $1")
        .bind(&original.payment.transaction)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(payments, 1);
}

#[tokio::test]
#[ignore]
async fn test_recent_orders_are_hydrated() {
    let store = connect().await;
    let mut newest = order(&unique("recent"));
    newest.date_created = chrono::Utc::now() + chrono::Duration::days(3650);
    newest.date_created = chrono::SubsecRound::trunc_subsecs(newest.date_created, 0);
    store.persist_order(&newest).await.unwrap();

    let recent = store.recent_orders(1).await.unwrap();

    assert_eq!(recent, vec![newest]);
}
