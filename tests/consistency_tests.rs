//! Read/write consistency of the orchestrator against in-process backends.

mod common;

use std::sync::Arc;

use tokio_test::{assert_err, assert_ok};

use order_service::cache::OrderCache;
use order_service::error::ServiceError;
use order_service::models::Order;
use order_service::store::{MemoryOrderStore, OrderStore};
use order_service::SaveOutcome;

use common::{memory_cache, order, service, settle, DownCache, SwitchableStore};

#[tokio::test]
async fn test_saved_order_reads_back_deep_equal() {
    let svc = service(Arc::new(MemoryOrderStore::new()), memory_cache());
    let original = order("order_uid1");

    assert_eq!(assert_ok!(svc.save(original.clone()).await), SaveOutcome::Stored);

    let read = assert_ok!(svc.get("order_uid1").await);
    assert_eq!(read, original);
    assert_eq!(read.delivery.city, "Москва");
    assert_eq!(read.items[0].chrt_id, 87654321);
}

#[tokio::test]
async fn test_read_after_write_regardless_of_cache_state() {
    let store = Arc::new(MemoryOrderStore::new());
    let warm = service(store.clone(), memory_cache());
    warm.save(order("a")).await.unwrap();
    settle(&warm).await;

    // Served from the cache filled by the write
    assert_eq!(warm.get("a").await.unwrap(), order("a"));

    // Served from the store through an empty cache
    let cold = service(store, memory_cache());
    assert_eq!(cold.get("a").await.unwrap(), order("a"));
}

#[tokio::test]
async fn test_decoded_timestamp_matches_across_read_paths() {
    let mut json = serde_json::to_value(order("nanos")).unwrap();
    json["date_created"] = "2021-11-26T06:22:19.123456789Z".into();
    let decoded = Order::from_slice(&serde_json::to_vec(&json).unwrap()).unwrap();

    let store = Arc::new(MemoryOrderStore::new());
    let warm = service(store.clone(), memory_cache());
    warm.save(decoded.clone()).await.unwrap();
    settle(&warm).await;
    let cold = service(store, memory_cache());

    let from_cache = warm.get("nanos").await.unwrap();
    let from_store = cold.get("nanos").await.unwrap();

    assert_eq!(from_cache, from_store);
    assert_eq!(from_store.date_created.timestamp_subsec_micros(), 123_456);
}

#[tokio::test]
async fn test_unknown_key_is_not_found_twice() {
    let svc = service(Arc::new(MemoryOrderStore::new()), memory_cache());

    for _ in 0..2 {
        let err = assert_err!(svc.get("never_written").await);
        assert!(matches!(err, ServiceError::NotFound(ref uid) if uid == "never_written"));
        settle(&svc).await;
    }
    assert_eq!(svc.fill_snapshot().spawned, 0);
}

#[tokio::test]
async fn test_identical_deliveries_share_one_row() {
    let store = Arc::new(MemoryOrderStore::new());
    let svc = service(store.clone(), memory_cache());

    svc.save(order("first")).await.unwrap();
    svc.save(order("second")).await.unwrap();

    assert_eq!(store.delivery_count().await, 1);
    assert_eq!(store.order_count().await, 2);
    assert_eq!(
        svc.get("first").await.unwrap().delivery,
        svc.get("second").await.unwrap().delivery
    );
}

#[tokio::test]
async fn test_cache_outage_does_not_fall_through() {
    let store = Arc::new(SwitchableStore::new());
    store.inner().persist_order(&order("a")).await.unwrap();
    let svc = service(store, Arc::new(DownCache));

    let err = assert_err!(svc.get("a").await);

    assert!(matches!(err, ServiceError::Cache(_)));
}

#[tokio::test]
async fn test_cached_copy_survives_store_outage() {
    let store = Arc::new(SwitchableStore::new());
    let cache = memory_cache();
    let svc = service(store.clone(), cache.clone());
    store.inner().persist_order(&order("order_uid1")).await.unwrap();

    // Miss, store hit, background refill
    assert_eq!(svc.get("order_uid1").await.unwrap(), order("order_uid1"));
    settle(&svc).await;
    assert!(cache.get("order_uid1").await.unwrap().is_some());

    store.set_down(true);

    assert_eq!(svc.get("order_uid1").await.unwrap(), order("order_uid1"));
    assert!(matches!(
        svc.get("other").await,
        Err(ServiceError::Store(_))
    ));
}

#[tokio::test]
async fn test_cache_failure_after_persist_is_invisible() {
    let store = Arc::new(MemoryOrderStore::new());
    let svc = service(store.clone(), Arc::new(DownCache));

    let outcome = assert_ok!(svc.save(order("a")).await);
    settle(&svc).await;

    assert_eq!(outcome, SaveOutcome::Stored);
    assert_eq!(store.order_count().await, 1);
    assert_eq!(svc.fill_snapshot().failed, 1);
}

#[tokio::test]
async fn test_redelivered_order_is_already_stored() {
    let store = Arc::new(MemoryOrderStore::new());
    let svc = service(store.clone(), memory_cache());

    svc.save(order("a")).await.unwrap();
    let outcome = svc.save(order("a")).await.unwrap();

    assert_eq!(outcome, SaveOutcome::AlreadyStored);
    assert_eq!(store.payment_count().await, 1);
}

#[tokio::test]
async fn test_warm_up_skips_when_store_down() {
    let store = Arc::new(SwitchableStore::new());
    store.inner().persist_order(&order("a")).await.unwrap();
    let svc = service(store.clone(), memory_cache());

    store.set_down(true);
    assert_err!(svc.warm_up(100).await);

    store.set_down(false);
    let report = assert_ok!(svc.warm_up(100).await);
    assert_eq!(report.loaded, 1);
}
