//! Demo traffic generator
//!
//! Publishes a generated order to the order topic every two seconds. Useful
//! for exercising the service end to end against a local broker.
//!
//! # Environment Variables
//! - `KAFKA_BROKERS_PROD` - Broker address (default: localhost:9092)
//! - `KAFKA_TOPIC` - Topic (default: order)

use std::env;
use std::time::Duration;

use anyhow::Context;
use chrono::{SubsecRound, Utc};
use rand::Rng;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::{info, warn};

use order_service::models::{Delivery, Item, Order, Payment};

const PUBLISH_INTERVAL: Duration = Duration::from_secs(2);
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_PAUSE: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "order_producer=info".into()),
        )
        .init();

    let brokers = env::var("KAFKA_BROKERS_PROD").unwrap_or_else(|_| "localhost:9092".to_string());
    let topic = env::var("KAFKA_TOPIC").unwrap_or_else(|_| "order".to_string());

    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("message.timeout.ms", "10000")
        .create()
        .context("failed to create Kafka producer")?;
    info!("Publishing to topic {} on {}", topic, brokers);

    loop {
        let order = generate_order();
        let payload = serde_json::to_vec(&order).context("failed to encode order")?;

        loop {
            let record = FutureRecord::to(&topic).key("order").payload(&payload);
            match producer.send(record, SEND_TIMEOUT).await {
                Ok((partition, offset)) => {
                    info!(partition, offset, "Published {}", order.order_uid);
                    break;
                }
                Err((err, _)) if is_retryable(&err) => {
                    warn!("Broker not ready ({}), retrying", err);
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err((err, _)) => {
                    return Err(err).context("failed to publish order");
                }
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Producer stopped");
                return Ok(());
            }
            _ = tokio::time::sleep(PUBLISH_INTERVAL) => {}
        }
    }
}

fn is_retryable(err: &KafkaError) -> bool {
    matches!(
        err.rdkafka_error_code(),
        Some(RDKafkaErrorCode::MessageTimedOut)
            | Some(RDKafkaErrorCode::LeaderNotAvailable)
            | Some(RDKafkaErrorCode::UnknownTopicOrPartition)
    )
}

/// Builds an order with a fresh `order_<unix>_<nnnn>` identifier.
fn generate_order() -> Order {
    let now = Utc::now().trunc_subsecs(0);
    let order_uid = format!(
        "order_{}_{:04}",
        now.timestamp(),
        rand::thread_rng().gen_range(0..10_000)
    );

    Order {
        order_uid: order_uid.clone(),
        track_number: "WBILTRACK123456".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Иван Петров".to_string(),
            phone: "+74951234567".to_string(),
            zip: "101000".to_string(),
            city: "Москва".to_string(),
            address: "ул. Тверская, д. 25".to_string(),
            region: "Московская область".to_string(),
            email: "ivan.petrov@mail.ru".to_string(),
        },
        payment: Payment {
            transaction: order_uid,
            request_id: "req_987654".to_string(),
            currency: "RUB".to_string(),
            provider: "sberpay".to_string(),
            amount: 5420,
            payment_dt: now.timestamp(),
            bank: "sberbank".to_string(),
            delivery_cost: 500,
            goods_total: 4920,
            custom_fee: 0,
        },
        items: vec![Item {
            chrt_id: 87654321,
            track_number: "WBILTRACK123456".to_string(),
            price: 2460,
            rid: "cd5632a1e8947f12prod".to_string(),
            name: "Кроссовки спортивные".to_string(),
            sale: 15,
            size: "42".to_string(),
            total_price: 2091,
            nm_id: 6543210,
            brand: "Nike".to_string(),
            status: 200,
        }],
        locale: "ru".to_string(),
        internal_signature: "signature_123".to_string(),
        customer_id: "customer_456".to_string(),
        delivery_service: "cdek".to_string(),
        shardkey: "5".to_string(),
        sm_id: 42,
        date_created: now,
        oof_shard: "2".to_string(),
    }
}
