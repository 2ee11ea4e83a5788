//! Order Service - queue-fed order storage with cache-aside reads

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use order_service::api::{create_router, AppState};
use order_service::cache::{MemoryOrderCache, OrderCache, RedisOrderCache};
use order_service::config::{CacheBackend, Config, StoreBackend};
use order_service::ingest::IngestStats;
use order_service::store::{MemoryOrderStore, OrderStore, PgOrderStore};
use order_service::{spawn_cleanup_task, OrderService};

/// Main entry point for the order service.
///
/// # Startup Sequence
/// 1. Load `.env` and configuration, initialize logging
/// 2. Connect the store (running migrations) and the cache
/// 3. Warm the cache with the most recent orders
/// 4. Start the ingestion worker
/// 5. Serve HTTP until SIGINT/SIGTERM, then stop ingestion and drain
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(config.log_json);

    info!("Starting order service");
    info!(
        "Configuration loaded: store={:?}, cache={:?}, topic={}, port={}",
        config.store_backend, config.cache_backend, config.kafka_topic, config.server_port
    );

    let store = build_store(&config).await?;
    let (cache, cleanup_handle) = build_cache(&config).await?;

    let service = Arc::new(OrderService::new(
        store,
        cache,
        config.cache_ttl(),
        config.cache_fill_timeout(),
    ));

    // A cold cache only costs store reads
    if let Err(err) = service.warm_up(config.cache_warmup_limit).await {
        warn!("Cache warm-up failed, starting cold: {}", err);
    }

    let shutdown = CancellationToken::new();
    let ingest_stats = Arc::new(IngestStats::new());
    let ingest_handle = spawn_ingestion(&config, service.clone(), ingest_stats.clone(), shutdown.clone())?;

    let app = create_router(AppState::new(service, ingest_stats));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("HTTP server failed")?;

    // The worker finishes its in-flight message before returning
    if let Some(handle) = ingest_handle {
        if let Err(err) = handle.await {
            warn!("Ingestion worker ended abnormally: {}", err);
        }
    }
    if let Some(handle) = cleanup_handle {
        handle.abort();
        warn!("Cleanup task aborted");
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "order_service=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn OrderStore>> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let store = PgOrderStore::connect(
                &config.database_url(),
                config.database_max_connections,
                config.run_migrations,
            )
            .await
            .context("failed to connect to Postgres")?;
            info!("Postgres store ready");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store, orders will not survive a restart");
            Ok(Arc::new(MemoryOrderStore::new()))
        }
    }
}

async fn build_cache(
    config: &Config,
) -> anyhow::Result<(Arc<dyn OrderCache>, Option<JoinHandle<()>>)> {
    match config.cache_backend {
        CacheBackend::Redis => {
            let cache = RedisOrderCache::connect(&config.redis_url(), config.cache_max_memory_mb)
                .await
                .context("failed to connect to Redis")?;
            info!("Redis cache ready at {}", config.redis_addr);
            Ok((Arc::new(cache), None))
        }
        CacheBackend::Memory => {
            let cache = MemoryOrderCache::new(config.cache_max_memory_bytes());
            let cleanup = spawn_cleanup_task(cache.engine(), config.cleanup_interval);
            info!(
                "In-memory cache ready, cap={} bytes, sweep every {}s",
                config.cache_max_memory_bytes(),
                config.cleanup_interval
            );
            Ok((Arc::new(cache), Some(cleanup)))
        }
    }
}

#[cfg(feature = "kafka")]
fn spawn_ingestion(
    config: &Config,
    service: Arc<OrderService>,
    stats: Arc<IngestStats>,
    shutdown: CancellationToken,
) -> anyhow::Result<Option<JoinHandle<()>>> {
    use order_service::ingest::{IngestWorker, KafkaSource, RetryPolicy};

    let source = KafkaSource::connect(
        &config.kafka_brokers,
        &config.kafka_group_id,
        &config.kafka_topic,
    )
    .context("failed to create Kafka consumer")?;
    let retry = RetryPolicy::new(
        config.ingest_max_attempts,
        std::time::Duration::from_millis(config.ingest_retry_backoff_ms),
    );

    let worker = IngestWorker::new(source, service, retry, stats, shutdown);
    Ok(Some(tokio::spawn(worker.run())))
}

#[cfg(not(feature = "kafka"))]
fn spawn_ingestion(
    _config: &Config,
    _service: Arc<OrderService>,
    _stats: Arc<IngestStats>,
    _shutdown: CancellationToken,
) -> anyhow::Result<Option<JoinHandle<()>>> {
    warn!("Built without the kafka feature, ingestion is disabled");
    Ok(None)
}

/// Waits for Ctrl+C or SIGTERM, then cancels `shutdown`.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    shutdown.cancel();
}
