//! Configuration Module
//!
//! Handles loading and managing service configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Which durable store implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Which cache implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Full Postgres URL; when unset it is assembled from the parts below
    pub database_url: Option<SecretString>,
    pub database_host: String,
    pub database_port: u16,
    pub database_user: String,
    pub database_password: SecretString,
    pub database_name: String,
    /// Connection pool size
    pub database_max_connections: u32,
    /// Apply embedded migrations at startup
    pub run_migrations: bool,
    pub store_backend: StoreBackend,

    /// Redis address, with or without the `redis://` scheme
    pub redis_addr: String,
    pub cache_backend: CacheBackend,
    /// Memory cap handed to the cache backend, in megabytes
    pub cache_max_memory_mb: u64,
    /// TTL in seconds of every cache entry
    pub cache_ttl: u64,
    /// Number of recent orders loaded into the cache at startup
    pub cache_warmup_limit: i64,
    /// Bound on each background cache write, in milliseconds
    pub cache_fill_timeout_ms: u64,
    /// In-memory engine TTL sweep interval in seconds
    pub cleanup_interval: u64,

    pub kafka_brokers: String,
    pub kafka_topic: String,
    pub kafka_group_id: String,
    /// Persistence attempts per message on transient failures
    pub ingest_max_attempts: u32,
    /// Base delay of the exponential retry backoff, in milliseconds
    pub ingest_retry_backoff_ms: u64,

    /// HTTP server port
    pub server_port: u16,
    /// Emit JSON log lines instead of the human-readable format
    pub log_json: bool,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// Unparseable numeric values fall back to their default. Backend selectors
    /// are strict since a typo there would silently change behavior.
    ///
    /// # Environment Variables
    /// - `DATABASE_URL` - Full Postgres URL (optional)
    /// - `DATABASE_HOST`, `DATABASE_PORT`, `DATABASE_USER`, `DATABASE_PASSWORD`,
    ///   `DATABASE_NAME` - URL parts (default: localhost, 5432, postgres, postgres, orders)
    /// - `DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
    /// - `RUN_MIGRATIONS` - Apply migrations at start (default: true)
    /// - `STORE_BACKEND` - `postgres` or `memory` (default: postgres)
    /// - `REDIS` - Redis address (default: 127.0.0.1:6379)
    /// - `CACHE_BACKEND` - `redis` or `memory` (default: redis)
    /// - `CACHE_MAX_MEMORY_MB` - Cache memory cap (default: 50)
    /// - `CACHE_TTL_SECS` - Entry TTL (default: 86400)
    /// - `CACHE_WARMUP_LIMIT` - Startup warm-up rows (default: 100)
    /// - `CACHE_FILL_TIMEOUT_MS` - Background write bound (default: 2000)
    /// - `CACHE_CLEANUP_INTERVAL` - In-memory sweep frequency in seconds (default: 1)
    /// - `KAFKA_BROKERS_CONS` - Broker address (default: localhost:9092)
    /// - `KAFKA_TOPIC` - Topic (default: order)
    /// - `KAFKA_GROUP_ID` - Consumer group (default: order-service-group)
    /// - `INGEST_MAX_ATTEMPTS` - Persist attempts per message (default: 3)
    /// - `INGEST_RETRY_BACKOFF_MS` - Retry backoff base (default: 200)
    /// - `SERVER_PORT` - HTTP server port (default: 8080)
    /// - `LOG_FORMAT` - `json` for structured logs (default: pretty)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().map(SecretString::from),
            database_host: env::var("DATABASE_HOST").unwrap_or(defaults.database_host),
            database_port: parse_or("DATABASE_PORT", defaults.database_port),
            database_user: env::var("DATABASE_USER").unwrap_or(defaults.database_user),
            database_password: env::var("DATABASE_PASSWORD")
                .map(SecretString::from)
                .unwrap_or(defaults.database_password),
            database_name: env::var("DATABASE_NAME").unwrap_or(defaults.database_name),
            database_max_connections: parse_or(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            run_migrations: parse_or("RUN_MIGRATIONS", defaults.run_migrations),
            store_backend: match env::var("STORE_BACKEND") {
                Ok(value) => parse_store_backend(&value)?,
                Err(_) => defaults.store_backend,
            },
            redis_addr: env::var("REDIS").unwrap_or(defaults.redis_addr),
            cache_backend: match env::var("CACHE_BACKEND") {
                Ok(value) => parse_cache_backend(&value)?,
                Err(_) => defaults.cache_backend,
            },
            cache_max_memory_mb: parse_or("CACHE_MAX_MEMORY_MB", defaults.cache_max_memory_mb),
            cache_ttl: parse_or("CACHE_TTL_SECS", defaults.cache_ttl),
            cache_warmup_limit: parse_or("CACHE_WARMUP_LIMIT", defaults.cache_warmup_limit),
            cache_fill_timeout_ms: parse_or(
                "CACHE_FILL_TIMEOUT_MS",
                defaults.cache_fill_timeout_ms,
            ),
            cleanup_interval: parse_or("CACHE_CLEANUP_INTERVAL", defaults.cleanup_interval),
            kafka_brokers: env::var("KAFKA_BROKERS_CONS").unwrap_or(defaults.kafka_brokers),
            kafka_topic: env::var("KAFKA_TOPIC").unwrap_or(defaults.kafka_topic),
            kafka_group_id: env::var("KAFKA_GROUP_ID").unwrap_or(defaults.kafka_group_id),
            ingest_max_attempts: parse_or("INGEST_MAX_ATTEMPTS", defaults.ingest_max_attempts)
                .max(1),
            ingest_retry_backoff_ms: parse_or(
                "INGEST_RETRY_BACKOFF_MS",
                defaults.ingest_retry_backoff_ms,
            ),
            server_port: parse_or("SERVER_PORT", defaults.server_port),
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.log_json),
        })
    }

    /// Postgres connection URL, either given verbatim or assembled from parts.
    pub fn database_url(&self) -> SecretString {
        match &self.database_url {
            Some(url) => url.clone(),
            None => SecretString::from(format!(
                "postgres://{}:{}@{}:{}/{}?sslmode=disable",
                self.database_user,
                self.database_password.expose_secret(),
                self.database_host,
                self.database_port,
                self.database_name
            )),
        }
    }

    /// Redis URL with the scheme filled in when the address is bare.
    pub fn redis_url(&self) -> String {
        if self.redis_addr.starts_with("redis://") || self.redis_addr.starts_with("rediss://") {
            self.redis_addr.clone()
        } else {
            format!("redis://{}", self.redis_addr)
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub fn cache_fill_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_fill_timeout_ms)
    }

    pub fn cache_max_memory_bytes(&self) -> usize {
        usize::try_from(self.cache_max_memory_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_host: "localhost".to_string(),
            database_port: 5432,
            database_user: "postgres".to_string(),
            database_password: SecretString::from("postgres"),
            database_name: "orders".to_string(),
            database_max_connections: 10,
            run_migrations: true,
            store_backend: StoreBackend::Postgres,
            redis_addr: "127.0.0.1:6379".to_string(),
            cache_backend: CacheBackend::Redis,
            cache_max_memory_mb: 50,
            cache_ttl: 24 * 60 * 60,
            cache_warmup_limit: 100,
            cache_fill_timeout_ms: 2000,
            cleanup_interval: 1,
            kafka_brokers: "localhost:9092".to_string(),
            kafka_topic: "order".to_string(),
            kafka_group_id: "order-service-group".to_string(),
            ingest_max_attempts: 3,
            ingest_retry_backoff_ms: 200,
            server_port: 8080,
            log_json: false,
        }
    }
}

fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_store_backend(value: &str) -> Result<StoreBackend, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
        "memory" => Ok(StoreBackend::Memory),
        _ => Err(ConfigError::InvalidValue {
            name: "STORE_BACKEND",
            value: value.to_string(),
            expected: "postgres, memory",
        }),
    }
}

fn parse_cache_backend(value: &str) -> Result<CacheBackend, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "redis" => Ok(CacheBackend::Redis),
        "memory" => Ok(CacheBackend::Memory),
        _ => Err(ConfigError::InvalidValue {
            name: "CACHE_BACKEND",
            value: value.to_string(),
            expected: "redis, memory",
        }),
    }
}
