//! Error types for the order service
//!
//! One thiserror enum per component plus the HTTP-facing [`ApiError`]. A cache
//! miss is never an error: lookups return `Ok(None)` for that.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Store Error ==
/// Failures of the durable store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No order with the given identifier exists
    #[error("order {0} not found")]
    NotFound(String),

    /// An order with the given identifier is already persisted
    #[error("order {0} already exists")]
    Duplicate(String),

    /// A retryable condition such as a lost upsert race or serialization failure
    #[error("transient store failure: {0}")]
    Transient(String),

    /// Backend refused to serve the request
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Any other database failure, rolled back
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed at startup
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transient(_) | StoreError::Unavailable(_) => true,
            StoreError::Database(err) => match err {
                sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed => true,
                // serialization_failure, deadlock_detected
                sqlx::Error::Database(db) => {
                    matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
                }
                _ => false,
            },
            _ => false,
        }
    }
}

// == Cache Error ==
/// Failures of the cache layer. Distinct from a miss.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Order could not be encoded for storage
    #[error("failed to encode order {key}: {source}")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },

    /// Stored snapshot could not be decoded
    #[error("failed to decode cached order {key}: {source}")]
    Deserialize {
        key: String,
        source: serde_json::Error,
    },

    /// Entry refused by the backing engine (too large, invalid key)
    #[error("cache rejected entry: {0}")]
    Rejected(String),

    /// Redis I/O or protocol failure
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Any other backend failure
    #[error("cache backend error: {0}")]
    Backend(String),
}

// == Ingest Error ==
/// Failures of the message source.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Broker or client failure while receiving
    #[error("queue receive failed: {0}")]
    Receive(String),

    #[cfg(feature = "kafka")]
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

// == Service Error ==
/// Terminal results of the read/write orchestrator.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Order exists neither in cache nor in store
    #[error("order {0} not found")]
    NotFound(String),

    /// Cache failed with something other than a miss
    #[error("cache lookup failed: {0}")]
    Cache(#[from] CacheError),

    /// Store failed
    #[error("store failure: {0}")]
    Store(StoreError),
}

impl ServiceError {
    /// Whether the failed operation is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Store(err) if err.is_transient())
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(uid) => ServiceError::NotFound(uid),
            other => ServiceError::Store(other),
        }
    }
}

// == Config Error ==
/// Invalid configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}: expected one of {expected}")]
    InvalidValue {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

// == Api Error ==
/// Error type returned by HTTP handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Invalid request data
    #[error("{0}")]
    BadRequest(String),

    /// Requested order does not exist
    #[error("{0}")]
    NotFound(String),

    /// A backing dependency is down
    #[error("{0}")]
    Unavailable(String),

    /// Internal server error
    #[error("{0}")]
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(_) => ApiError::NotFound(err.to_string()),
            // A snapshot that fails to (de)serialize is a bug, not an outage
            ServiceError::Cache(CacheError::Serialize { .. })
            | ServiceError::Cache(CacheError::Deserialize { .. }) => {
                ApiError::Internal(err.to_string())
            }
            ServiceError::Cache(_) | ServiceError::Store(_) => {
                ApiError::Unavailable(err.to_string())
            }
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for HTTP handlers.
pub type Result<T> = std::result::Result<T, ApiError>;
