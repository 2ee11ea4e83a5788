//! Order Service - queue-fed order storage with cache-aside reads
//!
//! Orders arrive as JSON on a queue, are persisted to Postgres in a normalized
//! schema and served over HTTP through a TTL cache.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod service;
pub mod store;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use service::{OrderService, SaveOutcome};
pub use tasks::spawn_cleanup_task;
