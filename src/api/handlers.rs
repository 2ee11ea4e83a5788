//! API Handlers
//!
//! HTTP request handlers for the order lookup and operational endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::ingest::IngestStats;
use crate::models::{HealthResponse, Order, StatsResponse};
use crate::service::OrderService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Read/write orchestrator
    pub service: Arc<OrderService>,
    /// Counters of the ingestion worker, all zero when ingestion is disabled
    pub ingest_stats: Arc<IngestStats>,
}

impl AppState {
    pub fn new(service: Arc<OrderService>, ingest_stats: Arc<IngestStats>) -> Self {
        Self {
            service,
            ingest_stats,
        }
    }
}

/// Handler for GET /order/:order_uid
///
/// Serves the order from the cache, falling back to the store on a miss.
pub async fn get_order_handler(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> Result<Json<Order>> {
    if order_uid.trim().is_empty() {
        return Err(empty_order_uid());
    }

    let order = state.service.get(&order_uid).await?;
    Ok(Json(order))
}

/// Handler for GET /order/ (identifier left out)
pub async fn empty_order_uid_handler() -> ApiError {
    debug!("Order lookup without identifier");
    empty_order_uid()
}

fn empty_order_uid() -> ApiError {
    ApiError::BadRequest("empty order_uid".to_string())
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        cache_fill: state.service.fill_snapshot(),
        ingest: state.ingest_stats.snapshot(),
        cache_engine: state.service.cache_engine_stats().await.map(Into::into),
    })
}

/// Handler for GET /health
///
/// 200 when the store and the cache both answer, 503 otherwise.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (store, cache) = state.service.probe().await;
    let response = HealthResponse::from_probes(store, cache);

    let status = if response.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
