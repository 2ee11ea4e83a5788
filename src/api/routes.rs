//! API Routes
//!
//! Configures the Axum router with the order service endpoints.

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    empty_order_uid_handler, get_order_handler, health_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /order/:order_uid` - Look up an order
/// - `GET /order/` - Rejected with 400, the identifier is required
/// - `GET /stats` - Cache fill, ingestion and cache engine counters
/// - `GET /health` - Store and cache reachability
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/order/:order_uid", get(get_order_handler))
        .route("/order/", get(empty_order_uid_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
