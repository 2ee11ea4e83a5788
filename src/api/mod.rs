//! API Module
//!
//! HTTP boundary of the order service.
//!
//! # Endpoints
//! - `GET /order/:order_uid` - Order lookup (200, 400, 404, 503)
//! - `GET /stats` - Service counters
//! - `GET /health` - Dependency health check

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
