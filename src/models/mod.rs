//! Data model and HTTP DTOs
//!
//! `order` holds the domain entities shared by every component; `responses`
//! holds the bodies produced by the operational endpoints.

pub mod order;
pub mod responses;

// Re-export commonly used types
pub use order::{DecodeError, Delivery, Item, Order, Payment};
pub use responses::{ErrorResponse, HealthResponse, StatsResponse};
