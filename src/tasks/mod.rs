//! Background Tasks Module
//!
//! # Tasks
//! - Cache fill: supervised fire-and-forget cache writes after persist or read-miss
//! - TTL cleanup: sweeps expired entries out of the in-process cache engine

mod cache_fill;
mod cleanup;

pub use cache_fill::{CacheFiller, FillSnapshot};
pub use cleanup::spawn_cleanup_task;
