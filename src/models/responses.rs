//! Response DTOs for the operational endpoints
//!
//! Order lookups return [`crate::models::Order`] directly; everything else
//! the HTTP layer emits is defined here.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::ingest::IngestSnapshot;
use crate::tasks::FillSnapshot;

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Background cache fill counters
    pub cache_fill: FillSnapshot,
    /// Ingestion pipeline counters
    pub ingest: IngestSnapshot,
    /// In-process cache engine counters, absent for the Redis backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_engine: Option<CacheEngineStats>,
}

/// In-process cache engine counters with the derived hit rate.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEngineStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_entries: usize,
    pub used_bytes: usize,
    pub hit_rate: f64,
}

impl From<CacheStats> for CacheEngineStats {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            total_entries: stats.total_entries,
            used_bytes: stats.used_bytes,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" when every dependency answered, "degraded" otherwise
    pub status: String,
    /// Store probe result ("ok" or the failure)
    pub store: String,
    /// Cache probe result ("ok" or the failure)
    pub cache: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Builds a response from the two dependency probes.
    pub fn from_probes(store: Result<(), String>, cache: Result<(), String>) -> Self {
        let healthy = store.is_ok() && cache.is_ok();
        let describe = |probe: Result<(), String>| probe.err().unwrap_or_else(|| "ok".to_string());
        Self {
            status: if healthy { "healthy" } else { "degraded" }.to_string(),
            store: describe(store),
            cache: describe(cache),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
