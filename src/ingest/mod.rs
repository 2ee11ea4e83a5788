//! Ingestion Pipeline
//!
//! Pulls raw order payloads from a queue subscription, one at a time, and
//! hands them to the write path. Delivery is at-least-once: a message is only
//! acknowledged after it reached a terminal outcome, and redeliveries are
//! absorbed by duplicate detection in the store.

mod channel;
#[cfg(feature = "kafka")]
mod kafka;
mod worker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::IngestError;

pub use channel::{AckHandle, ChannelSource};
#[cfg(feature = "kafka")]
pub use kafka::KafkaSource;
pub use worker::IngestWorker;

/// One message as received from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub payload: Vec<u8>,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

// == Message Source ==
/// A queue subscription delivering opaque payloads.
#[async_trait]
pub trait MessageSource: Send {
    /// Waits for the next message. `Ok(None)` means the subscription ended.
    async fn next_message(&mut self) -> Result<Option<QueueMessage>, IngestError>;

    /// Marks `message` as processed so it is not redelivered.
    async fn ack(&mut self, message: &QueueMessage) -> Result<(), IngestError>;
}

// == Retry Policy ==
/// How often, and how patiently, a transient persistence failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first, at least 1
    pub max_attempts: u32,
    /// Delay before the second attempt, doubled for each one after
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

// == Ingest Statistics ==
/// Pipeline counters shared with the HTTP layer.
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    stored: AtomicU64,
    duplicates: AtomicU64,
    decode_failures: AtomicU64,
    persist_failures: AtomicU64,
}

/// Point-in-time view of [`IngestStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSnapshot {
    pub received: u64,
    pub stored: u64,
    pub duplicates: u64,
    pub decode_failures: u64,
    pub persist_failures: u64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stored(&self) {
        self.stored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            received: self.received.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = IngestStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_stored();
        stats.record_decode_failure();

        assert_eq!(
            stats.snapshot(),
            IngestSnapshot {
                received: 2,
                stored: 1,
                decode_failures: 1,
                ..IngestSnapshot::default()
            }
        );
    }
}
