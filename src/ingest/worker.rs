//! Consume loop
//!
//! Processes one message at a time: decode, save (retrying transient store
//! failures), then acknowledge. Nothing a single message does can stop the
//! loop; only cancellation or the end of the subscription does.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ingest::{IngestStats, MessageSource, QueueMessage, RetryPolicy};
use crate::models::Order;
use crate::service::{OrderService, SaveOutcome};

/// Pause after a failed receive before asking the source again.
const RECEIVE_ERROR_PAUSE: Duration = Duration::from_secs(1);

pub struct IngestWorker<S: MessageSource> {
    source: S,
    handler: MessageHandler,
    shutdown: CancellationToken,
}

/// Everything needed to process a message, apart from the source itself.
struct MessageHandler {
    service: Arc<OrderService>,
    retry: RetryPolicy,
    stats: Arc<IngestStats>,
}

impl<S: MessageSource> IngestWorker<S> {
    pub fn new(
        source: S,
        service: Arc<OrderService>,
        retry: RetryPolicy,
        stats: Arc<IngestStats>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            handler: MessageHandler {
                service,
                retry,
                stats,
            },
            shutdown,
        }
    }

    /// Runs until cancelled or until the source is exhausted.
    ///
    /// Cancellation is only observed between messages, so the message being
    /// processed when it fires is still saved and acknowledged.
    pub async fn run(mut self) {
        info!("Ingestion worker started");

        loop {
            let received = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Ingestion worker shutting down");
                    break;
                }
                received = self.source.next_message() => received,
            };

            match received {
                Ok(Some(message)) => {
                    self.handler.process(&message).await;
                    if let Err(err) = self.source.ack(&message).await {
                        warn!(
                            partition = message.partition,
                            offset = message.offset,
                            "Failed to acknowledge message: {}",
                            err
                        );
                    }
                }
                Ok(None) => {
                    info!("Message source closed, ingestion worker stopping");
                    break;
                }
                Err(err) => {
                    error!("Failed to receive message: {}", err);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RECEIVE_ERROR_PAUSE) => {}
                    }
                }
            }
        }
    }
}

impl MessageHandler {
    /// Drives one message to a terminal outcome.
    async fn process(&self, message: &QueueMessage) {
        self.stats.record_received();

        let order = match Order::from_slice(&message.payload) {
            Ok(order) => order,
            Err(err) => {
                self.stats.record_decode_failure();
                warn!(
                    partition = message.partition,
                    offset = message.offset,
                    "Skipping undecodable message: {}",
                    err
                );
                return;
            }
        };

        let mut attempt = 1;
        loop {
            match self.service.save(order.clone()).await {
                Ok(SaveOutcome::Stored) => {
                    self.stats.record_stored();
                    info!("Order {} stored", order.order_uid);
                }
                Ok(SaveOutcome::AlreadyStored) => {
                    self.stats.record_duplicate();
                }
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "Saving order {} failed (attempt {}/{}), retrying in {:?}: {}",
                        order.order_uid, attempt, self.retry.max_attempts, delay, err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                Err(err) => {
                    self.stats.record_persist_failure();
                    error!(
                        "Giving up on order {} after {} attempt(s): {}",
                        order.order_uid, attempt, err
                    );
                }
            }
            debug!(offset = message.offset, "Message processed");
            return;
        }
    }
}
