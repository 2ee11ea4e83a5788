//! In-process message source backed by a tokio mpsc channel.
//!
//! Offsets are assigned in send order on a single partition. Acknowledgements
//! advance a committed offset the way a broker commit would, which makes the
//! ack policy observable without a broker.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::IngestError;
use crate::ingest::{MessageSource, QueueMessage};

const CHANNEL_TOPIC: &str = "order";

/// Read-only view of a [`ChannelSource`]'s acknowledgements.
#[derive(Debug, Clone, Default)]
pub struct AckHandle {
    committed: Arc<AtomicI64>,
    acks: Arc<AtomicU64>,
}

impl AckHandle {
    /// Next offset a restarted consumer would read from.
    pub fn committed(&self) -> i64 {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn ack_count(&self) -> u64 {
        self.acks.load(Ordering::SeqCst)
    }
}

pub struct ChannelSource {
    rx: mpsc::Receiver<Vec<u8>>,
    next_offset: i64,
    acks: AckHandle,
}

impl ChannelSource {
    /// Creates a source and the sender feeding it.
    pub fn new(capacity: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let source = Self {
            rx,
            next_offset: 0,
            acks: AckHandle::default(),
        };
        (tx, source)
    }

    pub fn ack_handle(&self) -> AckHandle {
        self.acks.clone()
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn next_message(&mut self) -> Result<Option<QueueMessage>, IngestError> {
        let Some(payload) = self.rx.recv().await else {
            return Ok(None);
        };

        let offset = self.next_offset;
        self.next_offset += 1;
        Ok(Some(QueueMessage {
            payload,
            topic: CHANNEL_TOPIC.to_string(),
            partition: 0,
            offset,
        }))
    }

    async fn ack(&mut self, message: &QueueMessage) -> Result<(), IngestError> {
        self.acks
            .committed
            .fetch_max(message.offset + 1, Ordering::SeqCst);
        self.acks.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
