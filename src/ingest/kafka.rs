//! Kafka subscription
//!
//! Auto-commit is off: offsets are committed explicitly through
//! [`MessageSource::ack`] once the worker is done with a message.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use tracing::info;

use crate::error::IngestError;
use crate::ingest::{MessageSource, QueueMessage};

pub struct KafkaSource {
    consumer: StreamConsumer,
}

impl KafkaSource {
    /// Creates a consumer in `group_id` subscribed to `topic`.
    ///
    /// A new group starts from the earliest retained offset.
    pub fn connect(brokers: &str, group_id: &str, topic: &str) -> Result<Self, IngestError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()?;

        consumer.subscribe(&[topic])?;
        info!(
            "Subscribed to topic {} on {} as group {}",
            topic, brokers, group_id
        );

        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn next_message(&mut self) -> Result<Option<QueueMessage>, IngestError> {
        let message = self.consumer.recv().await?;

        Ok(Some(QueueMessage {
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
        }))
    }

    async fn ack(&mut self, message: &QueueMessage) -> Result<(), IngestError> {
        // Committed offset is the next one to read
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )?;
        self.consumer.commit(&offsets, CommitMode::Async)?;
        Ok(())
    }
}
