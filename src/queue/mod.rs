use std::time::Duration;

use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{DocumentError, DocumentResult};
use crate::models::Priority;

/// Wire payload for async hand-off. Deliberately id-only: the worker
/// re-reads everything else from the store, so a replayed or stale message
/// can never resurrect outdated request data.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueuedJob {
    pub document_id: Uuid,
}

/// Producer side of the async path. Delivery is at-least-once; the
/// lifecycle guards absorb the duplicates.
pub struct DocumentQueue {
    producer: FutureProducer,
    topic_priority: String,
    topic_bulk: String,
}

impl DocumentQueue {
    pub fn new(
        brokers: &str,
        topic_priority: String,
        topic_bulk: String,
    ) -> DocumentResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("compression.type", "snappy")
            .create()
            .map_err(|e| DocumentError::Queue(e.to_string()))?;

        Ok(DocumentQueue {
            producer,
            topic_priority,
            topic_bulk,
        })
    }

    pub async fn enqueue(&self, document_id: Uuid, priority: &Priority) -> DocumentResult<()> {
        let topic = match priority {
            Priority::High => &self.topic_priority,
            _ => &self.topic_bulk,
        };

        let key = document_id.to_string();
        let payload = serde_json::to_vec(&QueuedJob { document_id })?;

        self.producer
            .send(
                FutureRecord::to(topic).key(&key).payload(&payload),
                Timeout::After(Duration::from_secs(5)),
            )
            .await
            .map_err(|(e, _)| DocumentError::Queue(e.to_string()))?;

        Ok(())
    }
}

/// Consumer for the worker pool: manual commits, so a message is only
/// acknowledged after the document reached a terminal state.
pub fn create_consumer(
    brokers: &str,
    group_id: &str,
    topics: &[&str],
) -> DocumentResult<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("session.timeout.ms", "30000")
        .create()
        .map_err(|e| DocumentError::Queue(e.to_string()))?;

    consumer
        .subscribe(topics)
        .map_err(|e| DocumentError::Queue(e.to_string()))?;

    Ok(consumer)
}
