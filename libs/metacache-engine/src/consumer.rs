use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metacache_api::{IngestError, LogMessage, MetadataRecord, PartitionStream};

use crate::store::MetadataStore;

/// Per-partition counters. Shared with the coordinator's `Ingestion` handle.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    applied: AtomicU64,
    skipped: AtomicU64,
    read_errors: AtomicU64,
}

impl ConsumerStats {
    /// Messages decoded and written to the store.
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// Messages dropped as undecodable or missing a username.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Failed reads reported by the partition stream.
    pub fn read_errors(&self) -> u64 {
        self.read_errors.load(Ordering::Relaxed)
    }
}

/// Reads one partition in log order and upserts every valid message.
///
/// Bad messages are logged and skipped; only the end of the partition
/// stream stops the consumer.
pub struct PartitionConsumer {
    topic: String,
    partition: i32,
    stream: Box<dyn PartitionStream>,
    store: Arc<MetadataStore>,
    stats: Arc<ConsumerStats>,
}

impl PartitionConsumer {
    pub fn new(
        topic: String,
        partition: i32,
        stream: Box<dyn PartitionStream>,
        store: Arc<MetadataStore>,
    ) -> Self {
        Self {
            topic,
            partition,
            stream,
            store,
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        self.stats.clone()
    }

    /// Consume until the upstream closes the partition.
    pub async fn run(mut self) {
        tracing::info!(topic = %self.topic, partition = self.partition, "partition consumer started");

        while let Some(item) = self.stream.next().await {
            match item {
                Ok(msg) => self.handle(&msg),
                Err(e) => {
                    self.stats.read_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        topic = %self.topic,
                        partition = self.partition,
                        error = %e,
                        "read error, continuing"
                    );
                }
            }
        }

        tracing::info!(
            topic = %self.topic,
            partition = self.partition,
            applied = self.stats.applied(),
            skipped = self.stats.skipped(),
            read_errors = self.stats.read_errors(),
            "partition stream closed, consumer stopped"
        );
    }

    fn handle(&self, msg: &LogMessage) {
        match apply_message(&self.store, msg) {
            Ok(username) => {
                self.stats.applied.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    partition = msg.partition,
                    offset = msg.offset,
                    username = %username,
                    "metadata stored"
                );
            }
            Err(e) => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    topic = %self.topic,
                    partition = msg.partition,
                    offset = msg.offset,
                    error = %e,
                    "bad message, skipping"
                );
            }
        }
    }
}

/// Decode one log message and upsert it. Returns the username written.
pub fn apply_message(store: &MetadataStore, msg: &LogMessage) -> Result<String, IngestError> {
    let payload = msg
        .payload
        .as_deref()
        .ok_or_else(|| IngestError::Decode("message has no payload".to_string()))?;
    let record = MetadataRecord::decode(payload)?;
    let username = record.username().to_string();
    store.put(username.clone(), record);
    Ok(username)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use metacache_api::LogBroker;
    use metacache_broker_memory::MemoryBroker;

    const TOPIC: &str = "metadata";

    async fn run_partition(broker: &MemoryBroker, store: &Arc<MetadataStore>) -> Arc<ConsumerStats> {
        broker.close(TOPIC).unwrap();
        let stream = broker.open_partition(TOPIC, 0).await.unwrap();
        let consumer = PartitionConsumer::new(TOPIC.to_string(), 0, stream, store.clone());
        let stats = consumer.stats();
        consumer.run().await;
        stats
    }

    #[test]
    fn apply_message_rejects_tombstones() {
        let store = MetadataStore::new();
        let msg = LogMessage { partition: 0, offset: 0, payload: None };
        assert!(matches!(apply_message(&store, &msg), Err(IngestError::Decode(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn later_message_in_partition_wins() {
        let broker = MemoryBroker::new();
        broker.create_topic(TOPIC, 1);
        broker.append(TOPIC, 0, r#"{"username":"alice","age":30}"#).unwrap();
        broker.append(TOPIC, 0, r#"{"username":"alice","age":31}"#).unwrap();

        let store = Arc::new(MetadataStore::new());
        let stats = run_partition(&broker, &store).await;

        assert_eq!(store.get("alice").unwrap().get("age"), Some(&json!(31)));
        assert_eq!(stats.applied(), 2);
    }

    #[tokio::test]
    async fn malformed_message_between_valid_ones_is_skipped() {
        let broker = MemoryBroker::new();
        broker.create_topic(TOPIC, 1);
        broker.append(TOPIC, 0, r#"{"username":"alice","age":30}"#).unwrap();
        broker.append(TOPIC, 0, "{not json").unwrap();
        broker.append(TOPIC, 0, r#"{"username":"alice","age":32}"#).unwrap();

        let store = Arc::new(MetadataStore::new());
        let stats = run_partition(&broker, &store).await;

        assert_eq!(store.get("alice").unwrap().get("age"), Some(&json!(32)));
        assert_eq!((stats.applied(), stats.skipped()), (2, 1));
    }

    #[tokio::test]
    async fn message_without_username_creates_nothing() {
        let broker = MemoryBroker::new();
        broker.create_topic(TOPIC, 1);
        broker.append(TOPIC, 0, r#"{"age":30}"#).unwrap();
        broker.append(TOPIC, 0, r#"{"username":7}"#).unwrap();
        broker.append(TOPIC, 0, r#"{"username":"bob"}"#).unwrap();

        let store = Arc::new(MetadataStore::new());
        let stats = run_partition(&broker, &store).await;

        assert_eq!(store.len(), 1);
        assert!(store.get("bob").is_some());
        assert_eq!(stats.skipped(), 2);
    }

    #[tokio::test]
    async fn read_errors_do_not_stop_the_consumer() {
        let broker = MemoryBroker::new();
        broker.create_topic(TOPIC, 1);
        broker.append_error(TOPIC, 0, "fetch timed out").unwrap();
        broker.append_tombstone(TOPIC, 0).unwrap();
        broker.append(TOPIC, 0, r#"{"username":"carol"}"#).unwrap();

        let store = Arc::new(MetadataStore::new());
        let stats = run_partition(&broker, &store).await;

        assert!(store.get("carol").is_some());
        assert_eq!(
            (stats.applied(), stats.skipped(), stats.read_errors()),
            (1, 1, 1)
        );
    }
}
