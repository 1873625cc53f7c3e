use std::sync::Arc;

use metacache_api::LogBroker;
use tokio::task::JoinHandle;

use crate::consumer::{ConsumerStats, PartitionConsumer};
use crate::error::StartupError;
use crate::store::MetadataStore;

/// Per-partition consumer task + its counters.
struct ConsumerSlot {
    partition: i32,
    stats: Arc<ConsumerStats>,
    handle: JoinHandle<()>,
}

/// Running ingestion: one consumer task per partition.
///
/// Consumers are never restarted. A consumer whose partition closes just
/// finishes; the others keep going.
pub struct Ingestion {
    topic: String,
    consumers: Vec<ConsumerSlot>,
}

impl std::fmt::Debug for Ingestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestion")
            .field("topic", &self.topic)
            .field("partitions", &self.partitions())
            .finish()
    }
}

impl Ingestion {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partitions(&self) -> Vec<i32> {
        self.consumers.iter().map(|c| c.partition).collect()
    }

    pub fn stats(&self, partition: i32) -> Option<Arc<ConsumerStats>> {
        self.consumers
            .iter()
            .find(|c| c.partition == partition)
            .map(|c| c.stats.clone())
    }

    /// Messages applied across all partitions.
    pub fn applied(&self) -> u64 {
        self.consumers.iter().map(|c| c.stats.applied()).sum()
    }

    /// Wait until every partition stream has been closed upstream.
    pub async fn join(self) {
        for slot in self.consumers {
            if let Err(e) = slot.handle.await {
                tracing::error!(partition = slot.partition, error = %e, "partition consumer task failed");
            }
        }
    }
}

/// Discovers the partitions of the metadata topic and fans out one
/// `PartitionConsumer` per partition, all writing into the same store.
pub struct Coordinator {
    broker: Arc<dyn LogBroker>,
    store: Arc<MetadataStore>,
    topic: String,
}

impl Coordinator {
    pub fn new(broker: Arc<dyn LogBroker>, store: Arc<MetadataStore>, topic: String) -> Self {
        Self {
            broker,
            store,
            topic,
        }
    }

    /// Start ingestion. Call once.
    ///
    /// Every partition stream is opened before any consumer is spawned, so a
    /// failure leaves nothing running. Errors are not retried.
    pub async fn start(self) -> Result<Ingestion, StartupError> {
        let partitions = self
            .broker
            .partitions(&self.topic)
            .await
            .map_err(|e| e.with_context(format!("list partitions of '{}'", self.topic)))?;
        if partitions.is_empty() {
            return Err(StartupError::NoPartitions(self.topic));
        }

        let mut streams = Vec::with_capacity(partitions.len());
        for &partition in &partitions {
            let stream = self
                .broker
                .open_partition(&self.topic, partition)
                .await
                .map_err(|e| e.with_context(format!("open partition {partition}")))?;
            streams.push((partition, stream));
        }

        let consumers = streams
            .into_iter()
            .map(|(partition, stream)| {
                let consumer =
                    PartitionConsumer::new(self.topic.clone(), partition, stream, self.store.clone());
                let stats = consumer.stats();
                let handle = tokio::spawn(consumer.run());
                ConsumerSlot {
                    partition,
                    stats,
                    handle,
                }
            })
            .collect();

        tracing::info!(topic = %self.topic, partitions = ?partitions, "ingestion started");
        Ok(Ingestion {
            topic: self.topic,
            consumers,
        })
    }

    /// Run `start` on a background task and return at once.
    ///
    /// The caller awaits the handle for the startup outcome.
    pub fn spawn(self) -> JoinHandle<Result<Ingestion, StartupError>> {
        tokio::spawn(self.start())
    }
}
