use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rskafka::BackoffConfig;
use rskafka::client::consumer::{StartOffset, StreamConsumer, StreamConsumerBuilder};
use rskafka::client::partition::UnknownTopicHandling;
use rskafka::client::{Client, ClientBuilder};
use rskafka::record::RecordAndOffset;
use rskafka::topic::Topic;
use tokio::sync::OnceCell;

use metacache_api::{BrokerError, LogBroker, LogMessage, PartitionStream};

/// Kafka connection settings.
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    /// Bootstrap brokers, `host:port`.
    pub brokers: Vec<String>,
    /// Upper bound on how long a fetch waits for new data.
    pub max_wait_ms: i32,
    /// Give up connecting after this long instead of retrying forever.
    pub connect_timeout: Duration,
}

/// Kafka-backed `LogBroker`.
///
/// The client connects on first use, so building a broker never blocks and a
/// connect failure surfaces from the first `partitions` / `open_partition` call.
pub struct KafkaBroker {
    settings: KafkaSettings,
    client: OnceCell<Client>,
}

impl std::fmt::Debug for KafkaBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaBroker")
            .field("brokers", &self.settings.brokers)
            .field("max_wait_ms", &self.settings.max_wait_ms)
            .field("connected", &self.client.initialized())
            .finish()
    }
}

impl KafkaBroker {
    pub fn new(settings: KafkaSettings) -> Self {
        Self {
            settings,
            client: OnceCell::new(),
        }
    }

    /// Connected client; bootstraps it on the first call.
    async fn client(&self) -> Result<&Client, BrokerError> {
        self.client.get_or_try_init(|| connect(&self.settings)).await
    }
}

/// Connect to the bootstrap brokers and fetch cluster metadata.
async fn connect(settings: &KafkaSettings) -> Result<Client, BrokerError> {
    let backoff = BackoffConfig {
        deadline: Some(settings.connect_timeout),
        ..Default::default()
    };
    let client = ClientBuilder::new(settings.brokers.clone())
        .backoff_config(backoff)
        .build()
        .await
        .map_err(|e| BrokerError::connect(e.to_string()))
        .map_err(|e| e.with_context(settings.brokers.join(",")))?;

    tracing::info!(brokers = ?settings.brokers, "connected to kafka");
    Ok(client)
}

impl LogBroker for KafkaBroker {
    fn partitions(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<i32>, BrokerError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            let topics = self
                .client()
                .await?
                .list_topics()
                .await
                .map_err(|e| BrokerError::metadata(e.to_string()))?;
            partitions_of(&topics, &topic)
        })
    }

    fn open_partition(
        &self,
        topic: &str,
        partition: i32,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn PartitionStream>, BrokerError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            let client = self
                .client()
                .await?
                .partition_client(topic.clone(), partition, UnknownTopicHandling::Error)
                .await
                .map_err(|e| BrokerError::metadata(e.to_string()))
                .map_err(|e| e.with_context(format!("topic '{topic}' partition {partition}")))?;

            let consumer = StreamConsumerBuilder::new(Arc::new(client), StartOffset::Earliest)
                .with_max_wait_ms(self.settings.max_wait_ms)
                .build();

            Ok(Box::new(KafkaPartitionStream { partition, consumer }) as Box<dyn PartitionStream>)
        })
    }
}

/// Sorted partition ids of `name`, or `UnknownTopic`.
fn partitions_of(topics: &[Topic], name: &str) -> Result<Vec<i32>, BrokerError> {
    topics
        .iter()
        .find(|t| t.name == name)
        .map(|t| t.partitions.iter().copied().collect())
        .ok_or_else(|| BrokerError::unknown_topic(name))
}

// ---------------------------------------------------------------------------
// PartitionStream implementation
// ---------------------------------------------------------------------------

struct KafkaPartitionStream {
    partition: i32,
    consumer: StreamConsumer,
}

impl PartitionStream for KafkaPartitionStream {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<LogMessage, BrokerError>>> + Send + '_>> {
        Box::pin(async move {
            let partition = self.partition;
            match self.consumer.next().await? {
                Ok((record, _high_watermark)) => Some(Ok(to_log_message(partition, record))),
                Err(e) => Some(Err(BrokerError::fetch(e.to_string())
                    .with_context(format!("partition {partition}")))),
            }
        })
    }
}

fn to_log_message(partition: i32, record: RecordAndOffset) -> LogMessage {
    LogMessage {
        partition,
        offset: record.offset,
        payload: record.record.value,
    }
}
