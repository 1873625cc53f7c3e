use std::future::Future;
use std::pin::Pin;

use crate::error::BrokerError;

/// One message read from a log partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub partition: i32,
    /// Partition-local position assigned by the log.
    pub offset: i64,
    /// Raw payload. `None` for tombstones / value-less records.
    pub payload: Option<Vec<u8>>,
}

/// Sequential reader over a single partition.
///
/// Yields messages in log order. `None` means the upstream closed the
/// partition; `Some(Err(_))` is a transient read failure and the caller
/// may keep polling.
pub trait PartitionStream: Send {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<LogMessage, BrokerError>>> + Send + '_>>;
}

/// Partitioned log the ingestion side consumes from.
///
/// The engine doesn't know concrete brokers. For the engine, a broker is
/// just this trait.
pub trait LogBroker: Send + Sync {
    /// Partition ids of `topic`.
    fn partitions(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<i32>, BrokerError>> + Send + '_>>;

    /// Open `partition` of `topic`, positioned at the oldest retained offset.
    fn open_partition(
        &self,
        topic: &str,
        partition: i32,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn PartitionStream>, BrokerError>> + Send + '_>>;
}
