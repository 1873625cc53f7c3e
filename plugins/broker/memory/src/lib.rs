use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tokio::sync::watch;

use metacache_api::{BrokerError, LogBroker, LogMessage, PartitionStream};

// ---------------------------------------------------------------------------
// Partition log
// ---------------------------------------------------------------------------

enum Entry {
    Message(Option<Vec<u8>>),
    /// Read failure reported to whoever reaches this position.
    Error(String),
}

#[derive(Default)]
struct PartitionLog {
    entries: Vec<Entry>,
    closed: bool,
}

struct MemoryPartition {
    id: i32,
    log: Mutex<PartitionLog>,
    /// Bumped on every append and on close; caught-up readers wait on it.
    version: watch::Sender<u64>,
}

impl MemoryPartition {
    fn new(id: i32) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            id,
            log: Mutex::new(PartitionLog::default()),
            version,
        }
    }

    fn log(&self) -> MutexGuard<'_, PartitionLog> {
        match self.log.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!(partition = self.id, "partition log lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn push(&self, entry: Entry) -> Result<i64, BrokerError> {
        let offset = {
            let mut log = self.log();
            if log.closed {
                return Err(BrokerError::fetch(format!("partition {} is closed", self.id)));
            }
            log.entries.push(entry);
            (log.entries.len() - 1) as i64
        };
        self.version.send_modify(|v| *v += 1);
        Ok(offset)
    }

    fn close(&self) {
        self.log().closed = true;
        self.version.send_modify(|v| *v += 1);
    }
}

// ---------------------------------------------------------------------------
// MemoryBroker
// ---------------------------------------------------------------------------

/// In-process partitioned log.
///
/// Streams replay every partition from offset 0 and then wait for new
/// appends until the partition is closed.
pub struct MemoryBroker {
    topics: RwLock<HashMap<String, Vec<Arc<MemoryPartition>>>>,
    reachable: bool,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            reachable: true,
        }
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker every call fails on with a connect error.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::default()
        }
    }

    /// Create (or replace) `topic` with partitions `0..partitions`.
    pub fn create_topic(&self, topic: &str, partitions: usize) {
        let parts = (0..partitions as i32)
            .map(|id| Arc::new(MemoryPartition::new(id)))
            .collect();
        let mut guard = match self.topics.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("memory broker write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.insert(topic.to_string(), parts);
    }

    /// Append a payload, returning its offset.
    pub fn append(
        &self,
        topic: &str,
        partition: i32,
        payload: impl Into<Vec<u8>>,
    ) -> Result<i64, BrokerError> {
        self.partition(topic, partition)?
            .push(Entry::Message(Some(payload.into())))
    }

    /// Append a value-less record.
    pub fn append_tombstone(&self, topic: &str, partition: i32) -> Result<i64, BrokerError> {
        self.partition(topic, partition)?.push(Entry::Message(None))
    }

    /// Append a position that fails to read with `message`.
    pub fn append_error(
        &self,
        topic: &str,
        partition: i32,
        message: &str,
    ) -> Result<i64, BrokerError> {
        self.partition(topic, partition)?
            .push(Entry::Error(message.to_string()))
    }

    /// Close every partition of `topic`. Readers drain what is left, then end.
    pub fn close(&self, topic: &str) -> Result<(), BrokerError> {
        for partition in self.topic(topic)? {
            partition.close();
        }
        Ok(())
    }

    fn topic(&self, topic: &str) -> Result<Vec<Arc<MemoryPartition>>, BrokerError> {
        let guard = match self.topics.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("memory broker read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard
            .get(topic)
            .cloned()
            .ok_or_else(|| BrokerError::unknown_topic(topic))
    }

    fn partition(&self, topic: &str, partition: i32) -> Result<Arc<MemoryPartition>, BrokerError> {
        self.topic(topic)?
            .into_iter()
            .find(|p| p.id == partition)
            .ok_or_else(|| {
                BrokerError::metadata(format!("partition {partition} of topic '{topic}' not found"))
            })
    }

    fn check_reachable(&self) -> Result<(), BrokerError> {
        if self.reachable {
            Ok(())
        } else {
            Err(BrokerError::connect("memory broker is unreachable"))
        }
    }
}

impl LogBroker for MemoryBroker {
    fn partitions(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<i32>, BrokerError>> + Send + '_>> {
        let result = self
            .check_reachable()
            .and_then(|()| self.topic(topic))
            .map(|parts| parts.iter().map(|p| p.id).collect());
        Box::pin(async move { result })
    }

    fn open_partition(
        &self,
        topic: &str,
        partition: i32,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn PartitionStream>, BrokerError>> + Send + '_>> {
        let result = self
            .check_reachable()
            .and_then(|()| self.partition(topic, partition))
            .map(|partition| {
                let changes = partition.version.subscribe();
                Box::new(MemoryPartitionStream {
                    partition,
                    offset: 0,
                    changes,
                }) as Box<dyn PartitionStream>
            });
        Box::pin(async move { result })
    }
}

// ---------------------------------------------------------------------------
// PartitionStream implementation
// ---------------------------------------------------------------------------

struct MemoryPartitionStream {
    partition: Arc<MemoryPartition>,
    offset: usize,
    changes: watch::Receiver<u64>,
}

impl PartitionStream for MemoryPartitionStream {
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<LogMessage, BrokerError>>> + Send + '_>> {
        Box::pin(async move {
            loop {
                // Mark the current version seen before looking, so an append
                // racing with the check still wakes `changed()` below.
                self.changes.borrow_and_update();
                {
                    let log = self.partition.log();
                    if let Some(entry) = log.entries.get(self.offset) {
                        let item = match entry {
                            Entry::Message(payload) => Ok(LogMessage {
                                partition: self.partition.id,
                                offset: self.offset as i64,
                                payload: payload.clone(),
                            }),
                            Entry::Error(message) => Err(BrokerError::fetch(message.clone())),
                        };
                        drop(log);
                        self.offset += 1;
                        return Some(item);
                    }
                    if log.closed {
                        return None;
                    }
                }
                if self.changes.changed().await.is_err() {
                    return None;
                }
            }
        })
    }
}
