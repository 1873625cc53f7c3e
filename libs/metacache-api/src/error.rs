use std::fmt;

/// Error kind for broker errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connect,
    Metadata,
    UnknownTopic,
    Fetch,
}

/// Broker error — returned by all `LogBroker` / `PartitionStream` methods.
#[derive(Debug)]
pub struct BrokerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BrokerError {
    pub fn connect(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Connect, message: msg.into() }
    }

    pub fn metadata(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Metadata, message: msg.into() }
    }

    pub fn unknown_topic(topic: impl fmt::Display) -> Self {
        Self { kind: ErrorKind::UnknownTopic, message: format!("topic '{topic}' does not exist") }
    }

    pub fn fetch(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Fetch, message: msg.into() }
    }

    /// Add context to the error, preserving the original ErrorKind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for BrokerError {}

/// Per-message ingestion failure. Never fatal: the consumer logs it and
/// moves on to the next message of the partition.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Payload is absent or is not a JSON object.
    #[error("decode: {0}")]
    Decode(String),

    /// Payload is a JSON object without a usable `username`.
    #[error("schema: {0}")]
    Schema(String),
}

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
