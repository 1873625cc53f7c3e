use metacache_api::BrokerError;

/// Configuration could not be read or parsed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),
}

impl EngineError {
    /// Add context to the error. Context is prepended to the message.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
        }
    }
}

/// Ingestion could not be brought up. Fatal for the server: there is no
/// retry, the process exits.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("topic '{0}' has no partitions")]
    NoPartitions(String),
}
