pub mod config;
pub mod consumer;
pub mod coordinator;
pub mod error;
pub mod query;
pub mod store;

pub use consumer::{ConsumerStats, PartitionConsumer};
pub use coordinator::{Coordinator, Ingestion};
pub use error::{EngineError, StartupError};
pub use query::{QueryError, QueryService};
pub use store::MetadataStore;
