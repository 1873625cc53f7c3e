pub mod broker;
pub mod error;
pub mod record;

pub use broker::{LogBroker, LogMessage, PartitionStream};
pub use error::{BrokerError, ErrorKind, IngestError};
pub use record::{MetadataRecord, USERNAME_FIELD};
