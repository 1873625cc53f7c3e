use std::sync::Arc;

use metacache_api::MetadataRecord;

use crate::store::MetadataStore;

/// Outcome of a failed lookup. Confined to the one request that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("Username query parameter is required")]
    BadRequest,

    #[error("Metadata not found for the given username")]
    NotFound,
}

/// Read-only facade over the store for request handlers.
#[derive(Debug, Clone)]
pub struct QueryService {
    store: Arc<MetadataStore>,
}

impl QueryService {
    pub fn new(store: Arc<MetadataStore>) -> Self {
        Self { store }
    }

    /// Latest record of `username`, returned as stored.
    pub fn lookup(&self, username: Option<&str>) -> Result<Arc<MetadataRecord>, QueryError> {
        let username = match username {
            Some(u) if !u.is_empty() => u,
            _ => return Err(QueryError::BadRequest),
        };
        self.store.get(username).ok_or(QueryError::NotFound)
    }
}
