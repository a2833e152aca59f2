use crate::store::StoreError;
use thiserror::Error;

/// Error type for engine operations
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    /// A stored posting did not parse back into doc id + offset + length.
    /// Queries fail fast on this rather than skipping entries.
    #[error("malformed posting entry: {0:?}")]
    MalformedPosting(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    /// Check if this error indicates a transient failure that could be retried
    pub fn is_retriable(&self) -> bool {
        matches!(self, SearchError::Store(StoreError::Unavailable(_)))
    }
}
