use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("database is corrupted: {0}")]
    Corruption(String),

    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Whether this is an expected miss rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<spvrelay_types::CodecError> for StoreError {
    fn from(e: spvrelay_types::CodecError) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
