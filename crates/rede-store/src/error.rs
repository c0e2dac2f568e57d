//! Error types for rede-store.

use rede_hierarchy::LeaderId;
use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row with this id.
    #[error("leader not found: {0}")]
    NotFound(LeaderId),

    /// Insert of an id that is already stored.
    #[error("leader already exists: {0}")]
    Duplicate(LeaderId),

    /// A row changed since it was read; nothing in the batch was written.
    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict {
        id: LeaderId,
        expected: u64,
        actual: u64,
    },

    /// Page token that this store never issued.
    #[error("invalid page token: {0}")]
    InvalidToken(String),

    /// Page token issued before the last write; restart from the first page.
    #[error("stale page token: issued at generation {issued}, store is at {current}")]
    StaleToken { issued: u64, current: u64 },

    /// Backend temporarily unreachable; safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Backend failure that retrying will not fix.
    #[error("storage error: {0}")]
    Storage(String),

    /// Row could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}
