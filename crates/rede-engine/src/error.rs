//! Error types for rede-engine.

use std::time::Duration;

use rede_guard::Rejection;
use rede_hierarchy::LeaderId;
use rede_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// How a caller should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caused by the request itself; report it, do not retry.
    Validation,
    /// Lost a race between validation and write; retry the whole operation.
    Concurrency,
    /// Infrastructure hiccup; retry with backoff.
    Transient,
    /// Anything else.
    Fatal,
}

/// Errors that can occur in hierarchy operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The mutation would break a tree invariant.
    #[error("rejected ({inv}): {0}", inv = .0.invariant())]
    Rejected(#[from] Rejection),

    /// No leader with this id.
    #[error("leader not found: {0}")]
    NotFound(LeaderId),

    /// The tree changed between validation and write, or while it was read.
    #[error("concurrent modification of {id}")]
    ConcurrentModification { id: LeaderId },

    /// A store call or lock wait exceeded the configured bound.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Any other store failure.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rejected(_) | Self::NotFound(_) => ErrorKind::Validation,
            Self::ConcurrentModification { .. } => ErrorKind::Concurrency,
            Self::Timeout(_) => ErrorKind::Transient,
            Self::Store(e) if e.is_transient() => ErrorKind::Transient,
            Self::Store(_) => ErrorKind::Fatal,
        }
    }

    /// Whether re-running the operation from scratch may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Concurrency | ErrorKind::Transient)
    }

    /// The guard rejection, if this is one.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Error::NotFound(id),
            StoreError::VersionConflict { id, .. } => Error::ConcurrentModification { id },
            other => Error::Store(other),
        }
    }
}
