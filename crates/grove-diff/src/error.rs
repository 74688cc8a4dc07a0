//! Error types for the diff crate.

use grove_store::StoreError;
use grove_types::ObjectId;

/// Errors that can occur during walk and diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// An object referenced during the walk was not found in the store.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(StoreError),

    /// A two-way operation was handed a walk over a different number of inputs.
    #[error("expected {expected} tree sources, got {actual}")]
    SourceCount { expected: usize, actual: usize },

    /// A flat source contained an unusable path.
    #[error("invalid path in flat source: {0}")]
    InvalidPath(String),
}

impl From<StoreError> for DiffError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::ObjectNotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
