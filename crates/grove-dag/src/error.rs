//! Error types for commit graph traversal.

use grove_store::StoreError;
use grove_types::ObjectId;

/// Errors that can occur while walking history.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    /// A commit named as a start point or parent is absent from the store.
    #[error("missing commit {id}{}", referenced_by.map(|c| format!(" (parent of {c})")).unwrap_or_default())]
    MissingObject {
        /// The commit that could not be loaded.
        id: ObjectId,
        /// The child whose parent list named it, if any.
        referenced_by: Option<ObjectId>,
    },

    /// Marks were added after iteration began.
    #[error("walk already started")]
    AlreadyStarted,

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias for DAG results.
pub type DagResult<T> = Result<T, DagError>;
