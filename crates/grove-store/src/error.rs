use grove_types::ObjectId;

use crate::object::ObjectKind;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// Content hash mismatch on read (data corruption).
    #[error("corrupt object {id}: content hashes to {computed}")]
    HashMismatch { id: ObjectId, computed: ObjectId },

    /// The object bytes violate the encoding of their kind.
    #[error("malformed {kind} object: {reason}")]
    Malformed { kind: &'static str, reason: String },

    /// A tree encoding is structurally invalid (ordering, mode, truncation).
    #[error("malformed tree: {0}")]
    MalformedTree(String),

    /// The object had an unexpected kind (e.g., expected tree, got blob).
    #[error("unexpected object kind for {id}: expected {expected}, got {actual}")]
    KindMismatch {
        id: ObjectId,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    /// A tree, commit or tag refers to an object that is not in the store.
    #[error("{kind} refers to missing object {missing}")]
    Dangling { kind: ObjectKind, missing: ObjectId },

    /// Two paths handed to the tree builder collide (file vs directory).
    #[error("path conflict: {0}")]
    PathConflict(String),

    /// An invalid path was provided to the tree builder.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn malformed(kind: ObjectKind, reason: impl Into<String>) -> Self {
        Self::Malformed {
            kind: kind.as_str(),
            reason: reason.into(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
