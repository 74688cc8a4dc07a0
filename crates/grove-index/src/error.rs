//! Error types for the index crate.

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The specified path was not found in the index.
    #[error("path not found in index: {0}")]
    PathNotFound(String),

    /// The entry has a conflict that must be resolved first.
    #[error("unresolved conflict at path: {0}")]
    UnresolvedConflict(String),

    /// An invalid path was provided.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A persisted index written by an incompatible version.
    #[error("unsupported index version {0}")]
    UnsupportedVersion(u32),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    Store(#[from] grove_store::StoreError),

    #[error("diff error: {0}")]
    Diff(#[from] grove_diff::DiffError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
