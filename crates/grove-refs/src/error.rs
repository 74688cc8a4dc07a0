//! Error types for reference operations.

use std::time::Duration;

use grove_types::ObjectId;
use thiserror::Error;

/// Errors that can occur during reference operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The reference does not exist.
    #[error("ref not found: {name}")]
    NotFound { name: String },

    /// The stored value differed from the caller's expected old value.
    #[error("stale ref {name}: expected {expected}, found {actual}")]
    Stale {
        name: String,
        expected: ObjectId,
        actual: ObjectId,
    },

    /// Another writer held the reference for longer than the lock timeout.
    #[error("timed out after {waited:?} waiting for lock on {name}")]
    LockTimeout { name: String, waited: Duration },

    #[error("invalid ref name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// The name would nest under, or contain, an existing reference.
    #[error("ref {name} conflicts with existing ref {existing}")]
    NameConflict { name: String, existing: String },

    /// Updates must point at a real object; use `delete` to remove a ref.
    #[error("cannot point {name} at the null id")]
    NullTarget { name: String },

    /// A ref file or reflog line could not be parsed.
    #[error("malformed ref data for {name}: {reason}")]
    Malformed { name: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for ref operations.
pub type RefResult<T> = std::result::Result<T, RefError>;
