//! Reference management for Grove.
//!
//! References are the mutable names (`refs/heads/main`, `refs/stash`, ...)
//! that point into the immutable object graph. Every change to a reference
//! is a compare-and-swap against the value the caller last observed, and
//! every successful change is recorded in that reference's reflog.
//!
//! # Modules
//!
//! - [`error`]: error type for ref operations
//! - [`types`]: [`Ref`] and [`ReflogEntry`]
//! - [`traits`]: the [`RefStore`] interface
//! - [`names`]: git-style name validation
//! - [`memory`]: [`InMemoryRefStore`] for tests and ephemeral repositories
//! - [`file`]: [`FileRefStore`], the on-disk backend

pub mod error;
pub mod file;
mod lock;
pub mod memory;
pub mod names;
pub mod traits;
pub mod types;

pub use error::{RefError, RefResult};
pub use file::FileRefStore;
pub use lock::DEFAULT_LOCK_TIMEOUT;
pub use memory::InMemoryRefStore;
pub use names::{branch_ref, short_name, validate_ref_name};
pub use traits::RefStore;
pub use types::{Ref, ReflogEntry};
