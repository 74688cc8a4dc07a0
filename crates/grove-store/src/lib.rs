//! Content-addressed object storage for Grove.
//!
//! This crate implements a hash-keyed object store analogous to git's
//! `.git/objects/` directory. Every piece of history (file contents,
//! directory listings, commits, annotated tags) is stored as an immutable
//! object identified by the BLAKE3 hash of its canonical encoding.
//!
//! # Object Types
//!
//! - [`Blob`] -- raw content (file contents, arbitrary data)
//! - [`Tree`] -- directory listing mapping names to object references
//! - [`Commit`] -- history node: tree, parents, author, committer, message
//! - [`Tag`] -- annotated pointer to another object
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`LooseObjectStore`] -- one file per object, zstd-compressed above a
//!   size threshold
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Write-then-link: children are written before the trees and commits
//!    that reference them; [`ObjectStoreExt`] enforces this for typed writes.
//! 3. Concurrent reads are always safe (objects are immutable).
//! 4. Every read re-hashes the bytes; a mismatch is reported, never returned.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod builder;
pub mod error;
pub mod loose;
pub mod memory;
pub mod object;
pub mod traits;
pub mod tree;

// Re-export primary types at crate root for ergonomic imports.
pub use builder::{flatten_tree, TreeBuilder};
pub use error::{StoreError, StoreResult};
pub use loose::{LooseConfig, LooseObjectStore};
pub use memory::InMemoryObjectStore;
pub use object::{message_subject, Blob, Commit, Object, ObjectKind, StoredObject, Tag};
pub use traits::{ObjectStore, ObjectStoreExt};
pub use tree::{tree_order, EntryMode, Tree, TreeEntry};
