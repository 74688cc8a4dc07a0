//! Tree walking and diffing for Grove.
//!
//! Walks any number of tree-like inputs in lockstep and classifies the
//! differences between two of them.
//!
//! # Key Types
//!
//! - [`TreeSource`] -- an input to a walk: a stored tree, the empty tree, or a
//!   flat list of `(path, mode, id)` leaves such as a staging index
//! - [`TreeWalk`] / [`WalkRow`] -- lockstep iterator over N sources
//! - [`DiffEntry`] / [`ChangeType`] -- one classified change between two inputs
//! - [`RenameDetector`] -- exact-content rename and copy pairing

pub mod diff;
pub mod error;
pub mod rename;
pub mod source;
pub mod walk;

pub use diff::{diff_tree_ids, diff_trees, ChangeType, DiffEntry, DiffOptions};
pub use error::{DiffError, DiffResult};
pub use rename::RenameDetector;
pub use source::{EmptyTreeSource, FlatEntry, FlatTreeSource, StoredTreeSource, TreeSource};
pub use walk::{TreeFilter, TreeWalk, WalkEntry, WalkRow};
