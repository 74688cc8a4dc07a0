//! Staging index and working tree snapshot for Grove.
//!
//! These are the working-state inputs to snapshotting and diffing: the
//! [`Index`] records what is staged (including unresolved merge conflicts),
//! and the [`WorkingTree`] records what the working directory currently
//! holds. Both can be presented to the tree walker as flat sources, and both
//! can be written out as tree objects.
//!
//! # Key Types
//!
//! - [`Index`] -- The staging area (BTreeMap-backed, persisted with bincode)
//! - [`IndexEntry`] -- A staged path at one conflict [`Stage`]
//! - [`WorkingTree`] -- Path to mode and content, tracked or not
//! - [`WorkdirStatus`] -- Staged, unstaged, untracked and conflicted paths

pub mod entry;
pub mod error;
pub mod index;
pub mod status;
pub mod worktree;

pub use entry::{IndexEntry, Stage};
pub use error::{IndexError, IndexResult};
pub use index::Index;
pub use status::{status, WorkdirStatus};
pub use worktree::{FileContent, WorkingFile, WorkingTree};
