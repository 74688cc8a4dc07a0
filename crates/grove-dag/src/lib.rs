//! Commit graph traversal for Grove.
//!
//! Walks the history graph formed by commit parent links, yielding commits
//! reachable from a set of starting points but not from a set of
//! uninteresting ones, in date, topological or first-parent order.

pub mod error;
pub mod merge_base;
pub mod node;
pub mod walk;

pub use error::{DagError, DagResult};
pub use merge_base::{is_ancestor, merge_base, merge_bases};
pub use node::CommitNode;
pub use walk::{RevSort, RevWalk};
