//! Working directory status.
//!
//! Status is two diffs plus two lists: the committed tree against the index
//! (staged), the index against the working tree (unstaged), the files the
//! index does not know (untracked), and the paths stuck in a merge
//! (conflicts).

use grove_diff::{diff_trees, DiffEntry, DiffOptions, EmptyTreeSource, StoredTreeSource, TreeSource};
use grove_store::ObjectStore;
use grove_types::ObjectId;

use crate::error::IndexResult;
use crate::index::Index;
use crate::worktree::WorkingTree;

/// Complete status of a working directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkdirStatus {
    /// Committed tree to index.
    pub staged: Vec<DiffEntry>,
    /// Index to working tree, tracked files only.
    pub unstaged: Vec<DiffEntry>,
    /// Files present in the working directory but not in the index.
    pub untracked: Vec<String>,
    /// Paths with unresolved merge stages.
    pub conflicts: Vec<String>,
}

impl WorkdirStatus {
    /// Returns `true` if there are no changes of any kind.
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty()
            && self.unstaged.is_empty()
            && self.untracked.is_empty()
            && self.conflicts.is_empty()
    }

    pub fn has_staged_changes(&self) -> bool {
        !self.staged.is_empty()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Total number of entries across all categories.
    pub fn total_entries(&self) -> usize {
        self.staged.len() + self.unstaged.len() + self.untracked.len() + self.conflicts.len()
    }
}

/// Compute the status of `worktree` and `index` relative to `head_tree`
/// (`None` before the first commit).
///
/// Conflicted paths only appear under `conflicts`.
pub fn status(
    store: &dyn ObjectStore,
    head_tree: Option<&ObjectId>,
    index: &Index,
    worktree: &WorkingTree,
    options: &DiffOptions,
) -> IndexResult<WorkdirStatus> {
    let head: Box<dyn TreeSource> = match head_tree {
        Some(id) => Box::new(StoredTreeSource(*id)),
        None => Box::new(EmptyTreeSource),
    };
    let staged_source = index.tree_source()?;
    let working_source = worktree.tracked_source(index)?;

    let conflicts = index.conflict_paths();
    let not_conflicted = |e: &DiffEntry| conflicts.binary_search_by(|c| c.as_str().cmp(e.path())).is_err();

    let mut staged = diff_trees(store, head.as_ref(), &staged_source, options)?;
    staged.retain(not_conflicted);
    let mut unstaged = diff_trees(store, &staged_source, &working_source, options)?;
    unstaged.retain(not_conflicted);

    Ok(WorkdirStatus {
        staged,
        unstaged,
        untracked: worktree.untracked(index),
        conflicts,
    })
}
