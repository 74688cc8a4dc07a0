//! Two-way tree diff.

use grove_store::{EntryMode, ObjectStore};
use grove_types::ObjectId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DiffError, DiffResult};
use crate::rename::RenameDetector;
use crate::source::{EmptyTreeSource, StoredTreeSource, TreeSource};
use crate::walk::{TreeFilter, TreeWalk};

/// Kind of change between two inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Add,
    Delete,
    Modify,
    Copy,
    Rename,
}

/// One change between an old and a new input.
///
/// For `Add` the old side is null, for `Delete` the new side is null.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub change_type: ChangeType,
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub old_id: ObjectId,
    pub new_id: ObjectId,
    pub old_mode: Option<EntryMode>,
    pub new_mode: Option<EntryMode>,
    /// Similarity percentage for renames and copies (100 = exact).
    pub score: u8,
}

impl DiffEntry {
    pub fn add(path: impl Into<String>, mode: EntryMode, id: ObjectId) -> Self {
        Self {
            change_type: ChangeType::Add,
            old_path: None,
            new_path: Some(path.into()),
            old_id: ObjectId::null(),
            new_id: id,
            old_mode: None,
            new_mode: Some(mode),
            score: 0,
        }
    }

    pub fn delete(path: impl Into<String>, mode: EntryMode, id: ObjectId) -> Self {
        Self {
            change_type: ChangeType::Delete,
            old_path: Some(path.into()),
            new_path: None,
            old_id: id,
            new_id: ObjectId::null(),
            old_mode: Some(mode),
            new_mode: None,
            score: 0,
        }
    }

    pub fn modify(
        path: impl Into<String>,
        old: (EntryMode, ObjectId),
        new: (EntryMode, ObjectId),
    ) -> Self {
        let path = path.into();
        Self {
            change_type: ChangeType::Modify,
            old_path: Some(path.clone()),
            new_path: Some(path),
            old_id: old.1,
            new_id: new.1,
            old_mode: Some(old.0),
            new_mode: Some(new.0),
            score: 0,
        }
    }

    /// Path used for ordering: the new path, or the old one for deletes.
    pub fn path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or("")
    }

    /// Classify every row of a two-input walk.
    ///
    /// The walk is switched to recursive mode and its filter is narrowed to
    /// rows that differ. Entries come back sorted by [`DiffEntry::path`].
    pub fn scan(walk: TreeWalk<'_>) -> DiffResult<Vec<DiffEntry>> {
        if walk.source_count() != 2 {
            return Err(DiffError::SourceCount {
                expected: 2,
                actual: walk.source_count(),
            });
        }
        let mut out = Vec::new();
        for row in walk.recursive(true).only_differences() {
            let row = row?;
            let sides = (row.entry(0).copied(), row.entry(1).copied());
            let entry = match sides {
                (None, Some(new)) => DiffEntry::add(row.path, new.mode, new.id),
                (Some(old), None) => DiffEntry::delete(row.path, old.mode, old.id),
                (Some(old), Some(new)) if old != new => {
                    DiffEntry::modify(row.path, (old.mode, old.id), (new.mode, new.id))
                }
                _ => continue,
            };
            out.push(entry);
        }
        sort_entries(&mut out);
        Ok(out)
    }
}

pub(crate) fn sort_entries(entries: &mut [DiffEntry]) {
    entries.sort_by(|a, b| a.path().as_bytes().cmp(b.path().as_bytes()));
}

/// Diff settings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Pair exact-content deletes and adds as renames or copies.
    pub detect_renames: bool,
    /// Restrict the diff to these paths (and everything below them).
    pub paths: Vec<String>,
}

/// Diff two tree sources.
pub fn diff_trees(
    store: &dyn ObjectStore,
    old: &dyn TreeSource,
    new: &dyn TreeSource,
    options: &DiffOptions,
) -> DiffResult<Vec<DiffEntry>> {
    let mut walk = TreeWalk::new(store, vec![old, new]);
    if !options.paths.is_empty() {
        walk = walk.filter(TreeFilter::Paths(options.paths.clone()));
    }
    let mut entries = DiffEntry::scan(walk)?;
    if options.detect_renames {
        entries = RenameDetector::new().detect(entries);
    }
    debug!(changes = entries.len(), "tree diff complete");
    Ok(entries)
}

/// Diff two stored trees; `None` stands for the empty tree.
pub fn diff_tree_ids(
    store: &dyn ObjectStore,
    old: Option<&ObjectId>,
    new: Option<&ObjectId>,
    options: &DiffOptions,
) -> DiffResult<Vec<DiffEntry>> {
    let old_source: Box<dyn TreeSource> = match old {
        Some(id) => Box::new(StoredTreeSource(*id)),
        None => Box::new(EmptyTreeSource),
    };
    let new_source: Box<dyn TreeSource> = match new {
        Some(id) => Box::new(StoredTreeSource(*id)),
        None => Box::new(EmptyTreeSource),
    };
    diff_trees(store, old_source.as_ref(), new_source.as_ref(), options)
}
