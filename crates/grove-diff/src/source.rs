//! Inputs to a tree walk.

use std::collections::HashMap;

use grove_store::{EntryMode, ObjectStore, ObjectStoreExt, StoreError, TreeBuilder, TreeEntry};
use grove_types::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{DiffError, DiffResult};

/// A tree-like input to [`TreeWalk`](crate::TreeWalk).
///
/// A source exposes one directory level at a time, always in
/// [`tree_order`](grove_store::tree_order), so the walk can merge several
/// sources without buffering whole trees.
pub trait TreeSource {
    /// Entries of the root directory.
    fn root(&self, store: &dyn ObjectStore) -> DiffResult<Vec<TreeEntry>>;

    /// Entries of the directory `dir`, found at `path` (slash separated).
    fn children(
        &self,
        store: &dyn ObjectStore,
        path: &str,
        dir: &TreeEntry,
    ) -> DiffResult<Vec<TreeEntry>>;
}

/// A tree object in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoredTreeSource(pub ObjectId);

impl TreeSource for StoredTreeSource {
    fn root(&self, store: &dyn ObjectStore) -> DiffResult<Vec<TreeEntry>> {
        Ok(store.read_tree(&self.0)?.entries)
    }

    fn children(
        &self,
        store: &dyn ObjectStore,
        _path: &str,
        dir: &TreeEntry,
    ) -> DiffResult<Vec<TreeEntry>> {
        Ok(store.read_tree(&dir.object_id)?.entries)
    }
}

/// The empty tree; every entry of the other inputs is unmatched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmptyTreeSource;

impl TreeSource for EmptyTreeSource {
    fn root(&self, _store: &dyn ObjectStore) -> DiffResult<Vec<TreeEntry>> {
        Ok(Vec::new())
    }

    fn children(
        &self,
        _store: &dyn ObjectStore,
        _path: &str,
        _dir: &TreeEntry,
    ) -> DiffResult<Vec<TreeEntry>> {
        Ok(Vec::new())
    }
}

/// One leaf of a flat working state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatEntry {
    pub path: String,
    pub mode: EntryMode,
    pub id: ObjectId,
}

impl FlatEntry {
    pub fn new(path: impl Into<String>, mode: EntryMode, id: ObjectId) -> Self {
        Self {
            path: path.into(),
            mode,
            id,
        }
    }
}

/// A flat list of leaves, such as a staging index or a working tree scan.
///
/// Directory levels and their tree ids are computed in memory on
/// construction, so a flat source and a stored tree with the same content
/// report the same directory ids and identical subtrees can be pruned.
#[derive(Clone, Debug)]
pub struct FlatTreeSource {
    dirs: HashMap<String, Vec<TreeEntry>>,
    root_id: ObjectId,
}

impl FlatTreeSource {
    pub fn new(entries: impl IntoIterator<Item = FlatEntry>) -> DiffResult<Self> {
        let mut builder = TreeBuilder::new();
        for entry in entries {
            builder
                .insert(&entry.path, entry.mode, entry.id)
                .map_err(|e| match e {
                    StoreError::InvalidPath(p) | StoreError::PathConflict(p) => {
                        DiffError::InvalidPath(p)
                    }
                    other => other.into(),
                })?;
        }
        let trees = builder.build()?;
        let root_id = match trees.last() {
            Some((_, root)) => root.to_stored_object()?.compute_id(),
            None => return Err(DiffError::InvalidPath("no root".into())),
        };
        let dirs = trees
            .into_iter()
            .map(|(path, tree)| (path, tree.entries))
            .collect();
        Ok(Self { dirs, root_id })
    }

    /// Id the root tree would have if written.
    pub fn root_id(&self) -> ObjectId {
        self.root_id
    }

    fn level(&self, path: &str) -> Vec<TreeEntry> {
        self.dirs.get(path).cloned().unwrap_or_default()
    }
}

impl TreeSource for FlatTreeSource {
    fn root(&self, _store: &dyn ObjectStore) -> DiffResult<Vec<TreeEntry>> {
        Ok(self.level(""))
    }

    fn children(
        &self,
        _store: &dyn ObjectStore,
        path: &str,
        _dir: &TreeEntry,
    ) -> DiffResult<Vec<TreeEntry>> {
        Ok(self.level(path))
    }
}
