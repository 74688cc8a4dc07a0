//! Snapshot of a working directory.
//!
//! A [`WorkingTree`] maps paths to a mode plus content. Content is either
//! raw bytes (not yet stored) or the id of an object already in the store.
//! Filesystem scanning is left to the caller; this type only describes what
//! the directory holds so it can be diffed and written as trees.

use std::collections::BTreeMap;

use grove_diff::{FlatEntry, FlatTreeSource};
use grove_store::{Blob, EntryMode, ObjectStore, ObjectStoreExt, TreeBuilder};
use grove_types::ObjectId;
use tracing::debug;

use crate::error::IndexResult;
use crate::index::Index;

/// File content as the working tree sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileContent {
    /// Identical to an object already in the store.
    Stored(ObjectId),
    /// Bytes that have not been written yet.
    Bytes(Vec<u8>),
}

impl FileContent {
    /// The blob id this content has, computed without storing anything.
    pub fn id(&self) -> ObjectId {
        match self {
            FileContent::Stored(id) => *id,
            FileContent::Bytes(data) => Blob::new(data.clone()).to_stored_object().compute_id(),
        }
    }

    /// Make sure the content is in `store` and return its id.
    pub fn write<S: ObjectStore + ?Sized>(&self, store: &S) -> IndexResult<ObjectId> {
        match self {
            FileContent::Stored(id) => Ok(*id),
            FileContent::Bytes(data) => Ok(store.write_blob(data)?),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkingFile {
    pub mode: EntryMode,
    pub content: FileContent,
}

/// Everything currently present in a working directory.
#[derive(Clone, Debug, Default)]
pub struct WorkingTree {
    files: BTreeMap<String, WorkingFile>,
}

impl WorkingTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clean working tree: exactly the resolved index content.
    pub fn from_index(index: &Index) -> Self {
        let files = index
            .flat_entries()
            .into_iter()
            .map(|e| {
                let file = WorkingFile {
                    mode: e.mode,
                    content: FileContent::Stored(e.id),
                };
                (e.path, file)
            })
            .collect();
        Self { files }
    }

    /// Create or overwrite a file.
    pub fn write_file(&mut self, path: impl Into<String>, data: impl Into<Vec<u8>>, mode: EntryMode) {
        self.files.insert(
            path.into(),
            WorkingFile {
                mode,
                content: FileContent::Bytes(data.into()),
            },
        );
    }

    /// Record a file whose content is already stored (or a gitlink).
    pub fn put_object(&mut self, path: impl Into<String>, mode: EntryMode, id: ObjectId) {
        self.files.insert(
            path.into(),
            WorkingFile {
                mode,
                content: FileContent::Stored(id),
            },
        );
    }

    /// Delete a file; returns whether it existed.
    pub fn remove(&mut self, path: &str) -> bool {
        self.files.remove(path).is_some()
    }

    pub fn get(&self, path: &str) -> Option<&WorkingFile> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Paths present here but not staged at any stage, in path order.
    pub fn untracked(&self, index: &Index) -> Vec<String> {
        self.files
            .keys()
            .filter(|p| !index.contains(p))
            .cloned()
            .collect()
    }

    /// The tracked files as they currently are on disk.
    ///
    /// Every resolved index path is taken with its working content; paths
    /// missing from the working tree are dropped, except gitlinks, whose
    /// content lives outside this tree and stays as staged.
    pub fn tracked_entries(&self, index: &Index) -> Vec<FlatEntry> {
        index
            .flat_entries()
            .into_iter()
            .filter_map(|staged| match self.files.get(&staged.path) {
                Some(file) => Some(FlatEntry::new(staged.path, file.mode, file.content.id())),
                None if staged.mode == EntryMode::Gitlink => Some(staged),
                None => None,
            })
            .collect()
    }

    pub fn tracked_source(&self, index: &Index) -> IndexResult<FlatTreeSource> {
        Ok(FlatTreeSource::new(self.tracked_entries(index))?)
    }

    /// Write blobs and trees for the tracked files; returns the root tree.
    pub fn write_tracked_tree<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        index: &Index,
    ) -> IndexResult<ObjectId> {
        let mut builder = TreeBuilder::new();
        for entry in self.tracked_entries(index) {
            let id = match self.files.get(&entry.path) {
                Some(file) => file.content.write(store)?,
                None => entry.id,
            };
            builder.insert(&entry.path, entry.mode, id)?;
        }
        let tree = builder.write(store)?;
        debug!(tree = %tree.short_hex(), "working tree written");
        Ok(tree)
    }

    /// Write blobs and trees for the untracked files, if there are any.
    pub fn write_untracked_tree<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        index: &Index,
    ) -> IndexResult<Option<ObjectId>> {
        let untracked = self.untracked(index);
        if untracked.is_empty() {
            return Ok(None);
        }
        let mut builder = TreeBuilder::new();
        for path in &untracked {
            if let Some(file) = self.files.get(path) {
                builder.insert(path, file.mode, file.content.write(store)?)?;
            }
        }
        let tree = builder.write(store)?;
        debug!(files = untracked.len(), tree = %tree.short_hex(), "untracked tree written");
        Ok(Some(tree))
    }
}
