//! The core Index structure managing staged entries.
//!
//! The [`Index`] keeps a `BTreeMap<(path, stage), IndexEntry>` as the staging
//! area. Blobs are written to the object store as files are staged; trees are
//! only written when [`Index::write_tree`] is called.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use grove_diff::{FlatEntry, FlatTreeSource};
use grove_store::{flatten_tree, EntryMode, ObjectStore, ObjectStoreExt, TreeBuilder};
use grove_types::ObjectId;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::entry::{IndexEntry, Stage};
use crate::error::{IndexError, IndexResult};

/// Version written by [`Index::to_bytes`].
pub const INDEX_VERSION: u32 = 2;

/// Persisted form of the index.
#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    entries: Vec<IndexEntry>,
}

/// The staging index: what the next commit or checkpoint will contain.
pub struct Index {
    entries: BTreeMap<(String, Stage), IndexEntry>,
    /// Tree id of the current stage-0 content, cleared on every change.
    tree_cache: Option<ObjectId>,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("entries", &self.entries.len())
            .field("tree_cache", &self.tree_cache)
            .finish()
    }
}

fn validate_path(path: &str) -> IndexResult<()> {
    let bad = path.is_empty()
        || path.contains('\0')
        || path
            .split('/')
            .any(|c| c.is_empty() || c == "." || c == "..");
    if bad {
        return Err(IndexError::InvalidPath(path.to_string()));
    }
    Ok(())
}

impl Index {
    /// Create a new empty index backed by the given store.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            entries: BTreeMap::new(),
            tree_cache: None,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Number of entries, counting every stage.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The resolved entry at `path`.
    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.get_stage(path, Stage::Merged)
    }

    pub fn get_stage(&self, path: &str, stage: Stage) -> Option<&IndexEntry> {
        self.entries.get(&(path.to_string(), stage))
    }

    /// True if `path` is staged at any stage.
    pub fn contains(&self, path: &str) -> bool {
        self.stages_of(path).next().is_some()
    }

    /// All entries ordered by path, then stage.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    fn stages_of(&self, path: &str) -> impl Iterator<Item = &IndexEntry> {
        let lo = (path.to_string(), Stage::Merged);
        let hi = (path.to_string(), Stage::Theirs);
        self.entries.range(lo..=hi).map(|(_, e)| e)
    }

    fn clear_path(&mut self, path: &str) -> bool {
        let keys: Vec<_> = self
            .stages_of(path)
            .map(|e| (e.path.clone(), e.stage))
            .collect();
        for key in &keys {
            self.entries.remove(key);
        }
        !keys.is_empty()
    }

    fn put(&mut self, entry: IndexEntry) {
        self.entries
            .insert((entry.path.clone(), entry.stage), entry);
        self.tree_cache = None;
    }

    // ---------------------------------------------------------------
    // Stage operations
    // ---------------------------------------------------------------

    /// Store `content` as a blob and stage it at `path`.
    ///
    /// Staging a path resolves any conflict recorded for it.
    pub fn stage_file(&mut self, path: &str, content: &[u8], mode: EntryMode) -> IndexResult<ObjectId> {
        validate_path(path)?;
        let id = self.store.write_blob(content)?;
        self.clear_path(path);
        self.put(IndexEntry::new(path, mode, id));
        debug!(path, id = %id.short_hex(), "staged file");
        Ok(id)
    }

    /// Stage an object that is already in the store (or a gitlink).
    pub fn stage_object(&mut self, path: &str, mode: EntryMode, id: ObjectId) -> IndexResult<()> {
        validate_path(path)?;
        if mode == EntryMode::Directory {
            return Err(IndexError::InvalidPath(format!(
                "{path}: directories cannot be staged"
            )));
        }
        self.clear_path(path);
        self.put(IndexEntry::new(path, mode, id));
        Ok(())
    }

    /// Remove `path` from the index at every stage.
    pub fn remove(&mut self, path: &str) -> IndexResult<()> {
        if !self.clear_path(path) {
            return Err(IndexError::PathNotFound(path.to_string()));
        }
        self.tree_cache = None;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Conflict management
    // ---------------------------------------------------------------

    /// Record an unresolved three-way conflict at `path`.
    ///
    /// Each side that exists becomes an entry at its stage; the resolved
    /// entry, if any, is dropped.
    pub fn record_conflict(
        &mut self,
        path: &str,
        base: Option<(EntryMode, ObjectId)>,
        ours: Option<(EntryMode, ObjectId)>,
        theirs: Option<(EntryMode, ObjectId)>,
    ) -> IndexResult<()> {
        validate_path(path)?;
        let sides = [(Stage::Base, base), (Stage::Ours, ours), (Stage::Theirs, theirs)];
        if sides.iter().all(|(_, side)| side.is_none()) {
            return Err(IndexError::InvalidPath(format!(
                "{path}: a conflict needs at least one side"
            )));
        }
        self.clear_path(path);
        for (stage, side) in sides {
            if let Some((mode, id)) = side {
                self.put(IndexEntry::new(path, mode, id).at_stage(stage));
            }
        }
        Ok(())
    }

    /// Replace the conflict at `path` with a single resolved entry.
    pub fn resolve_conflict(&mut self, path: &str, mode: EntryMode, id: ObjectId) -> IndexResult<()> {
        if !self.stages_of(path).any(|e| e.stage.is_conflict()) {
            return Err(IndexError::PathNotFound(format!("no conflict at path: {path}")));
        }
        self.stage_object(path, mode, id)
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.keys().any(|(_, stage)| stage.is_conflict())
    }

    /// Paths with unresolved conflicts, sorted and deduplicated.
    pub fn conflict_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.stage.is_conflict())
            .map(|e| e.path.clone())
            .collect();
        paths.dedup();
        paths
    }

    // ---------------------------------------------------------------
    // Trees
    // ---------------------------------------------------------------

    /// The resolved entries as flat walker input.
    pub fn flat_entries(&self) -> Vec<FlatEntry> {
        self.entries
            .values()
            .filter(|e| !e.stage.is_conflict())
            .map(|e| FlatEntry::new(e.path.clone(), e.mode, e.object_id))
            .collect()
    }

    /// The resolved entries as a tree source, without writing anything.
    pub fn tree_source(&self) -> IndexResult<FlatTreeSource> {
        Ok(FlatTreeSource::new(self.flat_entries())?)
    }

    /// Write the resolved entries as trees and return the root tree id.
    ///
    /// Fails with [`IndexError::UnresolvedConflict`] while any path has
    /// conflict stages.
    pub fn write_tree(&mut self) -> IndexResult<ObjectId> {
        if self.has_conflicts() {
            return Err(IndexError::UnresolvedConflict(self.conflict_paths().join(", ")));
        }
        if let Some(id) = self.tree_cache {
            return Ok(id);
        }

        let builder = TreeBuilder::from_entries(
            self.entries
                .values()
                .map(|e| (e.path.as_str(), e.mode, e.object_id)),
        )?;
        let tree_id = builder.write(self.store.as_ref())?;
        debug!(entries = self.entries.len(), tree = %tree_id.short_hex(), "index tree written");
        self.tree_cache = Some(tree_id);
        Ok(tree_id)
    }

    /// Replace the index contents with the leaves of a stored tree.
    pub fn read_tree(&mut self, tree_id: &ObjectId) -> IndexResult<()> {
        let leaves = flatten_tree(self.store.as_ref(), tree_id)?;
        self.entries.clear();
        for (path, mode, id) in leaves {
            self.put(IndexEntry::new(path, mode, id));
        }
        self.tree_cache = Some(*tree_id);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------

    pub fn to_bytes(&self) -> IndexResult<Vec<u8>> {
        let file = IndexFile {
            version: INDEX_VERSION,
            entries: self.entries.values().cloned().collect(),
        };
        bincode::serialize(&file).map_err(|e| IndexError::Serialization(e.to_string()))
    }

    pub fn from_bytes(store: Arc<dyn ObjectStore>, bytes: &[u8]) -> IndexResult<Self> {
        let file: IndexFile =
            bincode::deserialize(bytes).map_err(|e| IndexError::Serialization(e.to_string()))?;
        if file.version != INDEX_VERSION {
            return Err(IndexError::UnsupportedVersion(file.version));
        }
        let mut index = Self::new(store);
        for entry in file.entries {
            validate_path(&entry.path)?;
            index.put(entry);
        }
        Ok(index)
    }

    /// Atomically replace the index file at `path`.
    pub fn save(&self, path: &Path) -> IndexResult<()> {
        let dir = path
            .parent()
            .ok_or_else(|| IndexError::InvalidPath(path.display().to_string()))?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&self.to_bytes()?)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| IndexError::Io(e.error))?;
        Ok(())
    }

    /// Load the index file at `path`; a missing file is an empty index.
    pub fn load(store: Arc<dyn ObjectStore>, path: &Path) -> IndexResult<Self> {
        match fs::read(path) {
            Ok(bytes) => Self::from_bytes(store, &bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::new(store)),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_store::InMemoryObjectStore;

    fn make_store() -> Arc<dyn ObjectStore> {
        Arc::new(InMemoryObjectStore::new())
    }

    fn make_index() -> Index {
        Index::new(make_store())
    }

    fn oid(b: u8) -> ObjectId {
        ObjectId::from_hash([b; 32])
    }

    // ---- staging ----

    #[test]
    fn new_index_is_empty() {
        let idx = make_index();
        assert!(idx.is_empty());
        assert!(!idx.has_conflicts());
    }

    #[test]
    fn stage_file_writes_blob() {
        let mut idx = make_index();
        let id = idx
            .stage_file("hello.txt", b"hello world", EntryMode::Regular)
            .unwrap();
        let entry = idx.get("hello.txt").unwrap();
        assert_eq!(entry.object_id, id);
        assert_eq!(entry.mode, EntryMode::Regular);
        assert_eq!(idx.store().read_blob(&id).unwrap(), b"hello world");
    }

    #[test]
    fn rejects_bad_paths() {
        let mut idx = make_index();
        for path in ["", "/abs", "a//b", "a/../b", "./a", "trailing/"] {
            assert!(
                matches!(
                    idx.stage_file(path, b"x", EntryMode::Regular),
                    Err(IndexError::InvalidPath(_))
                ),
                "{path:?} should be rejected"
            );
        }
        assert!(matches!(
            idx.stage_object("dir", EntryMode::Directory, oid(1)),
            Err(IndexError::InvalidPath(_))
        ));
    }

    #[test]
    fn remove_entry() {
        let mut idx = make_index();
        idx.stage_file("file.txt", b"content", EntryMode::Regular)
            .unwrap();
        idx.remove("file.txt").unwrap();
        assert!(idx.is_empty());
        assert!(matches!(
            idx.remove("file.txt"),
            Err(IndexError::PathNotFound(_))
        ));
    }

    // ---- conflicts ----

    #[test]
    fn conflict_workflow() {
        let mut idx = make_index();
        idx.stage_file("c.txt", b"ours", EntryMode::Regular).unwrap();
        idx.record_conflict(
            "c.txt",
            Some((EntryMode::Regular, oid(1))),
            Some((EntryMode::Regular, oid(2))),
            Some((EntryMode::Regular, oid(3))),
        )
        .unwrap();

        assert!(idx.has_conflicts());
        assert_eq!(idx.conflict_paths(), vec!["c.txt".to_string()]);
        assert!(idx.get("c.txt").is_none());
        assert_eq!(idx.get_stage("c.txt", Stage::Theirs).unwrap().object_id, oid(3));
        assert!(idx.contains("c.txt"));
        assert_eq!(idx.len(), 3);

        idx.resolve_conflict("c.txt", EntryMode::Regular, oid(4))
            .unwrap();
        assert!(!idx.has_conflicts());
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.get("c.txt").unwrap().object_id, oid(4));
    }

    #[test]
    fn delete_modify_conflict_has_two_stages() {
        let mut idx = make_index();
        idx.record_conflict(
            "gone.txt",
            Some((EntryMode::Regular, oid(1))),
            None,
            Some((EntryMode::Regular, oid(2))),
        )
        .unwrap();
        assert_eq!(idx.len(), 2);
        assert!(idx.get_stage("gone.txt", Stage::Ours).is_none());
    }

    #[test]
    fn resolve_without_conflict_fails() {
        let mut idx = make_index();
        idx.stage_file("a", b"a", EntryMode::Regular).unwrap();
        assert!(matches!(
            idx.resolve_conflict("a", EntryMode::Regular, oid(1)),
            Err(IndexError::PathNotFound(_))
        ));
    }

    #[test]
    fn write_tree_fails_with_conflicts() {
        let mut idx = make_index();
        idx.record_conflict("f", None, Some((EntryMode::Regular, oid(1))), None)
            .unwrap();
        assert!(matches!(
            idx.write_tree(),
            Err(IndexError::UnresolvedConflict(_))
        ));
    }

    // ---- trees ----

    #[test]
    fn write_tree_and_read_tree_roundtrip() {
        let store = make_store();
        let mut idx = Index::new(Arc::clone(&store));
        idx.stage_file("alpha.txt", b"alpha", EntryMode::Regular).unwrap();
        idx.stage_file("src/lib.rs", b"lib", EntryMode::Regular).unwrap();
        idx.stage_file("run.sh", b"#!/bin/sh", EntryMode::Executable).unwrap();

        let tree_id = idx.write_tree().unwrap();
        assert_eq!(tree_id, idx.tree_source().unwrap().root_id());

        let mut idx2 = Index::new(Arc::clone(&store));
        idx2.read_tree(&tree_id).unwrap();
        assert_eq!(idx2.len(), 3);
        assert_eq!(idx2.get("run.sh").unwrap().mode, EntryMode::Executable);
        assert_eq!(idx2.write_tree().unwrap(), tree_id);
    }

    #[test]
    fn tree_cache_invalidated_on_changes() {
        let mut idx = make_index();
        idx.stage_file("a.txt", b"aaa", EntryMode::Regular).unwrap();
        let first = idx.write_tree().unwrap();
        idx.stage_file("b.txt", b"bbb", EntryMode::Regular).unwrap();
        assert_ne!(idx.write_tree().unwrap(), first);
        idx.remove("b.txt").unwrap();
        assert_eq!(idx.write_tree().unwrap(), first);
    }

    #[test]
    fn file_and_directory_at_same_path_rejected_on_write() {
        let mut idx = make_index();
        idx.stage_file("a", b"file", EntryMode::Regular).unwrap();
        idx.stage_file("a/b", b"nested", EntryMode::Regular).unwrap();
        assert!(idx.write_tree().is_err());
    }

    // ---- persistence ----

    #[test]
    fn bytes_roundtrip_keeps_stages() {
        let store = make_store();
        let mut idx = Index::new(Arc::clone(&store));
        idx.stage_file("a.txt", b"a", EntryMode::Regular).unwrap();
        idx.record_conflict(
            "b.txt",
            Some((EntryMode::Regular, oid(1))),
            Some((EntryMode::Regular, oid(2))),
            None,
        )
        .unwrap();

        let back = Index::from_bytes(store, &idx.to_bytes().unwrap()).unwrap();
        assert_eq!(
            back.entries().collect::<Vec<_>>(),
            idx.entries().collect::<Vec<_>>()
        );
        assert!(back.has_conflicts());
    }

    #[test]
    fn garbage_bytes_rejected() {
        assert!(Index::from_bytes(make_store(), b"\x01\x02").is_err());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index");
        let store = make_store();

        let empty = Index::load(Arc::clone(&store), &path).unwrap();
        assert!(empty.is_empty());

        let mut idx = Index::new(Arc::clone(&store));
        idx.stage_file("x", b"x", EntryMode::Regular).unwrap();
        idx.save(&path).unwrap();

        let loaded = Index::load(store, &path).unwrap();
        assert_eq!(loaded.get("x"), idx.get("x"));
    }
}
