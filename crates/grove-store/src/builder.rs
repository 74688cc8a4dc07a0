use std::collections::BTreeMap;

use grove_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::traits::{ObjectStore, ObjectStoreExt};
use crate::tree::{validate_name, EntryMode, Tree, TreeEntry};

#[derive(Default, Debug)]
struct DirNode {
    files: BTreeMap<String, (EntryMode, ObjectId)>,
    dirs: BTreeMap<String, DirNode>,
}

impl DirNode {
    fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.values().all(DirNode::is_empty)
    }

    /// Push this directory's subtrees, then itself, onto `out`.
    fn build(&self, path: &str, out: &mut Vec<(String, Tree)>) -> StoreResult<ObjectId> {
        let mut entries: Vec<TreeEntry> = self
            .files
            .iter()
            .map(|(name, (mode, id))| TreeEntry::new(*mode, name.clone(), *id))
            .collect();
        for (name, child) in &self.dirs {
            if child.is_empty() {
                continue;
            }
            let child_path = if path.is_empty() {
                name.clone()
            } else {
                format!("{path}/{name}")
            };
            let id = child.build(&child_path, out)?;
            entries.push(TreeEntry::new(EntryMode::Directory, name.clone(), id));
        }
        let tree = Tree::new(entries);
        let id = tree.to_stored_object()?.compute_id();
        out.push((path.to_string(), tree));
        Ok(id)
    }
}

/// Builds a nested tree from flat `path -> (mode, id)` entries.
///
/// Subtrees are written before the trees that contain them. Directories
/// left without any file are omitted; only the root may be empty.
///
/// ```ignore
/// let mut builder = TreeBuilder::new();
/// builder.insert("src/lib.rs", EntryMode::Regular, blob)?;
/// let root = builder.write(&store)?;
/// ```
#[derive(Default, Debug)]
pub struct TreeBuilder {
    root: DirNode,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a leaf. A later insert of the same path replaces the earlier one.
    pub fn insert(&mut self, path: &str, mode: EntryMode, id: ObjectId) -> StoreResult<()> {
        if mode == EntryMode::Directory {
            return Err(StoreError::InvalidPath(format!(
                "{path}: directories are implied by their contents"
            )));
        }
        let components: Vec<&str> = path.split('/').collect();
        for component in &components {
            validate_name(component).map_err(|e| StoreError::InvalidPath(format!("{path}: {e}")))?;
        }
        let (leaf, parents) = components
            .split_last()
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;

        let mut node = &mut self.root;
        for component in parents {
            if node.files.contains_key(*component) {
                return Err(StoreError::PathConflict(format!(
                    "{path}: {component} is a file"
                )));
            }
            node = node.dirs.entry(component.to_string()).or_default();
        }
        if node.dirs.contains_key(*leaf) {
            return Err(StoreError::PathConflict(format!("{path} is a directory")));
        }
        node.files.insert(leaf.to_string(), (mode, id));
        Ok(())
    }

    /// Build from an iterator of `(path, mode, id)`.
    pub fn from_entries<'a, I>(entries: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = (&'a str, EntryMode, ObjectId)>,
    {
        let mut builder = Self::new();
        for (path, mode, id) in entries {
            builder.insert(path, mode, id)?;
        }
        Ok(builder)
    }

    /// Compute every tree without storing anything.
    ///
    /// Returns `(directory path, tree)` pairs, children before parents; the
    /// root (path `""`) is always last.
    pub fn build(&self) -> StoreResult<Vec<(String, Tree)>> {
        let mut out = Vec::new();
        self.root.build("", &mut out)?;
        Ok(out)
    }

    /// Write all subtrees and the root, returning the root tree id.
    pub fn write<S: ObjectStore + ?Sized>(&self, store: &S) -> StoreResult<ObjectId> {
        let mut root = None;
        for (_, tree) in self.build()? {
            root = Some(store.write_tree(&tree)?);
        }
        root.ok_or_else(|| StoreError::InvalidPath("no root tree".into()))
    }
}

/// Flatten a stored tree into `(path, mode, id)` leaves in walk order.
pub fn flatten_tree<S: ObjectStore + ?Sized>(
    store: &S,
    tree: &ObjectId,
) -> StoreResult<Vec<(String, EntryMode, ObjectId)>> {
    let mut out = Vec::new();
    flatten_into(store, tree, "", &mut out)?;
    Ok(out)
}

fn flatten_into<S: ObjectStore + ?Sized>(
    store: &S,
    tree: &ObjectId,
    prefix: &str,
    out: &mut Vec<(String, EntryMode, ObjectId)>,
) -> StoreResult<()> {
    for entry in store.read_tree(tree)?.entries {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{prefix}/{}", entry.name)
        };
        if entry.is_dir() {
            flatten_into(store, &entry.object_id, &path, out)?;
        } else {
            out.push((path, entry.mode, entry.object_id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryObjectStore;

    #[test]
    fn nested_paths_build_subtrees() {
        let store = InMemoryObjectStore::new();
        let a = store.write_blob(b"a").unwrap();
        let b = store.write_blob(b"b").unwrap();

        let builder = TreeBuilder::from_entries([
            ("src/main.rs", EntryMode::Regular, a),
            ("src/util/mod.rs", EntryMode::Regular, b),
            ("README", EntryMode::Regular, a),
        ])
        .unwrap();
        let root = builder.write(&store).unwrap();

        let tree = store.read_tree(&root).unwrap();
        assert_eq!(tree.len(), 2);
        let src = tree.get("src").unwrap();
        assert!(src.is_dir());
        let src_tree = store.read_tree(&src.object_id).unwrap();
        assert!(src_tree.get("util").unwrap().is_dir());

        let flat = flatten_tree(&store, &root).unwrap();
        let paths: Vec<&str> = flat.iter().map(|(p, _, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["README", "src/main.rs", "src/util/mod.rs"]);
    }

    #[test]
    fn build_lists_children_first() {
        let blob = ObjectId::from_bytes(b"x");
        let builder = TreeBuilder::from_entries([
            ("a/b/c", EntryMode::Regular, blob),
            ("a/d", EntryMode::Regular, blob),
        ])
        .unwrap();
        let paths: Vec<String> = builder.build().unwrap().into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["a/b", "a", ""]);
    }

    #[test]
    fn empty_builder_writes_empty_root() {
        let store = InMemoryObjectStore::new();
        let root = TreeBuilder::new().write(&store).unwrap();
        assert!(store.read_tree(&root).unwrap().is_empty());
    }

    #[test]
    fn same_content_same_root() {
        let store = InMemoryObjectStore::new();
        let blob = store.write_blob(b"x").unwrap();
        let one = TreeBuilder::from_entries([
            ("b/c", EntryMode::Regular, blob),
            ("a", EntryMode::Executable, blob),
        ])
        .unwrap();
        let two = TreeBuilder::from_entries([
            ("a", EntryMode::Executable, blob),
            ("b/c", EntryMode::Regular, blob),
        ])
        .unwrap();
        assert_eq!(one.write(&store).unwrap(), two.write(&store).unwrap());
    }

    #[test]
    fn file_directory_conflicts() {
        let blob = ObjectId::from_bytes(b"x");
        let mut builder = TreeBuilder::new();
        builder.insert("a", EntryMode::Regular, blob).unwrap();
        assert!(matches!(
            builder.insert("a/b", EntryMode::Regular, blob),
            Err(StoreError::PathConflict(_))
        ));

        let mut builder = TreeBuilder::new();
        builder.insert("a/b", EntryMode::Regular, blob).unwrap();
        assert!(matches!(
            builder.insert("a", EntryMode::Regular, blob),
            Err(StoreError::PathConflict(_))
        ));
    }

    #[test]
    fn invalid_paths() {
        let blob = ObjectId::from_bytes(b"x");
        let mut builder = TreeBuilder::new();
        for path in ["", "/a", "a//b", "a/../b", "a/"] {
            assert!(
                matches!(
                    builder.insert(path, EntryMode::Regular, blob),
                    Err(StoreError::InvalidPath(_))
                ),
                "accepted {path:?}"
            );
        }
        assert!(builder.insert("d", EntryMode::Directory, blob).is_err());
    }
}
