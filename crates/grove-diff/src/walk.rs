//! Lockstep walk over several tree sources.

use std::cmp::Ordering;
use std::collections::VecDeque;

use grove_store::{tree_order, EntryMode, ObjectStore, TreeEntry};
use grove_types::ObjectId;
use tracing::debug;

use crate::error::DiffResult;
use crate::source::TreeSource;

/// Mode and id of one input's entry in a [`WalkRow`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WalkEntry {
    pub mode: EntryMode,
    pub id: ObjectId,
}

impl From<&TreeEntry> for WalkEntry {
    fn from(e: &TreeEntry) -> Self {
        Self {
            mode: e.mode,
            id: e.object_id,
        }
    }
}

/// One step of a walk: a path and what each input holds there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalkRow {
    /// Full slash-separated path from the walk root.
    pub path: String,
    /// One slot per source, `None` where the source has no such entry.
    pub entries: Vec<Option<WalkEntry>>,
}

impl WalkRow {
    /// True when the row names a directory (every present slot agrees).
    pub fn is_dir(&self) -> bool {
        self.entries
            .iter()
            .flatten()
            .any(|e| e.mode == EntryMode::Directory)
    }

    pub fn entry(&self, index: usize) -> Option<&WalkEntry> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    /// True when every input has the same mode and id here.
    pub fn all_same(&self) -> bool {
        let first = self.entries.first().copied().flatten();
        first.is_some() && self.entries.iter().all(|e| *e == first)
    }
}

/// Which rows a walk yields.
///
/// Filters apply before emission and before recursion, so a rejected
/// directory is never opened.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TreeFilter {
    /// Every row.
    #[default]
    All,
    /// Rows where the inputs differ. Subtrees whose ids agree in every input
    /// are skipped without being read. A walk over one input yields all rows.
    AnyDiff,
    /// Rows at or below any of the given paths.
    Paths(Vec<String>),
    /// Rows every inner filter accepts.
    And(Vec<TreeFilter>),
}

impl TreeFilter {
    fn includes(&self, row: &WalkRow, is_dir: bool) -> bool {
        match self {
            Self::All => true,
            Self::AnyDiff => row.entries.len() < 2 || !row.all_same(),
            Self::Paths(paths) => paths.iter().any(|p| {
                let p = p.trim_end_matches('/');
                row.path == p
                    || is_below(&row.path, p)
                    || (is_dir && is_below(p, &row.path))
            }),
            Self::And(filters) => filters.iter().all(|f| f.includes(row, is_dir)),
        }
    }

    /// This filter narrowed to rows where the inputs differ.
    pub fn and_any_diff(self) -> Self {
        match self {
            Self::All | Self::AnyDiff => Self::AnyDiff,
            Self::And(mut filters) => {
                if !filters.contains(&Self::AnyDiff) {
                    filters.push(Self::AnyDiff);
                }
                Self::And(filters)
            }
            other => Self::And(vec![other, Self::AnyDiff]),
        }
    }
}

fn is_below(path: &str, dir: &str) -> bool {
    path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}

struct Frame {
    prefix: String,
    levels: Vec<VecDeque<TreeEntry>>,
}

/// Pull-based lockstep iterator over N [`TreeSource`]s.
///
/// At each step every source whose next entry is smallest under
/// [`tree_order`] advances, and their entries are grouped into one
/// [`WalkRow`]. In recursive mode directories are expanded in place and
/// never yielded; otherwise directory rows are yielded and the caller may
/// descend with [`TreeWalk::enter_subtree`].
pub struct TreeWalk<'a> {
    store: &'a dyn ObjectStore,
    sources: Vec<&'a dyn TreeSource>,
    recursive: bool,
    filter: TreeFilter,
    stack: Vec<Frame>,
    started: bool,
    last_dir: Option<(String, Vec<Option<TreeEntry>>)>,
}

impl<'a> TreeWalk<'a> {
    pub fn new(store: &'a dyn ObjectStore, sources: Vec<&'a dyn TreeSource>) -> Self {
        Self {
            store,
            sources,
            recursive: false,
            filter: TreeFilter::All,
            stack: Vec::new(),
            started: false,
            last_dir: None,
        }
    }

    /// Expand directories instead of yielding them.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn filter(mut self, filter: TreeFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Keep the current filter but skip rows where all inputs agree.
    pub fn only_differences(mut self) -> Self {
        self.filter = std::mem::take(&mut self.filter).and_any_diff();
        self
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Descend into the directory row most recently yielded.
    ///
    /// Returns `Ok(false)` if the last row was not a directory.
    pub fn enter_subtree(&mut self) -> DiffResult<bool> {
        match self.last_dir.take() {
            Some((path, dirs)) => {
                self.push_children(path, &dirs)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn start(&mut self) -> DiffResult<()> {
        let mut levels = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            levels.push(VecDeque::from(source.root(self.store)?));
        }
        self.stack.push(Frame {
            prefix: String::new(),
            levels,
        });
        Ok(())
    }

    fn push_children(&mut self, path: String, dirs: &[Option<TreeEntry>]) -> DiffResult<()> {
        let mut levels = Vec::with_capacity(self.sources.len());
        for (source, dir) in self.sources.iter().zip(dirs) {
            let children = match dir {
                Some(d) => source.children(self.store, &path, d)?,
                None => Vec::new(),
            };
            levels.push(VecDeque::from(children));
        }
        debug!(path = %path, "entering subtree");
        self.stack.push(Frame {
            prefix: path,
            levels,
        });
        Ok(())
    }

    fn step(&mut self) -> DiffResult<Option<WalkRow>> {
        if !self.started {
            self.started = true;
            self.start()?;
        }
        self.last_dir = None;

        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };

            let min = frame
                .levels
                .iter()
                .filter_map(|l| l.front())
                .min_by(|a, b| entry_order(a, b))
                .cloned();
            let Some(min) = min else {
                self.stack.pop();
                continue;
            };

            let current: Vec<Option<TreeEntry>> = frame
                .levels
                .iter_mut()
                .map(|level| match level.front() {
                    Some(e) if entry_order(e, &min) == Ordering::Equal => level.pop_front(),
                    _ => None,
                })
                .collect();

            let path = if frame.prefix.is_empty() {
                min.name.clone()
            } else {
                format!("{}/{}", frame.prefix, min.name)
            };
            let row = WalkRow {
                path,
                entries: current.iter().map(|e| e.as_ref().map(WalkEntry::from)).collect(),
            };
            let is_dir = min.is_dir();

            if !self.filter.includes(&row, is_dir) {
                continue;
            }
            if is_dir {
                if self.recursive {
                    self.push_children(row.path, &current)?;
                    continue;
                }
                self.last_dir = Some((row.path.clone(), current));
            }
            return Ok(Some(row));
        }
    }
}

fn entry_order(a: &TreeEntry, b: &TreeEntry) -> Ordering {
    tree_order(a.name.as_bytes(), a.is_dir(), b.name.as_bytes(), b.is_dir())
}

impl Iterator for TreeWalk<'_> {
    type Item = DiffResult<WalkRow>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(row) => row.map(Ok),
            Err(e) => {
                // A failed walk is finished.
                self.stack.clear();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{EmptyTreeSource, FlatEntry, FlatTreeSource, StoredTreeSource};
    use grove_store::{InMemoryObjectStore, ObjectStoreExt, TreeBuilder};

    fn write(store: &InMemoryObjectStore, files: &[(&str, &[u8])]) -> ObjectId {
        let mut builder = TreeBuilder::new();
        for (path, content) in files {
            let blob = store.write_blob(content).unwrap();
            builder.insert(path, EntryMode::Regular, blob).unwrap();
        }
        builder.write(store).unwrap()
    }

    fn paths(rows: &[WalkRow]) -> Vec<&str> {
        rows.iter().map(|r| r.path.as_str()).collect()
    }

    // -----------------------------------------------------------------------
    // Ordering and grouping
    // -----------------------------------------------------------------------

    #[test]
    fn recursive_walk_single_source() {
        let store = InMemoryObjectStore::new();
        let root = write(&store, &[("a/x", b"1"), ("a.txt", b"2"), ("b", b"3")]);
        let src = StoredTreeSource(root);
        let rows: Vec<WalkRow> = TreeWalk::new(&store, vec![&src])
            .recursive(true)
            .collect::<DiffResult<_>>()
            .unwrap();
        assert_eq!(paths(&rows), vec!["a.txt", "a/x", "b"]);
    }

    #[test]
    fn non_recursive_yields_directories() {
        let store = InMemoryObjectStore::new();
        let root = write(&store, &[("d/inner", b"1"), ("f", b"2")]);
        let src = StoredTreeSource(root);
        let mut walk = TreeWalk::new(&store, vec![&src]);

        let first = walk.next().unwrap().unwrap();
        assert_eq!(first.path, "d");
        assert!(first.is_dir());
        assert!(walk.enter_subtree().unwrap());
        assert_eq!(walk.next().unwrap().unwrap().path, "d/inner");
        assert_eq!(walk.next().unwrap().unwrap().path, "f");
        assert!(!walk.enter_subtree().unwrap());
        assert!(walk.next().is_none());
    }

    #[test]
    fn rows_group_matching_entries() {
        let store = InMemoryObjectStore::new();
        let old = write(&store, &[("same", b"s"), ("gone", b"g")]);
        let new = write(&store, &[("same", b"s"), ("new", b"n")]);
        let (a, b) = (StoredTreeSource(old), StoredTreeSource(new));
        let rows: Vec<WalkRow> = TreeWalk::new(&store, vec![&a, &b])
            .collect::<DiffResult<_>>()
            .unwrap();
        assert_eq!(paths(&rows), vec!["gone", "new", "same"]);
        assert!(rows[0].entries[0].is_some() && rows[0].entries[1].is_none());
        assert!(rows[1].entries[0].is_none() && rows[1].entries[1].is_some());
        assert!(rows[2].all_same());
    }

    #[test]
    fn file_and_directory_of_same_name_are_separate_rows() {
        let store = InMemoryObjectStore::new();
        let old = write(&store, &[("a", b"file")]);
        let new = write(&store, &[("a/inner", b"file")]);
        let (x, y) = (StoredTreeSource(old), StoredTreeSource(new));
        let rows: Vec<WalkRow> = TreeWalk::new(&store, vec![&x, &y])
            .recursive(true)
            .collect::<DiffResult<_>>()
            .unwrap();
        assert_eq!(paths(&rows), vec!["a", "a/inner"]);
        assert!(rows[0].entries[1].is_none());
        assert!(rows[1].entries[0].is_none());
    }

    // -----------------------------------------------------------------------
    // Filters
    // -----------------------------------------------------------------------

    #[test]
    fn any_diff_prunes_identical_subtrees_without_reading() {
        let store = InMemoryObjectStore::new();
        let shared = write(&store, &[("deep/file", b"x")]);
        let shared_dir = store.read_tree(&shared).unwrap().entries[0].clone();

        // Both sides hold a directory whose tree is absent from the store.
        // Pruning must skip it before any read happens.
        let ghost = TreeEntry::new(EntryMode::Directory, "ghost", ObjectId::from_bytes(b"g"));
        let top_old = store.write_blob(b"old").unwrap();
        let top_new = store.write_blob(b"new").unwrap();
        let mk = |top| {
            grove_store::Tree::new(vec![
                shared_dir.clone(),
                ghost.clone(),
                TreeEntry::new(EntryMode::Regular, "top", top),
            ])
        };
        let old = store.write(&mk(top_old).to_stored_object().unwrap()).unwrap();
        let new = store.write(&mk(top_new).to_stored_object().unwrap()).unwrap();

        let (a, b) = (StoredTreeSource(old), StoredTreeSource(new));
        let rows: Vec<WalkRow> = TreeWalk::new(&store, vec![&a, &b])
            .recursive(true)
            .filter(TreeFilter::AnyDiff)
            .collect::<DiffResult<_>>()
            .unwrap();
        assert_eq!(paths(&rows), vec!["top"]);
    }

    #[test]
    fn path_filter_limits_rows() {
        let store = InMemoryObjectStore::new();
        let root = write(&store, &[("src/a", b"1"), ("src/b", b"2"), ("docs/c", b"3")]);
        let src = StoredTreeSource(root);
        let rows: Vec<WalkRow> = TreeWalk::new(&store, vec![&src])
            .recursive(true)
            .filter(TreeFilter::Paths(vec!["src".into(), "docs/c".into()]))
            .collect::<DiffResult<_>>()
            .unwrap();
        assert_eq!(paths(&rows), vec!["docs/c", "src/a", "src/b"]);
    }

    #[test]
    fn combined_filters_must_all_accept() {
        let store = InMemoryObjectStore::new();
        let old = write(&store, &[("src/a", b"1"), ("src/b", b"2"), ("x", b"3")]);
        let new = write(&store, &[("src/a", b"1"), ("src/b", b"9"), ("x", b"9")]);
        let (o, n) = (StoredTreeSource(old), StoredTreeSource(new));
        let rows: Vec<WalkRow> = TreeWalk::new(&store, vec![&o, &n])
            .recursive(true)
            .filter(TreeFilter::Paths(vec!["src".into()]))
            .only_differences()
            .collect::<DiffResult<_>>()
            .unwrap();
        assert_eq!(paths(&rows), vec!["src/b"]);
    }

    #[test]
    fn path_filter_does_not_match_prefix_siblings() {
        let store = InMemoryObjectStore::new();
        let root = write(&store, &[("src/a", b"1"), ("src2/b", b"2")]);
        let src = StoredTreeSource(root);
        let rows: Vec<WalkRow> = TreeWalk::new(&store, vec![&src])
            .recursive(true)
            .filter(TreeFilter::Paths(vec!["src".into()]))
            .collect::<DiffResult<_>>()
            .unwrap();
        assert_eq!(paths(&rows), vec!["src/a"]);
    }

    // -----------------------------------------------------------------------
    // Mixed sources and errors
    // -----------------------------------------------------------------------

    #[test]
    fn flat_and_stored_sources_walk_together() {
        let store = InMemoryObjectStore::new();
        let one = store.write_blob(b"1").unwrap();
        let two = store.write_blob(b"2").unwrap();
        let root = write(&store, &[("dir/f", b"1"), ("g", b"1")]);
        let flat = FlatTreeSource::new(vec![
            FlatEntry::new("dir/f", EntryMode::Regular, one),
            FlatEntry::new("g", EntryMode::Regular, two),
        ])
        .unwrap();
        let stored = StoredTreeSource(root);
        let rows: Vec<WalkRow> = TreeWalk::new(&store, vec![&stored, &flat])
            .recursive(true)
            .filter(TreeFilter::AnyDiff)
            .collect::<DiffResult<_>>()
            .unwrap();
        assert_eq!(paths(&rows), vec!["g"]);
    }

    #[test]
    fn empty_against_empty_is_empty() {
        let store = InMemoryObjectStore::new();
        let rows: Vec<_> = TreeWalk::new(&store, vec![&EmptyTreeSource, &EmptyTreeSource])
            .recursive(true)
            .collect();
        assert!(rows.is_empty());
    }

    #[test]
    fn missing_subtree_ends_walk_with_error() {
        let store = InMemoryObjectStore::new();
        let tree = grove_store::Tree::new(vec![TreeEntry::new(
            EntryMode::Directory,
            "lost",
            ObjectId::from_bytes(b"lost"),
        )]);
        let root = store.write(&tree.to_stored_object().unwrap()).unwrap();
        let src = StoredTreeSource(root);
        let mut walk = TreeWalk::new(&store, vec![&src]).recursive(true);
        assert!(matches!(
            walk.next(),
            Some(Err(crate::DiffError::ObjectNotFound(_)))
        ));
        assert!(walk.next().is_none());
    }
}
