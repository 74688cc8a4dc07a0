//! Checkpoint commits.
//!
//! A checkpoint captures uncommitted work without touching the branch. It
//! is recorded as a small group of commits hanging off the branch tip:
//!
//! ```text
//!        W          working-tree commit, what the checkpoint ref points at
//!      / | \
//!     H  I  U       H = branch tip, I = staged state, U = untracked files
//!        |
//!        H
//! ```
//!
//! `I` has the branch tip as its only parent and the index tree. `U` is
//! optional, has no parents, and holds only the untracked files. `W` holds
//! the tracked files as they are in the working tree, and its parents are
//! `[H, I]` or `[H, I, U]`. All commits share one identity as both author
//! and committer. The checkpoint reference moves to `W` by
//! compare-and-swap, and its reflog records `W`'s full message, so the
//! reflog doubles as the list of checkpoints.

use grove_diff::DiffOptions;
use grove_index::{Index, WorkingTree};
use grove_refs::short_name;
use grove_store::{Commit, ObjectStoreExt, TreeBuilder};
use grove_types::{ObjectId, PersonIdent};
use tracing::{debug, info};

use crate::error::{SdkError, SdkResult};
use crate::repository::Repository;

/// Records the staged and working state of the current branch under the
/// checkpoint reference.
pub struct CheckpointCommand<'r> {
    repo: &'r Repository,
    person: Option<PersonIdent>,
    reference: String,
    working_message: Option<String>,
    include_untracked: bool,
}

impl<'r> CheckpointCommand<'r> {
    pub fn new(repo: &'r Repository) -> Self {
        Self {
            repo,
            person: None,
            reference: repo.config().refs.checkpoint_ref.clone(),
            working_message: None,
            include_untracked: false,
        }
    }

    /// Author and committer for every commit written. Defaults to the
    /// configured identity.
    pub fn person(mut self, person: PersonIdent) -> Self {
        self.person = Some(person);
        self
    }

    /// Record under this reference instead of the configured one.
    pub fn reference(mut self, name: impl Into<String>) -> Self {
        self.reference = name.into();
        self
    }

    /// Message of the working-tree commit, replacing `WIP on <branch>: ...`.
    pub fn working_message(mut self, message: impl Into<String>) -> Self {
        self.working_message = Some(message.into());
        self
    }

    /// Also capture files the index does not track.
    pub fn include_untracked(mut self, include: bool) -> Self {
        self.include_untracked = include;
        self
    }

    /// Write the checkpoint.
    ///
    /// Returns `Ok(None)` without writing anything when neither the index
    /// nor the working tree differ from the branch tip (and, with
    /// [`include_untracked`](Self::include_untracked), there are no
    /// untracked files). `index` must be backed by the repository's store.
    pub fn call(&self, index: &Index, worktree: &WorkingTree) -> SdkResult<Option<ObjectId>> {
        let repo = self.repo;
        let store = repo.store().as_ref();

        let conflicts = index.conflict_paths();
        if !conflicts.is_empty() {
            return Err(SdkError::UnmergedState(conflicts));
        }

        let branch = short_name(repo.current_branch()).to_string();
        let head = repo
            .head_commit()?
            .ok_or_else(|| SdkError::NoHead(branch.clone()))?;
        let head_commit = store.read_commit(&head)?;

        let status = repo.status(index, worktree, &DiffOptions::default())?;
        let untracked = self.include_untracked && !status.untracked.is_empty();
        if status.staged.is_empty() && status.unstaged.is_empty() && !untracked {
            debug!(branch = %branch, "nothing to checkpoint");
            return Ok(None);
        }

        let who = match &self.person {
            Some(person) => person.clone(),
            None => repo.default_identity()?,
        };
        let summary = format!(
            "{branch}: {} {}",
            head.short_hex(),
            head_commit.subject()
        );
        let make_commit = |tree: ObjectId, parents: Vec<ObjectId>, message: String| Commit {
            tree,
            parents,
            author: who.clone(),
            committer: who.clone(),
            message,
        };

        let mut staged = TreeBuilder::new();
        for entry in index.flat_entries() {
            staged.insert(&entry.path, entry.mode, entry.id)?;
        }
        let index_tree = staged.write(store)?;
        let index_commit = store.write_commit(&make_commit(
            index_tree,
            vec![head],
            format!("index on {summary}"),
        ))?;

        let mut parents = vec![head, index_commit];
        if untracked {
            if let Some(tree) = worktree.write_untracked_tree(store, index)? {
                let commit = store.write_commit(&make_commit(
                    tree,
                    Vec::new(),
                    format!("untracked files on {summary}"),
                ))?;
                parents.push(commit);
            }
        }

        let working_tree = worktree.write_tracked_tree(store, index)?;
        let message = self
            .working_message
            .clone()
            .unwrap_or_else(|| format!("WIP on {summary}"));
        let working_commit = store.write_commit(&make_commit(working_tree, parents, message.clone()))?;

        let expected = repo.refs().current_target(&self.reference)?;
        repo.refs()
            .compare_and_update(&self.reference, &expected, &working_commit, &who, &message)?;
        info!(
            reference = %self.reference,
            commit = %working_commit.short_hex(),
            untracked,
            "checkpoint recorded"
        );
        Ok(Some(working_commit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;
    use grove_diff::{ChangeType, DiffEntry};
    use grove_refs::InMemoryRefStore;
    use grove_store::{EntryMode, InMemoryObjectStore, ObjectStore};
    use std::sync::Arc;

    struct Fixture {
        objects: Arc<InMemoryObjectStore>,
        repo: Repository,
        index: Index,
        head: ObjectId,
    }

    /// A repository whose `main` has one commit with `file.txt` and
    /// `dir/other.txt`, and an index matching it.
    fn fixture() -> Fixture {
        let objects = Arc::new(InMemoryObjectStore::new());
        let store: Arc<dyn ObjectStore> = objects.clone();
        let mut repo = Repository::from_parts(
            store,
            Arc::new(InMemoryRefStore::new()),
            RepositoryConfig::default(),
        )
        .unwrap();
        repo.set_identity("Ada", "ada@example.com");

        let mut index = repo.new_index();
        index.stage_file("file.txt", b"content", EntryMode::Regular).unwrap();
        index.stage_file("dir/other.txt", b"other", EntryMode::Regular).unwrap();
        let head = repo.commit_index(&mut index, "initial commit").unwrap();
        Fixture {
            objects,
            repo,
            index,
            head,
        }
    }

    fn diff(repo: &Repository, old: &ObjectId, new: &ObjectId) -> Vec<DiffEntry> {
        repo.diff(Some(old), Some(new), &DiffOptions::default()).unwrap()
    }

    /// The checkpoint commit has the expected shape; returns the index commit.
    fn validate_checkpoint(fx: &Fixture, id: &ObjectId) -> Commit {
        let store = fx.repo.store();
        let working = store.read_commit(id).unwrap();
        assert_eq!(working.parents.len(), 2);
        assert_eq!(working.parents[0], fx.head);
        assert_eq!(working.author, working.committer);

        let index_commit = store.read_commit(&working.parents[1]).unwrap();
        assert_eq!(index_commit.parents, vec![fx.head]);
        assert_eq!(index_commit.author, working.author);
        assert_eq!(index_commit.committer, working.committer);
        index_commit
    }

    // ---- no-op ----

    #[test]
    fn no_changes_writes_nothing() {
        let fx = fixture();
        let before = fx.objects.len();
        let wt = WorkingTree::from_index(&fx.index);
        assert_eq!(fx.repo.checkpoint().call(&fx.index, &wt).unwrap(), None);
        assert_eq!(fx.objects.len(), before);
        assert!(fx.repo.refs().read_ref("refs/stash").unwrap().is_none());
        assert!(fx.repo.checkpoints().unwrap().is_empty());
    }

    #[test]
    fn untracked_only_is_a_no_op_unless_requested() {
        let fx = fixture();
        let mut wt = WorkingTree::from_index(&fx.index);
        wt.write_file("scratch.txt", "tmp", EntryMode::Regular);
        assert_eq!(fx.repo.checkpoint().call(&fx.index, &wt).unwrap(), None);
        assert!(fx
            .repo
            .checkpoint()
            .include_untracked(true)
            .call(&fx.index, &wt)
            .unwrap()
            .is_some());
    }

    // ---- captured state ----

    #[test]
    fn working_directory_delete() {
        let fx = fixture();
        let mut wt = WorkingTree::from_index(&fx.index);
        wt.remove("file.txt");

        let id = fx.repo.checkpoint().call(&fx.index, &wt).unwrap().unwrap();
        let index_commit = validate_checkpoint(&fx, &id);
        let head_tree = fx.repo.peel_to_tree(&fx.head).unwrap();
        assert_eq!(index_commit.tree, head_tree);

        let changes = diff(&fx.repo, &fx.head, &id);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Delete);
        assert_eq!(changes[0].path(), "file.txt");
    }

    #[test]
    fn staged_add_then_edit() {
        let mut fx = fixture();
        fx.index.stage_file("added.txt", b"v1", EntryMode::Regular).unwrap();
        let mut wt = WorkingTree::from_index(&fx.index);
        wt.write_file("added.txt", "v2", EntryMode::Regular);

        let id = fx.repo.checkpoint().call(&fx.index, &wt).unwrap().unwrap();
        let working = fx.repo.store().read_commit(&id).unwrap();
        let index_commit = validate_checkpoint(&fx, &id);

        let staged = diff(&fx.repo, &fx.head, &working.parents[1]);
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].change_type, ChangeType::Add);

        let edits = diff(&fx.repo, &index_commit.tree, &working.tree);
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].change_type, ChangeType::Modify);
        assert_eq!(edits[0].path(), "added.txt");
        assert_eq!(
            fx.repo.store().read_blob(&edits[0].old_id).unwrap(),
            b"v1"
        );
        assert_eq!(
            fx.repo.store().read_blob(&edits[0].new_id).unwrap(),
            b"v2"
        );
    }

    #[test]
    fn messages_name_branch_and_head() {
        let fx = fixture();
        let mut wt = WorkingTree::from_index(&fx.index);
        wt.write_file("file.txt", "edited", EntryMode::Regular);

        let id = fx.repo.checkpoint().call(&fx.index, &wt).unwrap().unwrap();
        let working = fx.repo.store().read_commit(&id).unwrap();
        let index_commit = fx.repo.store().read_commit(&working.parents[1]).unwrap();
        let summary = format!("main: {} initial commit", fx.head.short_hex());
        assert_eq!(working.message, format!("WIP on {summary}"));
        assert_eq!(index_commit.message, format!("index on {summary}"));
    }

    #[test]
    fn untracked_files_get_their_own_commit() {
        let fx = fixture();
        let mut wt = WorkingTree::from_index(&fx.index);
        wt.write_file("file.txt", "edited", EntryMode::Regular);
        wt.write_file("notes/todo.txt", "later", EntryMode::Regular);

        let id = fx
            .repo
            .checkpoint()
            .include_untracked(true)
            .call(&fx.index, &wt)
            .unwrap()
            .unwrap();
        let working = fx.repo.store().read_commit(&id).unwrap();
        assert_eq!(working.parents.len(), 3);

        let untracked = fx.repo.store().read_commit(&working.parents[2]).unwrap();
        assert!(untracked.parents.is_empty());
        assert!(untracked.message.starts_with("untracked files on main: "));
        let leaves = grove_store::flatten_tree(fx.repo.store().as_ref(), &untracked.tree).unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].0, "notes/todo.txt");

        let tracked = grove_store::flatten_tree(fx.repo.store().as_ref(), &working.tree).unwrap();
        assert!(tracked.iter().all(|(p, _, _)| p != "notes/todo.txt"));
    }

    // ---- reference and reflog ----

    #[test]
    fn reflog_records_full_message() {
        let fx = fixture();
        let mut wt = WorkingTree::from_index(&fx.index);
        wt.write_file("file.txt", "edited", EntryMode::Regular);

        let first = fx.repo.checkpoint().call(&fx.index, &wt).unwrap().unwrap();
        let commit = fx.repo.store().read_commit(&first).unwrap();
        let log = fx.repo.refs().read_reflog("refs/stash").unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].old_id.is_null());
        assert_eq!(log[0].new_id, first);
        assert_eq!(log[0].who, commit.committer);
        assert_eq!(log[0].message, commit.message);

        wt.write_file("file.txt", "edited again", EntryMode::Regular);
        let second = fx.repo.checkpoint().call(&fx.index, &wt).unwrap().unwrap();
        let listed = fx.repo.checkpoints().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!((listed[0].old_id, listed[0].new_id), (first, second));
        assert_eq!(fx.repo.resolve("stash").unwrap(), second);
    }

    #[test]
    fn custom_reference_message_and_person() {
        let fx = fixture();
        let mut wt = WorkingTree::from_index(&fx.index);
        wt.remove("dir/other.txt");
        let who = PersonIdent::new("Bob", "bob@example.com", 1_700_000_000, -300);

        let id = fx
            .repo
            .checkpoint()
            .reference("refs/checkpoints/bob")
            .working_message("before refactor")
            .person(who.clone())
            .call(&fx.index, &wt)
            .unwrap()
            .unwrap();

        let working = fx.repo.store().read_commit(&id).unwrap();
        assert_eq!(working.message, "before refactor");
        assert_eq!(working.author, who);
        let index_commit = validate_checkpoint(&fx, &id);
        assert_eq!(index_commit.author, who);

        let log = fx.repo.refs().read_reflog("refs/checkpoints/bob").unwrap();
        assert_eq!(log[0].message, "before refactor");
        assert!(fx.repo.refs().read_ref("refs/stash").unwrap().is_none());
        assert_eq!(fx.repo.head_commit().unwrap(), Some(fx.head));
    }

    // ---- refusals ----

    #[test]
    fn unmerged_paths_write_nothing() {
        let mut fx = fixture();
        let ours = fx.index.get("file.txt").unwrap().object_id;
        fx.index
            .record_conflict(
                "file.txt",
                Some((EntryMode::Regular, ours)),
                Some((EntryMode::Regular, ours)),
                Some((EntryMode::Regular, ObjectId::from_bytes(b"theirs"))),
            )
            .unwrap();
        let mut wt = WorkingTree::from_index(&fx.index);
        wt.write_file("file.txt", "resolved by hand", EntryMode::Regular);

        let before = fx.objects.len();
        let err = fx.repo.checkpoint().call(&fx.index, &wt).unwrap_err();
        match err {
            SdkError::UnmergedState(paths) => assert_eq!(paths, vec!["file.txt"]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fx.objects.len(), before);
        assert!(fx.repo.refs().read_ref("refs/stash").unwrap().is_none());
    }

    #[test]
    fn unborn_branch_has_nothing_to_checkpoint_against() {
        let mut repo = Repository::in_memory();
        repo.set_identity("Ada", "ada@example.com");
        let mut index = repo.new_index();
        index.stage_file("a", b"a", EntryMode::Regular).unwrap();
        let wt = WorkingTree::from_index(&index);
        assert!(matches!(
            repo.checkpoint().call(&index, &wt),
            Err(SdkError::NoHead(_))
        ));
    }

    #[test]
    fn checkpoint_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let mut repo = Repository::init(dir.path()).unwrap();
            repo.set_identity("Ada", "ada@example.com");
            let mut index = repo.new_index();
            index.stage_file("a.txt", b"a", EntryMode::Regular).unwrap();
            repo.commit_index(&mut index, "initial").unwrap();
            repo.save_index(&index).unwrap();

            let mut wt = WorkingTree::from_index(&index);
            wt.write_file("a.txt", "changed", EntryMode::Regular);
            repo.checkpoint().call(&index, &wt).unwrap().unwrap()
        };

        let repo = Repository::open(dir.path()).unwrap();
        assert_eq!(repo.resolve("refs/stash").unwrap(), id);
        let node = repo.show("stash").unwrap();
        assert!(node.message.starts_with("WIP on main: "));
        let entries = repo.checkpoints().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, node.message);

        let index = repo.load_index().unwrap();
        let changes = repo
            .diff(Some(&node.parents[1]), Some(&id), &DiffOptions::default())
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path(), "a.txt");
        assert!(index.contains("a.txt"));
    }
}
