//! The [`Repository`] handle.
//!
//! On disk a repository is one directory:
//!
//! ```text
//! grove.toml      configuration
//! objects/        loose objects
//! tmp/            staging area for object writes
//! refs/           one file per reference
//! logs/           one reflog per reference
//! index           the persisted staging area
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use grove_dag::{merge_base, CommitNode, RevSort, RevWalk};
use grove_diff::{diff_tree_ids, DiffEntry, DiffOptions};
use grove_index::{status, Index, WorkdirStatus, WorkingTree};
use grove_refs::{
    branch_ref, short_name, FileRefStore, InMemoryRefStore, RefStore, ReflogEntry,
};
use grove_store::{
    InMemoryObjectStore, LooseObjectStore, Object, ObjectStore, ObjectStoreExt,
};
use grove_types::{ObjectId, PersonIdent};
use tracing::info;

use crate::checkpoint::CheckpointCommand;
use crate::commit::{reflog_message, CommitBuilder};
use crate::config::{RepositoryConfig, CONFIG_FILE};
use crate::error::{SdkError, SdkResult};

const INDEX_FILE: &str = "index";

/// An object store, a reference store and the configuration that ties them
/// together, plus the branch commits are made on.
pub struct Repository {
    root: Option<PathBuf>,
    config: RepositoryConfig,
    store: Arc<dyn ObjectStore>,
    refs: Arc<dyn RefStore>,
    branch: String,
}

impl Repository {
    /// Create a repository with default configuration at `path`.
    pub fn init(path: impl AsRef<Path>) -> SdkResult<Self> {
        Self::init_with_config(path, RepositoryConfig::default())
    }

    pub fn init_with_config(path: impl AsRef<Path>, config: RepositoryConfig) -> SdkResult<Self> {
        let path = path.as_ref();
        let config_path = path.join(CONFIG_FILE);
        if config_path.exists() {
            return Err(SdkError::AlreadyInitialized(path.display().to_string()));
        }
        config.validate()?;
        std::fs::create_dir_all(path)?;
        config.save(&config_path)?;
        let repo = Self::open_with(path, config)?;
        info!(root = %path.display(), "repository initialized");
        Ok(repo)
    }

    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        let config_path = path.join(CONFIG_FILE);
        if !config_path.is_file() {
            return Err(SdkError::NotInitialized(path.display().to_string()));
        }
        let config = RepositoryConfig::load(&config_path)?;
        Self::open_with(path, config)
    }

    fn open_with(path: &Path, config: RepositoryConfig) -> SdkResult<Self> {
        let store = LooseObjectStore::open(path, config.objects.clone())?;
        let refs = FileRefStore::open(path)?.with_lock_timeout(config.lock_timeout());
        let mut repo = Self::from_parts(Arc::new(store), Arc::new(refs), config)?;
        repo.root = Some(path.to_path_buf());
        Ok(repo)
    }

    /// A repository that lives only in memory.
    pub fn in_memory() -> Self {
        let config = RepositoryConfig::default();
        let refs = InMemoryRefStore::new().with_lock_timeout(config.lock_timeout());
        Self {
            root: None,
            branch: format!("refs/heads/{}", config.refs.default_branch),
            config,
            store: Arc::new(InMemoryObjectStore::new()),
            refs: Arc::new(refs),
        }
    }

    /// Assemble a repository from existing stores.
    pub fn from_parts(
        store: Arc<dyn ObjectStore>,
        refs: Arc<dyn RefStore>,
        config: RepositoryConfig,
    ) -> SdkResult<Self> {
        config.validate()?;
        let branch = branch_ref(&config.refs.default_branch)?;
        Ok(Self {
            root: None,
            config,
            store,
            refs,
            branch,
        })
    }

    // ---- Accessors ----

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn refs(&self) -> &Arc<dyn RefStore> {
        &self.refs
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Directory the repository lives in; `None` when in memory.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// The configured identity, or [`SdkError::MissingIdentity`].
    pub fn default_identity(&self) -> SdkResult<PersonIdent> {
        self.config.identity().ok_or(SdkError::MissingIdentity)
    }

    /// Replace the `[user]` identity used when none is passed explicitly.
    /// Only affects this handle; the config file is left alone.
    pub fn set_identity(&mut self, name: impl Into<String>, email: impl Into<String>) {
        self.config.user = Some(crate::config::UserConfig {
            name: name.into(),
            email: email.into(),
        });
    }

    // ---- Branch operations ----

    /// Full name of the current branch, e.g. `refs/heads/main`.
    pub fn current_branch(&self) -> &str {
        &self.branch
    }

    /// Tip of the current branch; `None` until its first commit.
    pub fn head_commit(&self) -> SdkResult<Option<ObjectId>> {
        Ok(self.refs.read_ref(&self.branch)?.map(|r| r.target))
    }

    /// Tree of the current branch tip, if there is one.
    pub fn head_tree(&self) -> SdkResult<Option<ObjectId>> {
        match self.head_commit()? {
            Some(id) => Ok(Some(self.store.read_commit(&id)?.tree)),
            None => Ok(None),
        }
    }

    pub fn create_branch(&self, name: &str, at: &ObjectId, who: &PersonIdent) -> SdkResult<()> {
        let full = branch_ref(name)?;
        let commit = self.peel_to_commit(at)?;
        let message = format!("branch: Created from {}", commit.short_hex());
        self.refs
            .compare_and_update(&full, &ObjectId::null(), &commit, who, &message)?;
        Ok(())
    }

    /// Move to an existing branch.
    pub fn switch_branch(&mut self, name: &str) -> SdkResult<()> {
        let full = branch_ref(name)?;
        if self.refs.read_ref(&full)?.is_none() {
            return Err(SdkError::BranchNotFound(name.to_string()));
        }
        self.branch = full;
        Ok(())
    }

    /// Short names of all branches, sorted.
    pub fn list_branches(&self) -> SdkResult<Vec<String>> {
        Ok(self
            .refs
            .list_refs("refs/heads/")?
            .into_iter()
            .map(|r| short_name(&r.name).to_string())
            .collect())
    }

    // ---- Staging ----

    /// An empty staging area backed by this repository's store.
    pub fn new_index(&self) -> Index {
        Index::new(Arc::clone(&self.store))
    }

    /// The persisted staging area; empty if none was saved yet.
    pub fn load_index(&self) -> SdkResult<Index> {
        match &self.root {
            Some(root) => Ok(Index::load(Arc::clone(&self.store), &root.join(INDEX_FILE))?),
            None => Ok(self.new_index()),
        }
    }

    pub fn save_index(&self, index: &Index) -> SdkResult<()> {
        let root = self.root.as_ref().ok_or_else(|| {
            SdkError::InvalidOperation("in-memory repository has no index file".into())
        })?;
        index.save(&root.join(INDEX_FILE))?;
        Ok(())
    }

    // ---- Commit operations ----

    /// Write a commit and advance its branch.
    ///
    /// The tree and every parent must already be stored. The branch moves
    /// with a compare-and-swap from the tip observed here, so a concurrent
    /// commit on the same branch makes this one fail with a stale-reference
    /// error instead of being lost.
    pub fn commit(&self, builder: CommitBuilder) -> SdkResult<ObjectId> {
        let reference = builder
            .reference
            .clone()
            .unwrap_or_else(|| self.branch.clone());
        let tip = self.refs.current_target(&reference)?;

        self.store.read_tree(&builder.tree)?;
        let parents = match &builder.parents {
            Some(parents) => parents.clone(),
            None if tip.is_null() => Vec::new(),
            None => vec![tip],
        };
        for parent in &parents {
            self.store.read_commit(parent)?;
        }
        let author = match &builder.author {
            Some(author) => author.clone(),
            None => self.default_identity()?,
        };

        let commit = builder.into_commit(parents, author);
        let id = self.store.write_commit(&commit)?;
        self.refs.compare_and_update(
            &reference,
            &tip,
            &id,
            &commit.committer,
            &reflog_message(&commit),
        )?;
        info!(
            branch = short_name(&reference),
            commit = %id.short_hex(),
            parents = commit.parents.len(),
            "commit created"
        );
        Ok(id)
    }

    /// Commit the staged content on the current branch as the configured
    /// identity.
    pub fn commit_index(&self, index: &mut Index, message: &str) -> SdkResult<ObjectId> {
        let tree = index.write_tree()?;
        self.commit(CommitBuilder::new(tree, message))
    }

    // ---- History ----

    /// Resolve a revision to an object id.
    ///
    /// Accepted forms: `HEAD` (the current branch tip), a full hex id, a
    /// full reference name, or a short name looked up under `refs/`,
    /// `refs/tags/` and `refs/heads/` in that order. Any of these may be
    /// followed by `~n` (n-th first-parent ancestor) and `^n` (n-th
    /// parent), where n defaults to 1.
    pub fn resolve(&self, rev: &str) -> SdkResult<ObjectId> {
        let (base, steps) = parse_revision(rev)?;
        let mut id = self.resolve_base(rev, base)?;
        for step in steps {
            let (nth, hops) = match step {
                Step::Parent(n) => (n, 1),
                Step::Ancestor(n) => (1, n),
            };
            id = self.peel_to_commit(&id)?;
            if nth == 0 {
                continue;
            }
            for _ in 0..hops {
                let commit = self.store.read_commit(&id)?;
                id = *commit
                    .parents
                    .get(nth - 1)
                    .ok_or_else(|| SdkError::UnknownRevision(rev.to_string()))?;
            }
        }
        Ok(id)
    }

    fn resolve_base(&self, rev: &str, base: &str) -> SdkResult<ObjectId> {
        if base == "HEAD" {
            return self
                .head_commit()?
                .ok_or_else(|| SdkError::NoHead(short_name(&self.branch).to_string()));
        }
        if let Ok(id) = base.parse::<ObjectId>() {
            if self.store.exists(&id)? {
                return Ok(id);
            }
            return Err(SdkError::UnknownRevision(rev.to_string()));
        }
        let candidates = if base.starts_with("refs/") {
            vec![base.to_string()]
        } else {
            vec![
                format!("refs/{base}"),
                format!("refs/tags/{base}"),
                format!("refs/heads/{base}"),
            ]
        };
        for name in candidates {
            if grove_refs::validate_ref_name(&name).is_err() {
                continue;
            }
            if let Some(r) = self.refs.read_ref(&name)? {
                return Ok(r.target);
            }
        }
        Err(SdkError::UnknownRevision(rev.to_string()))
    }

    /// Follow tags until a commit is reached.
    pub fn peel_to_commit(&self, id: &ObjectId) -> SdkResult<ObjectId> {
        let mut current = *id;
        loop {
            match self.store.read_object(&current)? {
                Object::Commit(_) => return Ok(current),
                Object::Tag(tag) => current = tag.object,
                other => return Err(wrong_kind(&current, &other, "commit")),
            }
        }
    }

    /// The tree a commit, tag or tree id stands for.
    pub fn peel_to_tree(&self, id: &ObjectId) -> SdkResult<ObjectId> {
        let mut current = *id;
        loop {
            match self.store.read_object(&current)? {
                Object::Tree(_) => return Ok(current),
                Object::Commit(commit) => return Ok(commit.tree),
                Object::Tag(tag) => current = tag.object,
                other => return Err(wrong_kind(&current, &other, "tree")),
            }
        }
    }

    /// Newest-first history reachable from `rev`.
    ///
    /// ```ignore
    /// for commit in repo.log("HEAD")?.take(10) {
    ///     println!("{}", commit?.subject());
    /// }
    /// ```
    pub fn log(&self, rev: &str) -> SdkResult<RevWalk<'_>> {
        self.log_range(None, rev)
    }

    /// Commits reachable from `to` but not from `from`.
    pub fn log_range(&self, from: Option<&str>, to: &str) -> SdkResult<RevWalk<'_>> {
        let mut walk = RevWalk::new(self.store.as_ref());
        walk.sort(RevSort::CommitTime);
        walk.mark_start(self.peel_to_commit(&self.resolve(to)?)?)?;
        if let Some(from) = from {
            walk.mark_uninteresting(self.peel_to_commit(&self.resolve(from)?)?)?;
        }
        Ok(walk)
    }

    /// Load one commit as a graph node.
    pub fn show(&self, rev: &str) -> SdkResult<CommitNode> {
        let id = self.peel_to_commit(&self.resolve(rev)?)?;
        Ok(CommitNode::new(id, self.store.read_commit(&id)?))
    }

    pub fn merge_base(&self, a: &str, b: &str) -> SdkResult<Option<ObjectId>> {
        let a = self.peel_to_commit(&self.resolve(a)?)?;
        let b = self.peel_to_commit(&self.resolve(b)?)?;
        Ok(merge_base(self.store.as_ref(), &a, &b)?)
    }

    // ---- Diff & status ----

    /// Diff two commits, tags or trees. `None` stands for the empty tree.
    pub fn diff(
        &self,
        old: Option<&ObjectId>,
        new: Option<&ObjectId>,
        options: &DiffOptions,
    ) -> SdkResult<Vec<DiffEntry>> {
        let old = old.map(|id| self.peel_to_tree(id)).transpose()?;
        let new = new.map(|id| self.peel_to_tree(id)).transpose()?;
        Ok(diff_tree_ids(
            self.store.as_ref(),
            old.as_ref(),
            new.as_ref(),
            options,
        )?)
    }

    /// Staged, unstaged and untracked changes relative to the current
    /// branch tip.
    pub fn status(
        &self,
        index: &Index,
        worktree: &WorkingTree,
        options: &DiffOptions,
    ) -> SdkResult<WorkdirStatus> {
        let head_tree = self.head_tree()?;
        Ok(status(
            self.store.as_ref(),
            head_tree.as_ref(),
            index,
            worktree,
            options,
        )?)
    }

    // ---- Checkpoints ----

    /// Start a checkpoint of the current branch's staged and working state.
    pub fn checkpoint(&self) -> CheckpointCommand<'_> {
        CheckpointCommand::new(self)
    }

    /// Recorded checkpoints, newest first.
    pub fn checkpoints(&self) -> SdkResult<Vec<ReflogEntry>> {
        let mut entries = self.refs.read_reflog(&self.config.refs.checkpoint_ref)?;
        entries.retain(|e| !e.is_deletion());
        entries.reverse();
        Ok(entries)
    }
}

fn wrong_kind(id: &ObjectId, object: &Object, expected: &'static str) -> SdkError {
    SdkError::WrongKind {
        id: id.to_hex(),
        kind: object.kind().to_string(),
        expected,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    /// `^n`
    Parent(usize),
    /// `~n`
    Ancestor(usize),
}

fn parse_revision(rev: &str) -> SdkResult<(&str, Vec<Step>)> {
    let unknown = || SdkError::UnknownRevision(rev.to_string());
    let split = rev.find(['~', '^']).unwrap_or(rev.len());
    let (base, mut rest) = rev.split_at(split);
    if base.is_empty() {
        return Err(unknown());
    }

    let mut steps = Vec::new();
    while !rest.is_empty() {
        let mut chars = rest.chars();
        let op = chars.next().ok_or_else(unknown)?;
        rest = chars.as_str();
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let n = if digits == 0 {
            1
        } else {
            rest[..digits].parse().map_err(|_| unknown())?
        };
        rest = &rest[digits..];
        steps.push(match op {
            '~' => Step::Ancestor(n),
            '^' => Step::Parent(n),
            _ => return Err(unknown()),
        });
    }
    Ok((base, steps))
}
