//! High-level Grove API.
//!
//! [`Repository`] bundles an object store, a reference store and the
//! repository configuration behind one handle. Everything else in this
//! crate is built on top of it:
//!
//! - [`CommitBuilder`] writes a commit and advances a branch with a
//!   compare-and-swap reference update.
//! - [`CheckpointCommand`] records the staged and working state as a pair
//!   (or triple) of commits under a checkpoint reference, like `git stash`.
//! - [`RepositoryConfig`] is the `grove.toml` file.
//!
//! ```ignore
//! let mut repo = Repository::init("/tmp/project")?;
//! repo.set_identity("Ada", "ada@example.com");
//! let mut index = repo.new_index();
//! index.stage_file("README", b"hello", EntryMode::Regular)?;
//! repo.commit_index(&mut index, "initial import")?;
//!
//! let mut worktree = WorkingTree::from_index(&index);
//! worktree.write_file("README", "hello, world", EntryMode::Regular);
//! let checkpoint = repo.checkpoint().call(&index, &worktree)?;
//! ```

pub mod checkpoint;
pub mod commit;
pub mod config;
pub mod error;
pub mod repository;

pub use checkpoint::CheckpointCommand;
pub use commit::CommitBuilder;
pub use config::{RefsConfig, RepositoryConfig, UserConfig, CONFIG_FILE};
pub use error::{SdkError, SdkResult};
pub use repository::Repository;
