use grove_store::{message_subject, Commit};
use grove_types::{ObjectId, PersonIdent};
use serde::{Deserialize, Serialize};

/// A commit as seen by the graph walker.
///
/// Loaded once per walk and cached; the walker hands out clones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitNode {
    pub id: ObjectId,
    pub tree: ObjectId,
    /// Ordered parents; the first is the mainline parent.
    pub parents: Vec<ObjectId>,
    pub author: PersonIdent,
    pub committer: PersonIdent,
    pub message: String,
}

impl CommitNode {
    pub fn new(id: ObjectId, commit: Commit) -> Self {
        Self {
            id,
            tree: commit.tree,
            parents: commit.parents,
            author: commit.author,
            committer: commit.committer,
            message: commit.message,
        }
    }

    /// Committer timestamp, the key for date ordering.
    pub fn commit_time(&self) -> i64 {
        self.committer.when
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    /// First paragraph of the message on one line.
    pub fn subject(&self) -> String {
        message_subject(&self.message)
    }
}
