use grove_store::Commit;
use grove_types::{ObjectId, PersonIdent};

/// Description of a commit to create through [`Repository::commit`].
///
/// Only the tree and the message are required. Unset parts are filled in
/// when the commit is made:
///
/// - parents default to the current tip of the target branch (none for an
///   unborn branch),
/// - the author defaults to the configured `[user]` identity,
/// - the committer defaults to the author,
/// - the target reference defaults to the repository's current branch.
///
/// [`Repository::commit`]: crate::Repository::commit
#[derive(Clone, Debug)]
pub struct CommitBuilder {
    pub tree: ObjectId,
    pub message: String,
    pub parents: Option<Vec<ObjectId>>,
    pub author: Option<PersonIdent>,
    pub committer: Option<PersonIdent>,
    pub reference: Option<String>,
}

impl CommitBuilder {
    pub fn new(tree: ObjectId, message: impl Into<String>) -> Self {
        Self {
            tree,
            message: message.into(),
            parents: None,
            author: None,
            committer: None,
            reference: None,
        }
    }

    pub fn with_parents(mut self, parents: Vec<ObjectId>) -> Self {
        self.parents = Some(parents);
        self
    }

    pub fn with_author(mut self, author: PersonIdent) -> Self {
        self.author = Some(author);
        self
    }

    pub fn with_committer(mut self, committer: PersonIdent) -> Self {
        self.committer = Some(committer);
        self
    }

    /// Advance this reference (full name) instead of the current branch.
    pub fn with_reference(mut self, name: impl Into<String>) -> Self {
        self.reference = Some(name.into());
        self
    }

    pub(crate) fn into_commit(self, parents: Vec<ObjectId>, author: PersonIdent) -> Commit {
        let committer = self.committer.unwrap_or_else(|| author.clone());
        Commit {
            tree: self.tree,
            parents,
            author,
            committer,
            message: self.message,
        }
    }
}

/// Reflog message for a commit that moves a branch.
pub(crate) fn reflog_message(commit: &Commit) -> String {
    let kind = match commit.parents.len() {
        0 => "commit (initial)",
        1 => "commit",
        _ => "commit (merge)",
    };
    format!("{kind}: {}", commit.subject())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn who() -> PersonIdent {
        PersonIdent::new("Ada", "ada@example.com", 1_700_000_000, 60)
    }

    #[test]
    fn builder_defaults_committer_to_author() {
        let tree = ObjectId::from_bytes(b"tree");
        let commit = CommitBuilder::new(tree, "msg").into_commit(vec![], who());
        assert_eq!(commit.author, commit.committer);
        assert_eq!(commit.tree, tree);
    }

    #[test]
    fn builder_keeps_explicit_parts() {
        let tree = ObjectId::from_bytes(b"tree");
        let parent = ObjectId::from_bytes(b"parent");
        let committer = who().at(1_700_000_100, 0);
        let b = CommitBuilder::new(tree, "msg")
            .with_parents(vec![parent])
            .with_committer(committer.clone())
            .with_reference("refs/heads/topic");
        assert_eq!(b.parents.as_deref(), Some(&[parent][..]));
        assert_eq!(b.reference.as_deref(), Some("refs/heads/topic"));
        let commit = b.into_commit(vec![parent], who());
        assert_eq!(commit.committer, committer);
        assert_ne!(commit.author, commit.committer);
    }

    #[test]
    fn reflog_messages_by_parent_count() {
        let tree = ObjectId::from_bytes(b"tree");
        let p = ObjectId::from_bytes(b"p");
        let make = |parents: Vec<ObjectId>| {
            CommitBuilder::new(tree, "Subject line\n\nbody").into_commit(parents, who())
        };
        assert_eq!(reflog_message(&make(vec![])), "commit (initial): Subject line");
        assert_eq!(reflog_message(&make(vec![p])), "commit: Subject line");
        assert_eq!(reflog_message(&make(vec![p, p])), "commit (merge): Subject line");
    }
}
