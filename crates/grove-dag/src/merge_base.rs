//! Common-ancestor queries.

use std::collections::{HashMap, HashSet, VecDeque};

use grove_store::ObjectStore;
use grove_types::ObjectId;

use crate::error::DagResult;
use crate::node::CommitNode;
use crate::walk::RevWalk;

/// Every commit reachable from `id`, including itself.
fn ancestors(
    walk: &mut RevWalk<'_>,
    id: ObjectId,
    nodes: &mut HashMap<ObjectId, CommitNode>,
) -> DagResult<HashSet<ObjectId>> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert(id);
    queue.push_back(id);

    while let Some(current) = queue.pop_front() {
        let node = walk.parse_commit(&current)?;
        for parent in &node.parents {
            if visited.insert(*parent) {
                queue.push_back(*parent);
            }
        }
        nodes.insert(current, node);
    }
    Ok(visited)
}

/// All best common ancestors of `a` and `b`, newest first.
///
/// A common ancestor is "best" when it is not an ancestor of another
/// common ancestor. Criss-cross merges can produce several.
pub fn merge_bases(
    store: &dyn ObjectStore,
    a: &ObjectId,
    b: &ObjectId,
) -> DagResult<Vec<ObjectId>> {
    let mut walk = RevWalk::new(store);
    let mut nodes = HashMap::new();
    let from_a = ancestors(&mut walk, *a, &mut nodes)?;
    let from_b = ancestors(&mut walk, *b, &mut nodes)?;
    let common: HashSet<ObjectId> = from_a.intersection(&from_b).copied().collect();

    // Any strict ancestor of a common commit is the direct parent of some
    // other common commit.
    let redundant: HashSet<ObjectId> = common
        .iter()
        .filter_map(|id| nodes.get(id))
        .flat_map(|n| n.parents.iter().copied())
        .collect();

    let mut best: Vec<&CommitNode> = common
        .iter()
        .filter(|id| !redundant.contains(*id))
        .filter_map(|id| nodes.get(id))
        .collect();
    best.sort_by(|x, y| {
        y.commit_time()
            .cmp(&x.commit_time())
            .then_with(|| x.id.cmp(&y.id))
    });
    Ok(best.into_iter().map(|n| n.id).collect())
}

/// The newest best common ancestor, if the histories meet at all.
pub fn merge_base(
    store: &dyn ObjectStore,
    a: &ObjectId,
    b: &ObjectId,
) -> DagResult<Option<ObjectId>> {
    Ok(merge_bases(store, a, b)?.into_iter().next())
}

/// True if `ancestor` is reachable from `descendant` (or equal to it).
pub fn is_ancestor(
    store: &dyn ObjectStore,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> DagResult<bool> {
    let mut walk = RevWalk::new(store);
    walk.mark_start(*descendant)?;
    for commit in walk {
        if commit?.id == *ancestor {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_store::{Commit, InMemoryObjectStore, ObjectStoreExt, Tree};
    use grove_types::PersonIdent;

    fn commit(store: &InMemoryObjectStore, time: i64, parents: &[ObjectId]) -> ObjectId {
        let tree = store.write_tree(&Tree::empty()).unwrap();
        let who = PersonIdent::new("dev", "dev@example.com", time, 0);
        store
            .write_commit(&Commit {
                tree,
                parents: parents.to_vec(),
                author: who.clone(),
                committer: who,
                message: format!("c{time}"),
            })
            .unwrap()
    }

    #[test]
    fn fork_point() {
        let store = InMemoryObjectStore::new();
        let root = commit(&store, 1, &[]);
        let fork = commit(&store, 2, &[root]);
        let left = commit(&store, 3, &[fork]);
        let right = commit(&store, 4, &[fork]);
        assert_eq!(merge_base(&store, &left, &right).unwrap(), Some(fork));
    }

    #[test]
    fn ancestor_is_its_own_base() {
        let store = InMemoryObjectStore::new();
        let a = commit(&store, 1, &[]);
        let b = commit(&store, 2, &[a]);
        assert_eq!(merge_base(&store, &a, &b).unwrap(), Some(a));
        assert_eq!(merge_base(&store, &b, &b).unwrap(), Some(b));
    }

    #[test]
    fn unrelated_histories() {
        let store = InMemoryObjectStore::new();
        let a = commit(&store, 1, &[]);
        let b = commit(&store, 2, &[]);
        assert_eq!(merge_base(&store, &a, &b).unwrap(), None);
    }

    #[test]
    fn criss_cross_has_two_bases() {
        let store = InMemoryObjectStore::new();
        let root = commit(&store, 1, &[]);
        let x = commit(&store, 2, &[root]);
        let y = commit(&store, 3, &[root]);
        let m1 = commit(&store, 4, &[x, y]);
        let m2 = commit(&store, 5, &[y, x]);
        assert_eq!(merge_bases(&store, &m1, &m2).unwrap(), vec![y, x]);
    }

    #[test]
    fn ancestry_checks() {
        let store = InMemoryObjectStore::new();
        let a = commit(&store, 1, &[]);
        let b = commit(&store, 2, &[a]);
        let c = commit(&store, 3, &[a]);
        assert!(is_ancestor(&store, &a, &b).unwrap());
        assert!(is_ancestor(&store, &b, &b).unwrap());
        assert!(!is_ancestor(&store, &b, &a).unwrap());
        assert!(!is_ancestor(&store, &b, &c).unwrap());
    }
}
