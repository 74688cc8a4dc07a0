//! Revision walking over the commit graph.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, VecDeque};

use grove_store::{ObjectStore, ObjectStoreExt, StoreError};
use grove_types::ObjectId;
use tracing::{debug, trace};

use crate::error::{DagError, DagResult};
use crate::node::CommitNode;

/// Output order of a [`RevWalk`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RevSort {
    /// Newest committer time first, except that no commit comes before any
    /// of its children, even when clocks are skewed. Ties keep the order
    /// commits were queued.
    #[default]
    CommitTime,
    /// No commit before any of its children. A commit's parent follows it
    /// as soon as the parent's last child has been emitted, so each line of
    /// history stays together.
    Topo,
    /// Follow only the first parent of each interesting commit, in the
    /// order commits were queued.
    FirstParent,
}

const SEEN: u8 = 1 << 0;
const UNINTERESTING: u8 = 1 << 1;

/// Queued commits after the last interesting one that may still carry
/// uninteresting marks down to it. Absorbs modest clock skew.
const OVERSCAN: usize = 5;

#[derive(Clone, Copy, PartialEq, Eq)]
struct QueueKey {
    time: i64,
    seq: Reverse<u64>,
    id: ObjectId,
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

enum Phase {
    Pending,
    Lazy,
    Buffered(VecDeque<ObjectId>),
    Done,
}

/// Iterator over commits reachable from the start points and not from any
/// uninteresting point.
///
/// Flags and loaded commits live in per-walk maps; nothing is shared
/// between walks. Without uninteresting marks a first-parent walk is fully
/// lazy. Date and topological walks load the reachable history before the
/// first commit comes out, because a child found late can still hold back a
/// parent with a newer timestamp. With uninteresting marks every walk scans
/// ahead until each queued commit is uninteresting and older than all
/// interesting output (plus [`OVERSCAN`] extra steps), because a mark can
/// reach a commit only after it was queued.
///
/// ```ignore
/// let mut walk = RevWalk::new(store.as_ref());
/// walk.mark_start(head)?;
/// walk.mark_uninteresting(upstream)?;
/// for commit in walk {
///     println!("{}", commit?.subject());
/// }
/// ```
pub struct RevWalk<'a> {
    store: &'a dyn ObjectStore,
    sort: RevSort,
    cache: HashMap<ObjectId, CommitNode>,
    flags: HashMap<ObjectId, u8>,
    queue: BinaryHeap<QueueKey>,
    seq: u64,
    phase: Phase,
}

impl<'a> RevWalk<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self {
            store,
            sort: RevSort::default(),
            cache: HashMap::new(),
            flags: HashMap::new(),
            queue: BinaryHeap::new(),
            seq: 0,
            phase: Phase::Pending,
        }
    }

    pub fn sort(&mut self, sort: RevSort) -> &mut Self {
        self.sort = sort;
        let queued: Vec<QueueKey> = self.queue.drain().collect();
        for key in queued {
            let time = self.queue_time(&key.id);
            self.queue.push(QueueKey { time, ..key });
        }
        self
    }

    /// Load a commit, caching it for the rest of the walk.
    pub fn parse_commit(&mut self, id: &ObjectId) -> DagResult<CommitNode> {
        self.load(id, None).cloned()
    }

    /// Include `id` and its ancestors.
    pub fn mark_start(&mut self, id: ObjectId) -> DagResult<()> {
        self.ensure_pending()?;
        self.load(&id, None)?;
        self.enqueue(id);
        Ok(())
    }

    /// Exclude `id` and everything reachable from it.
    pub fn mark_uninteresting(&mut self, id: ObjectId) -> DagResult<()> {
        self.ensure_pending()?;
        self.load(&id, None)?;
        self.carry_uninteresting(id);
        self.enqueue(id);
        Ok(())
    }

    /// Forget marks and flags, keeping the commit cache.
    pub fn reset(&mut self) {
        self.flags.clear();
        self.queue.clear();
        self.seq = 0;
        self.phase = Phase::Pending;
    }

    fn ensure_pending(&self) -> DagResult<()> {
        match self.phase {
            Phase::Pending => Ok(()),
            _ => Err(DagError::AlreadyStarted),
        }
    }

    fn load(&mut self, id: &ObjectId, child: Option<ObjectId>) -> DagResult<&CommitNode> {
        if !self.cache.contains_key(id) {
            let commit = self.store.read_commit(id).map_err(|e| match e {
                StoreError::NotFound(missing) => DagError::MissingObject {
                    id: missing,
                    referenced_by: child,
                },
                other => other.into(),
            })?;
            self.cache.insert(*id, CommitNode::new(*id, commit));
        }
        self.cache
            .get(id)
            .ok_or(DagError::MissingObject {
                id: *id,
                referenced_by: child,
            })
    }

    fn flag(&self, id: &ObjectId) -> u8 {
        self.flags.get(id).copied().unwrap_or(0)
    }

    fn is_uninteresting(&self, id: &ObjectId) -> bool {
        self.flag(id) & UNINTERESTING != 0
    }

    fn enqueue(&mut self, id: ObjectId) {
        let flags = self.flags.entry(id).or_default();
        if *flags & SEEN != 0 {
            return;
        }
        *flags |= SEEN;
        let time = self.queue_time(&id);
        self.seq += 1;
        self.queue.push(QueueKey {
            time,
            seq: Reverse(self.seq),
            id,
        });
    }

    /// Mark `id` uninteresting, and every already-loaded ancestor with it.
    fn carry_uninteresting(&mut self, id: ObjectId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let flags = self.flags.entry(current).or_default();
            if *flags & UNINTERESTING != 0 {
                continue;
            }
            *flags |= UNINTERESTING;
            if let Some(node) = self.cache.get(&current) {
                stack.extend(node.parents.iter().copied());
            }
        }
    }

    /// Pop one commit, queue its parents, and return it.
    fn advance(&mut self) -> DagResult<Option<ObjectId>> {
        let Some(key) = self.queue.pop() else {
            return Ok(None);
        };
        let id = key.id;
        let uninteresting = self.is_uninteresting(&id);
        let parents = self.load(&id, None)?.parents.clone();
        let parents: &[ObjectId] = if self.sort == RevSort::FirstParent && !uninteresting {
            &parents[..parents.len().min(1)]
        } else {
            &parents
        };
        for parent in parents {
            self.load(parent, Some(id))?;
            if uninteresting {
                self.carry_uninteresting(*parent);
            }
            self.enqueue(*parent);
        }
        trace!(commit = %id.short_hex(), uninteresting, "walked commit");
        Ok(Some(id))
    }

    fn has_uninteresting(&self) -> bool {
        self.flags.values().any(|f| f & UNINTERESTING != 0)
    }

    fn start(&mut self) -> DagResult<()> {
        if self.sort == RevSort::FirstParent && !self.has_uninteresting() {
            self.phase = Phase::Lazy;
            return Ok(());
        }

        let mut output: Vec<ObjectId> = Vec::new();
        let mut oldest_interesting = i64::MAX;
        let mut overscan = OVERSCAN;
        while let Some(id) = self.advance()? {
            if !self.is_uninteresting(&id) {
                output.push(id);
                oldest_interesting = oldest_interesting.min(self.time(&id));
            }
            if self.queue.iter().all(|k| self.is_uninteresting(&k.id)) {
                let newest_queued = self
                    .queue
                    .iter()
                    .map(|k| self.time(&k.id))
                    .max()
                    .unwrap_or(i64::MIN);
                if newest_queued <= oldest_interesting {
                    overscan -= 1;
                    if overscan == 0 {
                        break;
                    }
                } else {
                    overscan = OVERSCAN;
                }
            } else {
                overscan = OVERSCAN;
            }
        }
        output.retain(|id| !self.is_uninteresting(id));
        debug!(
            commits = output.len(),
            loaded = self.cache.len(),
            "revision walk buffered"
        );

        match self.sort {
            RevSort::CommitTime => output = self.topo_order(output, false),
            RevSort::Topo => output = self.topo_order(output, true),
            RevSort::FirstParent => {}
        }
        self.phase = Phase::Buffered(output.into());
        Ok(())
    }

    fn time(&self, id: &ObjectId) -> i64 {
        self.cache.get(id).map(CommitNode::commit_time).unwrap_or(i64::MIN)
    }

    /// Priority of `id` in the queue. First-parent walks ignore dates, so
    /// the queue degrades to FIFO.
    fn queue_time(&self, id: &ObjectId) -> i64 {
        match self.sort {
            RevSort::FirstParent => 0,
            _ => self.time(id),
        }
    }

    /// Reorder a date-ordered list so that no commit precedes a child.
    ///
    /// Among commits whose children are all out, the newest goes next; with
    /// `depth_first`, the most recently released one does instead.
    fn topo_order(&self, dated: Vec<ObjectId>, depth_first: bool) -> Vec<ObjectId> {
        let rank: HashMap<ObjectId, usize> =
            dated.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let mut pending_children: HashMap<ObjectId, usize> = HashMap::new();
        for id in &dated {
            if let Some(node) = self.cache.get(id) {
                for parent in &node.parents {
                    if rank.contains_key(parent) {
                        *pending_children.entry(*parent).or_default() += 1;
                    }
                }
            }
        }

        let tips = dated
            .iter()
            .filter(|id| !pending_children.contains_key(*id))
            .map(|id| rank[id]);
        let mut ready = if depth_first {
            Ready::Stack(tips.rev().collect())
        } else {
            Ready::Heap(tips.map(Reverse).collect())
        };
        let mut out = Vec::with_capacity(dated.len());
        while let Some(i) = ready.pop() {
            let id = dated[i];
            out.push(id);
            if let Some(node) = self.cache.get(&id) {
                // Reversed so that, on a stack, the first parent pops first.
                for parent in node.parents.iter().rev() {
                    if let Some(count) = pending_children.get_mut(parent) {
                        *count -= 1;
                        if *count == 0 {
                            ready.push(rank[parent]);
                        }
                    }
                }
            }
        }
        out
    }

    fn step(&mut self) -> DagResult<Option<ObjectId>> {
        loop {
            match self.phase {
                Phase::Pending => self.start()?,
                Phase::Lazy => return self.advance(),
                Phase::Buffered(ref mut out) => return Ok(out.pop_front()),
                Phase::Done => return Ok(None),
            }
        }
    }
}

/// Commits whose children have all been emitted, by rank in date order.
enum Ready {
    Heap(BinaryHeap<Reverse<usize>>),
    Stack(Vec<usize>),
}

impl Ready {
    fn push(&mut self, rank: usize) {
        match self {
            Ready::Heap(heap) => heap.push(Reverse(rank)),
            Ready::Stack(stack) => stack.push(rank),
        }
    }

    fn pop(&mut self) -> Option<usize> {
        match self {
            Ready::Heap(heap) => heap.pop().map(|Reverse(rank)| rank),
            Ready::Stack(stack) => stack.pop(),
        }
    }
}

impl Iterator for RevWalk<'_> {
    type Item = DagResult<CommitNode>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self
            .step()
            .and_then(|id| id.map(|id| self.load(&id, None).cloned()).transpose());
        match result {
            Ok(Some(node)) => Some(Ok(node)),
            Ok(None) => {
                self.phase = Phase::Done;
                None
            }
            Err(e) => {
                self.phase = Phase::Done;
                Some(Err(e))
            }
        }
    }
}
