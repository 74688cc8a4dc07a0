//! Index entry types.

use grove_store::EntryMode;
use grove_types::ObjectId;
use serde::{Deserialize, Serialize};

/// Merge stage of an index entry.
///
/// A resolved path has a single `Merged` entry. An unresolved merge leaves
/// up to three entries for the same path: the common ancestor version and
/// the two sides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Merged = 0,
    Base = 1,
    Ours = 2,
    Theirs = 3,
}

impl Stage {
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn is_conflict(self) -> bool {
        self != Stage::Merged
    }
}

/// One staged path at one stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Slash-separated path relative to the working tree root.
    pub path: String,
    pub mode: EntryMode,
    /// Blob (or gitlink commit) the path is staged at.
    pub object_id: ObjectId,
    pub stage: Stage,
}

impl IndexEntry {
    /// A resolved (stage 0) entry.
    pub fn new(path: impl Into<String>, mode: EntryMode, object_id: ObjectId) -> Self {
        Self {
            path: path.into(),
            mode,
            object_id,
            stage: Stage::Merged,
        }
    }

    pub fn at_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }
}
