//! Exact-content rename and copy detection.

use std::collections::HashMap;

use grove_store::EntryMode;
use grove_types::ObjectId;
use tracing::debug;

use crate::diff::{sort_entries, ChangeType, DiffEntry};

/// Pairs deletes and adds whose content ids are identical.
///
/// - An add matching an unpaired delete becomes a `Rename` of that delete.
///   When several deletes qualify, one with the same file name wins.
/// - With copy detection on, an add matching the old side of a `Modify`, or
///   a delete already consumed by a rename, becomes a `Copy`.
///
/// Paired entries score 100. Gitlinks only pair with gitlinks.
#[derive(Clone, Debug)]
pub struct RenameDetector {
    detect_copies: bool,
}

impl Default for RenameDetector {
    fn default() -> Self {
        Self {
            detect_copies: true,
        }
    }
}

struct Source {
    path: String,
    id: ObjectId,
    mode: EntryMode,
    used: bool,
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn compatible(a: EntryMode, b: EntryMode) -> bool {
    (a == EntryMode::Gitlink) == (b == EntryMode::Gitlink)
}

impl RenameDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect_copies(mut self, on: bool) -> Self {
        self.detect_copies = on;
        self
    }

    pub fn detect(&self, entries: Vec<DiffEntry>) -> Vec<DiffEntry> {
        let mut adds = Vec::new();
        let mut out = Vec::new();
        let mut deletes: HashMap<ObjectId, Vec<Source>> = HashMap::new();
        let mut modified: HashMap<ObjectId, Source> = HashMap::new();

        for entry in entries {
            match entry.change_type {
                ChangeType::Add => adds.push(entry),
                ChangeType::Delete => {
                    if let (Some(path), Some(mode)) = (entry.old_path.clone(), entry.old_mode) {
                        deletes.entry(entry.old_id).or_default().push(Source {
                            path,
                            id: entry.old_id,
                            mode,
                            used: false,
                        });
                    }
                }
                ChangeType::Modify => {
                    if let (Some(path), Some(mode)) = (entry.old_path.clone(), entry.old_mode) {
                        modified.entry(entry.old_id).or_insert(Source {
                            path,
                            id: entry.old_id,
                            mode,
                            used: true,
                        });
                    }
                    out.push(entry);
                }
                _ => out.push(entry),
            }
        }

        let mut renames = 0usize;
        let mut copies = 0usize;
        for add in adds {
            let (Some(new_path), Some(new_mode)) = (add.new_path.as_deref(), add.new_mode) else {
                out.push(add);
                continue;
            };

            let candidates = deletes.get_mut(&add.new_id);
            if let Some(src) = candidates.and_then(|c| pick_rename(c, new_path, new_mode)) {
                src.used = true;
                out.push(paired(ChangeType::Rename, src, new_path, new_mode));
                renames += 1;
                continue;
            }

            if self.detect_copies {
                let from_delete = deletes
                    .get(&add.new_id)
                    .and_then(|c| c.iter().find(|s| s.used && compatible(s.mode, new_mode)));
                let source = from_delete.or_else(|| {
                    modified
                        .get(&add.new_id)
                        .filter(|s| compatible(s.mode, new_mode))
                });
                if let Some(src) = source {
                    out.push(paired(ChangeType::Copy, src, new_path, new_mode));
                    copies += 1;
                    continue;
                }
            }
            out.push(add);
        }

        for src in deletes.into_values().flatten().filter(|s| !s.used) {
            out.push(DiffEntry::delete(src.path, src.mode, src.id));
        }

        debug!(renames, copies, "rename detection complete");
        sort_entries(&mut out);
        out
    }
}

fn pick_rename<'s>(
    candidates: &'s mut [Source],
    new_path: &str,
    new_mode: EntryMode,
) -> Option<&'s mut Source> {
    let name = file_name(new_path);
    let index = candidates
        .iter()
        .position(|s| !s.used && compatible(s.mode, new_mode) && file_name(&s.path) == name)
        .or_else(|| {
            candidates
                .iter()
                .position(|s| !s.used && compatible(s.mode, new_mode))
        })?;
    candidates.get_mut(index)
}

fn paired(kind: ChangeType, src: &Source, new_path: &str, new_mode: EntryMode) -> DiffEntry {
    DiffEntry {
        change_type: kind,
        old_path: Some(src.path.clone()),
        new_path: Some(new_path.to_string()),
        old_id: src.id,
        new_id: src.id,
        old_mode: Some(src.mode),
        new_mode: Some(new_mode),
        score: 100,
    }
}
