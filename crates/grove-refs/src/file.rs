//! On-disk reference store.
//!
//! Layout under the repository root:
//!
//! ```text
//! refs/heads/main        "<hex id> <generation>\n"
//! refs/heads/main.lock   present only while an update is in flight
//! logs/refs/heads/main   one reflog line per successful update
//! ```
//!
//! An update creates the lock file exclusively, writes and fsyncs the new
//! value into it and renames the lock over the ref. Only then is the reflog
//! line appended and fsynced, so a failed update never leaves a log entry.
//! A crash before the rename leaves the old value in place.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use grove_types::{ObjectId, PersonIdent};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{RefError, RefResult};
use crate::lock::{sync_parent, RefLock, DEFAULT_LOCK_TIMEOUT};
use crate::names::validate_ref_name;
use crate::traits::{check_expected, RefStore};
use crate::types::{Ref, ReflogEntry};

const LOGS_DIR: &str = "logs";

/// A [`RefStore`] persisting refs and reflogs as files.
#[derive(Clone, Debug)]
pub struct FileRefStore {
    root: PathBuf,
    lock_timeout: Duration,
}

impl FileRefStore {
    /// Open (creating if necessary) a ref store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> RefResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("refs"))?;
        fs::create_dir_all(root.join(LOGS_DIR))?;
        Ok(Self {
            root,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn log_path(&self, name: &str) -> PathBuf {
        self.root.join(LOGS_DIR).join(name)
    }

    fn read_ref_file(&self, name: &str) -> RefResult<Option<Ref>> {
        let path = self.ref_path(name);
        if !path.is_file() {
            return Ok(None);
        }
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        parse_ref(name, &content).map(Some)
    }

    /// A live ref or retained reflog whose name nests with `name`.
    ///
    /// Checked against both trees, since a file and a directory cannot share
    /// a path.
    fn conflict(&self, name: &str) -> Option<String> {
        [self.root.clone(), self.root.join(LOGS_DIR)]
            .iter()
            .find_map(|base| nested_entry(base, name))
    }

    fn append_log(&self, name: &str, entry: &ReflogEntry) -> RefResult<()> {
        let path = self.log_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{entry}")?;
        file.sync_all()?;
        Ok(())
    }

    /// Move the ref by committing `lock`, then record `entry`.
    fn commit_logged(
        &self,
        name: &str,
        lock: RefLock,
        content: &[u8],
        entry: &ReflogEntry,
    ) -> RefResult<()> {
        lock.commit(content)?;
        self.append_log(name, entry)
    }

    /// Remove directories left empty below `refs/` after a delete.
    ///
    /// Stops at the first directory that cannot be removed. A concurrent
    /// update may have put a lock file in it, or a concurrent delete may
    /// have removed it already.
    fn prune_empty_parents(&self, path: &Path) {
        let stop = self.root.join("refs");
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == stop || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }
}

/// Parse `<hex> <generation>\n`.
fn parse_ref(name: &str, content: &str) -> RefResult<Ref> {
    let malformed = |reason: String| RefError::Malformed {
        name: name.to_string(),
        reason,
    };
    let line = content
        .strip_suffix('\n')
        .ok_or_else(|| malformed("missing trailing newline".into()))?;
    let (hex, generation) = line
        .split_once(' ')
        .ok_or_else(|| malformed(format!("expected '<id> <generation>', got {line:?}")))?;
    let target: ObjectId = hex.parse().map_err(|e| malformed(format!("{e}")))?;
    let generation: u64 = generation
        .parse()
        .map_err(|_| malformed(format!("bad generation {generation:?}")))?;
    if target.is_null() {
        return Err(malformed("null target".into()));
    }
    Ok(Ref::new(name, target, generation))
}

/// Name of an entry under `base` that nests with `name`, if any.
fn nested_entry(base: &Path, name: &str) -> Option<String> {
    // An ancestor of `name` stored as a file.
    let mut prefix = PathBuf::new();
    let components: Vec<&str> = name.split('/').collect();
    for (i, part) in components.iter().enumerate().take(components.len() - 1) {
        prefix.push(part);
        if i > 0 && base.join(&prefix).is_file() {
            return Some(components[..=i].join("/"));
        }
    }

    // A file stored below `name` used as a directory.
    let dir = base.join(name);
    if dir.is_dir() {
        return WalkDir::new(&dir)
            .into_iter()
            .filter_map(Result::ok)
            .find(|e| e.file_type().is_file() && !is_lock_file(e.path()))
            .and_then(|e| e.path().strip_prefix(base).ok().map(path_to_name));
    }
    None
}

fn is_lock_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "lock")
}

fn path_to_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl RefStore for FileRefStore {
    fn read_ref(&self, name: &str) -> RefResult<Option<Ref>> {
        validate_ref_name(name)?;
        self.read_ref_file(name)
    }

    fn compare_and_update(
        &self,
        name: &str,
        expected_old: &ObjectId,
        new_id: &ObjectId,
        who: &PersonIdent,
        message: &str,
    ) -> RefResult<Ref> {
        validate_ref_name(name)?;
        if new_id.is_null() {
            return Err(RefError::NullTarget {
                name: name.to_string(),
            });
        }

        let path = self.ref_path(name);
        if !path.is_file() {
            if let Some(existing) = self.conflict(name) {
                return Err(RefError::NameConflict {
                    name: name.to_string(),
                    existing,
                });
            }
            if path.is_dir() {
                // Emptied by an earlier delete; only succeeds if empty.
                fs::remove_dir(&path)?;
            }
        }

        let lock = RefLock::acquire(name, &path, self.lock_timeout)?;
        let current = self.read_ref_file(name)?;
        check_expected(name, current.as_ref(), expected_old)?;

        let updated = match &current {
            Some(existing) => existing.advanced(*new_id),
            None => Ref::new(name, *new_id, 1),
        };

        self.commit_logged(
            name,
            lock,
            format!("{} {}\n", updated.target, updated.generation).as_bytes(),
            &ReflogEntry::new(*expected_old, *new_id, who.clone(), message),
        )?;

        info!(
            ref_name = name,
            new_target = %new_id.short_hex(),
            generation = updated.generation,
            "ref updated"
        );
        Ok(updated)
    }

    fn delete(
        &self,
        name: &str,
        expected_old: &ObjectId,
        who: &PersonIdent,
        message: &str,
    ) -> RefResult<()> {
        validate_ref_name(name)?;
        let path = self.ref_path(name);
        if !path.is_file() {
            return Err(RefError::NotFound {
                name: name.to_string(),
            });
        }

        let lock = RefLock::acquire(name, &path, self.lock_timeout)?;
        let Some(current) = self.read_ref_file(name)? else {
            return Err(RefError::NotFound {
                name: name.to_string(),
            });
        };
        check_expected(name, Some(&current), expected_old)?;

        fs::remove_file(&path)?;
        sync_parent(&path)?;
        drop(lock);
        self.append_log(
            name,
            &ReflogEntry::new(*expected_old, ObjectId::null(), who.clone(), message),
        )?;
        self.prune_empty_parents(&path);

        info!(ref_name = name, "ref deleted");
        Ok(())
    }

    fn read_reflog(&self, name: &str) -> RefResult<Vec<ReflogEntry>> {
        validate_ref_name(name)?;
        let content = match fs::read_to_string(self.log_path(name)) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| ReflogEntry::parse_line(name, l))
            .collect()
    }

    fn list_refs(&self, prefix: &str) -> RefResult<Vec<Ref>> {
        let mut refs = Vec::new();
        for entry in WalkDir::new(self.root.join("refs")).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() || is_lock_file(entry.path()) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let name = path_to_name(rel);
            if !name.starts_with(prefix) {
                continue;
            }
            // Deleted between the walk and the read.
            if let Some(r) = self.read_ref_file(&name)? {
                refs.push(r);
            }
        }
        refs.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(prefix, count = refs.len(), "listed refs");
        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use tempfile::TempDir;

    fn oid(b: u8) -> ObjectId {
        ObjectId::from_hash([b; 32])
    }

    fn who() -> PersonIdent {
        PersonIdent::new("A U Thor", "author@example.com", 1_700_000_000, 120)
    }

    fn null() -> ObjectId {
        ObjectId::null()
    }

    fn store() -> (TempDir, FileRefStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRefStore::open(dir.path()).unwrap();
        (dir, store)
    }

    // ---- persisted layout ----

    #[test]
    fn ref_file_layout() {
        let (dir, store) = store();
        store
            .compare_and_update("refs/heads/main", &null(), &oid(1), &who(), "commit (initial): a")
            .unwrap();
        let content = fs::read_to_string(dir.path().join("refs/heads/main")).unwrap();
        assert_eq!(content, format!("{} 1\n", oid(1)));
        assert!(!dir.path().join("refs/heads/main.lock").exists());

        let log = fs::read_to_string(dir.path().join("logs/refs/heads/main")).unwrap();
        assert_eq!(
            log,
            format!(
                "{} {} A U Thor <author@example.com> 1700000000 +0200\tcommit (initial): a\n",
                null(),
                oid(1)
            )
        );
    }

    #[test]
    fn survives_reopen() {
        let (dir, store) = store();
        store
            .compare_and_update("refs/heads/main", &null(), &oid(1), &who(), "one")
            .unwrap();
        store
            .compare_and_update("refs/heads/main", &oid(1), &oid(2), &who(), "two")
            .unwrap();

        let reopened = FileRefStore::open(dir.path()).unwrap();
        let r = reopened.get("refs/heads/main").unwrap();
        assert_eq!((r.target, r.generation), (oid(2), 2));
        let log = reopened.read_reflog("refs/heads/main").unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].message, "two");
        assert_eq!(log[1].who, who());
    }

    // ---- compare-and-swap ----

    #[test]
    fn stale_update_changes_nothing() {
        let (dir, store) = store();
        store
            .compare_and_update("refs/heads/main", &null(), &oid(1), &who(), "")
            .unwrap();
        assert!(matches!(
            store.compare_and_update("refs/heads/main", &oid(3), &oid(2), &who(), ""),
            Err(RefError::Stale { .. })
        ));
        assert_eq!(store.get("refs/heads/main").unwrap().target, oid(1));
        assert_eq!(store.read_reflog("refs/heads/main").unwrap().len(), 1);
        assert!(!dir.path().join("refs/heads/main.lock").exists());
    }

    #[test]
    fn concurrent_creates_have_one_winner() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let threads = 6;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let store = store.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    store.compare_and_update("refs/stash", &null(), &oid(i as u8 + 1), &who(), "")
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, RefError::Stale { .. })));
        assert_eq!(store.read_reflog("refs/stash").unwrap().len(), 1);
    }

    #[test]
    fn held_lock_times_out() {
        let (dir, store) = store();
        let store = store.with_lock_timeout(Duration::from_millis(30));
        fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        fs::write(dir.path().join("refs/heads/main.lock"), b"").unwrap();

        assert!(matches!(
            store.compare_and_update("refs/heads/main", &null(), &oid(1), &who(), ""),
            Err(RefError::LockTimeout { .. })
        ));
        // The foreign lock file is not ours to remove.
        assert!(dir.path().join("refs/heads/main.lock").exists());
    }

    #[test]
    fn malformed_ref_file() {
        let (dir, store) = store();
        fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        fs::write(dir.path().join("refs/heads/main"), b"not a ref").unwrap();
        assert!(matches!(
            store.read_ref("refs/heads/main"),
            Err(RefError::Malformed { .. })
        ));
    }

    // ---- delete ----

    #[test]
    fn delete_keeps_log_and_prunes_dirs() {
        let (dir, store) = store();
        store
            .compare_and_update("refs/heads/feature/x", &null(), &oid(1), &who(), "create")
            .unwrap();
        store
            .delete("refs/heads/feature/x", &oid(1), &who(), "branch: deleted")
            .unwrap();

        assert!(store.read_ref("refs/heads/feature/x").unwrap().is_none());
        assert!(!dir.path().join("refs/heads/feature").exists());
        let log = store.read_reflog("refs/heads/feature/x").unwrap();
        assert_eq!(log.len(), 2);
        assert!(log[1].is_deletion());

        assert!(matches!(
            store.delete("refs/heads/feature/x", &oid(1), &who(), ""),
            Err(RefError::NotFound { .. })
        ));
    }

    #[test]
    fn deletes_race_with_sibling_creates() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let rounds = 200;

        let churn = {
            let store = store.clone();
            std::thread::spawn(move || -> RefResult<()> {
                for _ in 0..rounds {
                    store.compare_and_update("refs/x/a", &null(), &oid(1), &who(), "")?;
                    store.delete("refs/x/a", &oid(1), &who(), "")?;
                }
                Ok(())
            })
        };
        for i in 0..rounds {
            let name = format!("refs/x/b{i}");
            store
                .compare_and_update(&name, &null(), &oid(2), &who(), "")
                .unwrap();
            store.delete(&name, &oid(2), &who(), "").unwrap();
        }
        churn.join().unwrap().unwrap();
        assert!(store.list_refs("refs/x/").unwrap().is_empty());
    }

    // ---- failed updates ----

    #[test]
    fn failed_rename_leaves_reflog_untouched() {
        let (dir, store) = store();
        store
            .compare_and_update("refs/heads/main", &null(), &oid(1), &who(), "one")
            .unwrap();
        let path = dir.path().join("refs/heads/topic");
        let lock = RefLock::acquire("refs/heads/topic", &path, Duration::from_secs(1)).unwrap();
        // A non-empty directory where the ref should land makes the rename fail.
        fs::create_dir_all(path.join("blocker")).unwrap();

        let entry = ReflogEntry::new(null(), oid(2), who(), "two");
        assert!(store
            .commit_logged("refs/heads/topic", lock, b"x 1\n", &entry)
            .is_err());
        assert!(store.read_reflog("refs/heads/topic").unwrap().is_empty());
        assert!(!dir.path().join("refs/heads/topic.lock").exists());
        assert!(!dir.path().join("logs/refs/heads/topic").exists());
    }

    #[test]
    fn blocked_ref_path_changes_nothing() {
        let (dir, store) = store();
        fs::create_dir_all(dir.path().join("refs/heads/main/sub")).unwrap();
        assert!(store
            .compare_and_update("refs/heads/main", &null(), &oid(1), &who(), "one")
            .is_err());
        assert!(store.read_reflog("refs/heads/main").unwrap().is_empty());
    }

    // ---- listing / names ----

    #[test]
    fn list_skips_locks_and_filters_prefix() {
        let (dir, store) = store();
        for name in ["refs/heads/b", "refs/heads/a/x", "refs/tags/v1"] {
            store
                .compare_and_update(name, &null(), &oid(1), &who(), "")
                .unwrap();
        }
        fs::write(dir.path().join("refs/heads/c.lock"), b"").unwrap();

        let names: Vec<String> = store
            .list_refs("refs/heads/")
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["refs/heads/a/x", "refs/heads/b"]);
        assert_eq!(store.list_refs("").unwrap().len(), 3);
    }

    #[test]
    fn nested_names_conflict_both_ways() {
        let (_dir, store) = store();
        store
            .compare_and_update("refs/heads/a", &null(), &oid(1), &who(), "")
            .unwrap();
        store
            .compare_and_update("refs/heads/b/c", &null(), &oid(1), &who(), "")
            .unwrap();

        match store.compare_and_update("refs/heads/a/b", &null(), &oid(1), &who(), "") {
            Err(RefError::NameConflict { existing, .. }) => assert_eq!(existing, "refs/heads/a"),
            other => panic!("unexpected: {other:?}"),
        }
        match store.compare_and_update("refs/heads/b", &null(), &oid(1), &who(), "") {
            Err(RefError::NameConflict { existing, .. }) => assert_eq!(existing, "refs/heads/b/c"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn invalid_names_never_touch_disk() {
        let (_dir, store) = store();
        assert!(matches!(
            store.compare_and_update("refs/../escape", &null(), &oid(1), &who(), ""),
            Err(RefError::InvalidName { .. })
        ));
        assert!(store.read_ref("../../etc/passwd").is_err());
    }
}
