//! In-memory reference store for testing and ephemeral use.
//!
//! [`InMemoryRefStore`] keeps refs and reflogs in maps behind `RwLock`s and
//! serializes updates with a table of per-name mutexes, so it honours the
//! same locking and compare-and-swap contract as the file backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock, TryLockError};
use std::time::Duration;

use grove_types::{ObjectId, PersonIdent};
use tracing::info;

use crate::error::{RefError, RefResult};
use crate::lock::{acquire, DEFAULT_LOCK_TIMEOUT};
use crate::names::{nests, validate_ref_name};
use crate::traits::{check_expected, RefStore};
use crate::types::{Ref, ReflogEntry};

/// An in-memory implementation of [`RefStore`].
///
/// Data is lost when the store is dropped.
#[derive(Debug)]
pub struct InMemoryRefStore {
    refs: RwLock<BTreeMap<String, Ref>>,
    logs: RwLock<HashMap<String, Vec<ReflogEntry>>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    lock_timeout: Duration,
}

impl InMemoryRefStore {
    /// Create a new empty ref store.
    pub fn new() -> Self {
        Self {
            refs: RwLock::new(BTreeMap::new()),
            logs: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// The mutex guarding updates of `name`, created on first use.
    fn slot(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock poisoned");
        locks.entry(name.to_string()).or_default().clone()
    }

    /// Run `update` while holding the per-name lock of `name`.
    fn locked<T>(&self, name: &str, update: impl FnOnce() -> RefResult<T>) -> RefResult<T> {
        let slot = self.slot(name);
        let _guard = acquire(name, self.lock_timeout, || match slot.try_lock() {
            Ok(guard) => Ok(Some(guard)),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Poisoned(p)) => Ok(Some(p.into_inner())),
        })?;
        update()
    }

    /// A live ref or a retained reflog whose name nests with `name`.
    fn conflict(&self, refs: &BTreeMap<String, Ref>, name: &str) -> Option<String> {
        let logs = self.logs.read().expect("lock poisoned");
        refs.keys()
            .chain(logs.keys())
            .find(|other| nests(other, name))
            .cloned()
    }

    fn append_log(&self, name: &str, entry: ReflogEntry) {
        let mut logs = self.logs.write().expect("lock poisoned");
        logs.entry(name.to_string()).or_default().push(entry);
    }
}

impl Default for InMemoryRefStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RefStore for InMemoryRefStore {
    fn read_ref(&self, name: &str) -> RefResult<Option<Ref>> {
        validate_ref_name(name)?;
        let refs = self.refs.read().expect("lock poisoned");
        Ok(refs.get(name).cloned())
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

        self.locked(name, || {
            let mut refs = self.refs.write().expect("lock poisoned");
            let current = refs.get(name);
            check_expected(name, current, expected_old)?;

            let updated = match current {
                Some(existing) => existing.advanced(*new_id),
                None => {
                    if let Some(existing) = self.conflict(&refs, name) {
                        return Err(RefError::NameConflict {
                            name: name.to_string(),
                            existing,
                        });
                    }
                    Ref::new(name, *new_id, 1)
                }
            };

            self.append_log(
                name,
                ReflogEntry::new(*expected_old, *new_id, who.clone(), message),
            );
            refs.insert(name.to_string(), updated.clone());
            info!(
                ref_name = name,
                new_target = %new_id.short_hex(),
                generation = updated.generation,
                "ref updated"
            );
            Ok(updated)
        })
    }

    fn delete(
        &self,
        name: &str,
        expected_old: &ObjectId,
        who: &PersonIdent,
        message: &str,
    ) -> RefResult<()> {
        validate_ref_name(name)?;
        self.locked(name, || {
            let mut refs = self.refs.write().expect("lock poisoned");
            let Some(current) = refs.get(name) else {
                return Err(RefError::NotFound {
                    name: name.to_string(),
                });
            };
            check_expected(name, Some(current), expected_old)?;

            self.append_log(
                name,
                ReflogEntry::new(*expected_old, ObjectId::null(), who.clone(), message),
            );
            refs.remove(name);
            info!(ref_name = name, "ref deleted");
            Ok(())
        })
    }

    fn read_reflog(&self, name: &str) -> RefResult<Vec<ReflogEntry>> {
        validate_ref_name(name)?;
        let logs = self.logs.read().expect("lock poisoned");
        Ok(logs.get(name).cloned().unwrap_or_default())
    }

    fn list_refs(&self, prefix: &str) -> RefResult<Vec<Ref>> {
        let refs = self.refs.read().expect("lock poisoned");
        Ok(refs
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(_, r)| r.clone())
            .collect())
    }
}
