//! The [`RefStore`] trait defining the reference storage interface.

use grove_types::{ObjectId, PersonIdent};

use crate::error::{RefError, RefResult};
use crate::types::{Ref, ReflogEntry};

/// Storage backend for named references.
///
/// Implementations must be thread-safe (`Send + Sync`). Updates to one name
/// are serialized by a per-name lock with a bounded wait; of several
/// concurrent updates expecting the same old value, exactly one succeeds and
/// the rest fail with [`RefError::Stale`].
///
/// The null id stands for "absent" in every `expected_old` argument and in
/// reflog entries.
pub trait RefStore: Send + Sync {
    /// Read a ref by its full name. `Ok(None)` if it does not exist.
    fn read_ref(&self, name: &str) -> RefResult<Option<Ref>>;

    /// Point `name` at `new_id`, provided it currently points at
    /// `expected_old` (null: provided it does not exist).
    ///
    /// On success a reflog entry `expected_old -> new_id` is appended and the
    /// new value returned.
    fn compare_and_update(
        &self,
        name: &str,
        expected_old: &ObjectId,
        new_id: &ObjectId,
        who: &PersonIdent,
        message: &str,
    ) -> RefResult<Ref>;

    /// Remove `name`, provided it currently points at `expected_old`.
    ///
    /// Appends a reflog entry whose new id is null. The reflog itself is
    /// kept.
    fn delete(
        &self,
        name: &str,
        expected_old: &ObjectId,
        who: &PersonIdent,
        message: &str,
    ) -> RefResult<()>;

    /// Every recorded change of `name`, oldest first. Empty if the name was
    /// never written.
    fn read_reflog(&self, name: &str) -> RefResult<Vec<ReflogEntry>>;

    /// All refs whose full name starts with `prefix`, sorted by name.
    fn list_refs(&self, prefix: &str) -> RefResult<Vec<Ref>>;

    /// Like [`read_ref`](Self::read_ref), but absence is an error.
    fn get(&self, name: &str) -> RefResult<Ref> {
        self.read_ref(name)?.ok_or_else(|| RefError::NotFound {
            name: name.to_string(),
        })
    }

    /// The id `name` points at, or null when absent. This is the value to
    /// pass as `expected_old` for an unconditional-looking update that is
    /// still race-checked.
    fn current_target(&self, name: &str) -> RefResult<ObjectId> {
        Ok(self
            .read_ref(name)?
            .map(|r| r.target)
            .unwrap_or_else(ObjectId::null))
    }
}

/// Fail with [`RefError::Stale`] unless `current` matches `expected_old`.
pub(crate) fn check_expected(
    name: &str,
    current: Option<&Ref>,
    expected_old: &ObjectId,
) -> RefResult<()> {
    let actual = current.map(|r| r.target).unwrap_or_else(ObjectId::null);
    if actual != *expected_old {
        return Err(RefError::Stale {
            name: name.to_string(),
            expected: *expected_old,
            actual,
        });
    }
    Ok(())
}
