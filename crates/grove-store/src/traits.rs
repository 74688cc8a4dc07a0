use grove_types::ObjectId;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::{Blob, Commit, Object, ObjectKind, StoredObject, Tag};
use crate::tree::{EntryMode, Tree};

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written. Content-addressing guarantees this:
///   the same data always produces the same ID.
/// - Writing an object that already exists is a no-op returning the same ID.
/// - Reads verify the content hash and report [`StoreError::HashMismatch`]
///   instead of returning corrupt bytes.
/// - Concurrent reads are always safe (objects are immutable).
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read an object by its content-addressed ID.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    /// Returns `Err` on I/O failure or data corruption.
    fn try_read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content-addressed ID.
    ///
    /// If the object already exists, this is a no-op (idempotent).
    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Check whether an object exists in the store.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Read an object that must exist.
    fn read(&self, id: &ObjectId) -> StoreResult<StoredObject> {
        self.try_read(id)?.ok_or(StoreError::NotFound(*id))
    }

    /// Read multiple objects in a batch.
    ///
    /// Default implementation calls `try_read()` for each ID.
    fn read_batch(&self, ids: &[ObjectId]) -> StoreResult<Vec<Option<StoredObject>>> {
        ids.iter().map(|id| self.try_read(id)).collect()
    }

    /// Write multiple objects in a batch and return their IDs.
    ///
    /// Default implementation calls `write()` for each object, in order, so
    /// children listed before their parents are linked correctly.
    fn write_batch(&self, objects: &[StoredObject]) -> StoreResult<Vec<ObjectId>> {
        objects.iter().map(|obj| self.write(obj)).collect()
    }
}

/// Typed reads and writes on top of any [`ObjectStore`].
///
/// Tree, commit and tag writes check that every object they reference is
/// already present, so a store populated only through these methods never
/// holds a dangling link. Gitlink entries are exempt: they name commits in
/// another repository.
pub trait ObjectStoreExt: ObjectStore {
    fn write_blob(&self, data: &[u8]) -> StoreResult<ObjectId> {
        self.write(&Blob::new(data.to_vec()).to_stored_object())
    }

    fn read_blob(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        Ok(Blob::from_stored_object(&self.read(id)?)?.data)
    }

    fn write_tree(&self, tree: &Tree) -> StoreResult<ObjectId> {
        for entry in &tree.entries {
            if entry.mode != EntryMode::Gitlink {
                self.require(ObjectKind::Tree, &entry.object_id)?;
            }
        }
        let id = self.write(&tree.to_stored_object()?)?;
        debug!(tree = %id.short_hex(), entries = tree.len(), "wrote tree");
        Ok(id)
    }

    fn read_tree(&self, id: &ObjectId) -> StoreResult<Tree> {
        Tree::from_stored_object(&self.read(id)?)
    }

    fn write_commit(&self, commit: &Commit) -> StoreResult<ObjectId> {
        self.require(ObjectKind::Commit, &commit.tree)?;
        for parent in &commit.parents {
            self.require(ObjectKind::Commit, parent)?;
        }
        let id = self.write(&commit.to_stored_object()?)?;
        debug!(
            commit = %id.short_hex(),
            parents = commit.parents.len(),
            "wrote commit"
        );
        Ok(id)
    }

    fn read_commit(&self, id: &ObjectId) -> StoreResult<Commit> {
        Commit::from_stored_object(&self.read(id)?)
    }

    fn write_tag(&self, tag: &Tag) -> StoreResult<ObjectId> {
        self.require(ObjectKind::Tag, &tag.object)?;
        self.write(&tag.to_stored_object()?)
    }

    fn read_tag(&self, id: &ObjectId) -> StoreResult<Tag> {
        Tag::from_stored_object(&self.read(id)?)
    }

    /// Read and decode an object of any kind.
    fn read_object(&self, id: &ObjectId) -> StoreResult<Object> {
        Object::from_stored_object(&self.read(id)?)
    }

    #[doc(hidden)]
    fn require(&self, kind: ObjectKind, missing: &ObjectId) -> StoreResult<()> {
        if self.exists(missing)? {
            Ok(())
        } else {
            Err(StoreError::Dangling {
                kind,
                missing: *missing,
            })
        }
    }
}

impl<S: ObjectStore + ?Sized> ObjectStoreExt for S {}
