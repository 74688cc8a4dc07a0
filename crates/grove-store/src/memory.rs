use std::collections::HashMap;
use std::sync::RwLock;

use grove_types::ObjectId;
use tracing::warn;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. All objects are held in memory behind a
/// `RwLock` for safe concurrent access. Objects are cloned on read/write.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, StoredObject>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|obj| obj.size)
            .sum()
    }

    /// Return a sorted list of all object IDs in the store.
    pub fn all_ids(&self) -> Vec<ObjectId> {
        let map = self.objects.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Store `object` under an arbitrary key, bypassing hashing.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, id: ObjectId, object: StoredObject) {
        self.objects.write().expect("lock poisoned").insert(id, object);
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn try_read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let map = self.objects.read().expect("lock poisoned");
        let Some(obj) = map.get(id) else {
            return Ok(None);
        };
        let computed = obj.compute_id();
        if computed != *id {
            warn!(object = %id.short_hex(), computed = %computed.short_hex(), "hash mismatch");
            return Err(StoreError::HashMismatch { id: *id, computed });
        }
        Ok(Some(obj.clone()))
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        let mut map = self.objects.write().expect("lock poisoned");
        // Same ID always maps to the same content, so an existing entry wins.
        map.entry(id).or_insert_with(|| object.clone());
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &count)
            .finish()
    }
}
