use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use grove_types::ObjectId;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::ObjectStore;

const FORMAT_RAW: u8 = 0;
const FORMAT_ZSTD: u8 = 1;

/// Tuning for [`LooseObjectStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LooseConfig {
    /// Canonical encodings at least this large are zstd-compressed.
    pub compress_threshold: usize,
    /// zstd compression level.
    pub compression_level: i32,
    /// fsync object files and their directories before returning.
    pub fsync: bool,
}

impl Default for LooseConfig {
    fn default() -> Self {
        Self {
            compress_threshold: 512,
            compression_level: 3,
            fsync: true,
        }
    }
}

/// File-per-object store.
///
/// Layout under the root directory:
///
/// ```text
/// objects/ab/cdef0123...   one file per object, fanned out by the first byte
/// tmp/                     staging area for atomic writes
/// ```
///
/// Each file holds one format byte (`0` raw, `1` zstd) followed by the
/// (possibly compressed) canonical encoding. Writes go to `tmp/`, are
/// fsynced, then renamed into place, so a reader never sees a partial object.
#[derive(Debug)]
pub struct LooseObjectStore {
    root: PathBuf,
    config: LooseConfig,
}

impl LooseObjectStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, config: LooseConfig) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("objects"))?;
        fs::create_dir_all(root.join("tmp"))?;
        debug!(root = %root.display(), "opened loose object store");
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &LooseConfig {
        &self.config
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let (dir, file) = id.to_path_components();
        self.objects_dir().join(dir).join(file)
    }

    /// Count objects on disk.
    pub fn object_count(&self) -> StoreResult<usize> {
        let mut count = 0;
        for entry in WalkDir::new(self.objects_dir()).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|e| {
                e.into_io_error()
                    .unwrap_or_else(|| io::Error::other("directory walk failed"))
            })?;
            if entry.file_type().is_file() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn encode(&self, object: &StoredObject) -> StoreResult<Vec<u8>> {
        let canonical = object.to_canonical();
        if canonical.len() >= self.config.compress_threshold {
            let compressed =
                zstd::encode_all(canonical.as_slice(), self.config.compression_level)?;
            let mut out = Vec::with_capacity(compressed.len() + 1);
            out.push(FORMAT_ZSTD);
            out.extend_from_slice(&compressed);
            Ok(out)
        } else {
            let mut out = Vec::with_capacity(canonical.len() + 1);
            out.push(FORMAT_RAW);
            out.extend_from_slice(&canonical);
            Ok(out)
        }
    }

    fn decode(bytes: &[u8]) -> StoreResult<StoredObject> {
        let (format, payload) = bytes.split_first().ok_or_else(|| StoreError::Malformed {
            kind: "object",
            reason: "empty object file".into(),
        })?;
        match *format {
            FORMAT_RAW => StoredObject::from_canonical(payload),
            FORMAT_ZSTD => StoredObject::from_canonical(&zstd::decode_all(payload)?),
            other => Err(StoreError::Malformed {
                kind: "object",
                reason: format!("unknown storage format {other}"),
            }),
        }
    }
}

fn fsync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

impl ObjectStore for LooseObjectStore {
    fn try_read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let path = self.object_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let object = Self::decode(&bytes)?;
        let computed = object.compute_id();
        if computed != *id {
            warn!(
                object = %id.short_hex(),
                computed = %computed.short_hex(),
                path = %path.display(),
                "hash mismatch"
            );
            return Err(StoreError::HashMismatch { id: *id, computed });
        }
        Ok(Some(object))
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        let path = self.object_path(&id);
        if path.exists() {
            return Ok(id);
        }

        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.objects_dir());
        fs::create_dir_all(&dir)?;

        // temp -> fsync -> rename -> fsync dir
        let bytes = self.encode(object)?;
        let mut tmp = NamedTempFile::new_in(self.root.join("tmp"))?;
        tmp.write_all(&bytes)?;
        if self.config.fsync {
            tmp.as_file().sync_all()?;
        }
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        if self.config.fsync {
            fsync_dir(&dir)?;
        }

        debug!(
            object = %id.short_hex(),
            kind = %object.kind,
            size = object.size,
            stored = bytes.len(),
            "wrote loose object"
        );
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        match fs::metadata(self.object_path(id)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Blob, ObjectKind};
    use crate::traits::ObjectStoreExt;
    use crate::tree::{EntryMode, Tree, TreeEntry};
    use tempfile::tempdir;

    fn store_in(dir: &Path, threshold: usize) -> LooseObjectStore {
        let config = LooseConfig {
            compress_threshold: threshold,
            ..LooseConfig::default()
        };
        LooseObjectStore::open(dir, config).unwrap()
    }

    #[test]
    fn write_read_uncompressed() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 1 << 20);
        let id = store.write_blob(b"small").unwrap();

        let raw = fs::read(store.object_path(&id)).unwrap();
        assert_eq!(raw[0], FORMAT_RAW);
        assert_eq!(&raw[1..], b"blob 5\0small");
        assert_eq!(store.read_blob(&id).unwrap(), b"small");
    }

    #[test]
    fn write_read_compressed() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 16);
        let data = vec![b'z'; 10_000];
        let id = store.write_blob(&data).unwrap();

        let raw = fs::read(store.object_path(&id)).unwrap();
        assert_eq!(raw[0], FORMAT_ZSTD);
        assert!(raw.len() < data.len());
        assert_eq!(store.read_blob(&id).unwrap(), data);
    }

    #[test]
    fn compression_does_not_change_id() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        let data = vec![7u8; 4096];
        let raw_id = store_in(a.path(), usize::MAX).write_blob(&data).unwrap();
        let zstd_id = store_in(b.path(), 0).write_blob(&data).unwrap();
        assert_eq!(raw_id, zstd_id);
    }

    #[test]
    fn idempotent_and_counted() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 512);
        let a = store.write_blob(b"one").unwrap();
        let b = store.write_blob(b"one").unwrap();
        store.write_blob(b"two").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.object_count().unwrap(), 2);
    }

    #[test]
    fn missing_and_exists() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 512);
        let id = ObjectId::from_bytes(b"absent");
        assert!(!store.exists(&id).unwrap());
        assert!(store.try_read(&id).unwrap().is_none());
        assert!(matches!(store.read(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn tampered_file_is_hash_mismatch() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 1 << 20);
        let id = store.write_blob(b"genuine").unwrap();
        fs::write(store.object_path(&id), b"\0blob 7\0forgery").unwrap();
        assert!(matches!(
            store.try_read(&id),
            Err(StoreError::HashMismatch { .. })
        ));
    }

    #[test]
    fn garbage_file_is_malformed() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 1 << 20);
        let id = store.write_blob(b"x").unwrap();
        fs::write(store.object_path(&id), b"\x09junk").unwrap();
        assert!(matches!(
            store.try_read(&id),
            Err(StoreError::Malformed { .. })
        ));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        let blob;
        let tree_id;
        {
            let store = store_in(dir.path(), 64);
            blob = store.write_blob(b"persisted").unwrap();
            tree_id = store
                .write_tree(&Tree::new(vec![TreeEntry::new(
                    EntryMode::Regular,
                    "file",
                    blob,
                )]))
                .unwrap();
        }
        let store = store_in(dir.path(), 64);
        let tree = store.read_tree(&tree_id).unwrap();
        assert_eq!(tree.get("file").unwrap().object_id, blob);
        let obj = store.read(&blob).unwrap();
        assert_eq!(obj.kind, ObjectKind::Blob);
        assert_eq!(Blob::from_stored_object(&obj).unwrap().data, b"persisted");
    }

    #[test]
    fn tmp_dir_is_left_empty() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 512);
        store.write_blob(b"staged").unwrap();
        assert_eq!(fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }
}
