use std::cmp::Ordering;

use grove_types::object::OBJECT_ID_LEN;
use grove_types::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoredObject};

/// File mode for a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Normal file (0o100644).
    Regular,
    /// Executable file (0o100755).
    Executable,
    /// Symbolic link (0o120000).
    Symlink,
    /// Submodule commit reference (0o160000).
    Gitlink,
    /// Subtree / directory (0o040000).
    Directory,
}

impl EntryMode {
    /// Octal mode value (for display/serialization).
    pub fn mode_bits(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Gitlink => 0o160000,
            Self::Directory => 0o040000,
        }
    }

    /// Parse from an octal mode value.
    pub fn from_mode_bits(bits: u32) -> Option<Self> {
        match bits {
            0o100644 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o160000 => Some(Self::Gitlink),
            0o040000 => Some(Self::Directory),
            _ => None,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory)
    }

    /// Kind of object an entry with this mode points at.
    pub fn object_kind(&self) -> ObjectKind {
        match self {
            Self::Directory => ObjectKind::Tree,
            Self::Gitlink => ObjectKind::Commit,
            _ => ObjectKind::Blob,
        }
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06o}", self.mode_bits())
    }
}

/// Canonical ordering of tree entries.
///
/// Names compare bytewise, except that a directory name sorts as if it
/// carried a trailing `/`. A file `a` and a directory `a` therefore never
/// compare equal, and `a` < `a.txt` < `a/` < `a0`.
///
/// Encoding, walking and diffing all use this one function.
pub fn tree_order(a: &[u8], a_is_dir: bool, b: &[u8], b_is_dir: bool) -> Ordering {
    let len = a.len().min(b.len());
    match a[..len].cmp(&b[..len]) {
        Ordering::Equal => {}
        other => return other,
    }
    let tail = |name: &[u8], is_dir: bool| match name.get(len) {
        Some(&c) => c,
        None if is_dir => b'/',
        None => 0,
    };
    tail(a, a_is_dir).cmp(&tail(b, b_is_dir))
}

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// File mode (regular, executable, symlink, gitlink, directory).
    pub mode: EntryMode,
    /// Entry name (single path component).
    pub name: String,
    /// Content-addressed ID of the referenced object.
    pub object_id: ObjectId,
}

impl TreeEntry {
    /// Create a new tree entry.
    pub fn new(mode: EntryMode, name: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            object_id,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        tree_order(
            self.name.as_bytes(),
            self.is_dir(),
            other.name.as_bytes(),
            other.is_dir(),
        )
        .then_with(|| self.mode.mode_bits().cmp(&other.mode.mode_bits()))
        .then_with(|| self.object_id.cmp(&other.object_id))
    }
}

/// Check that `name` is usable as a single path component.
pub(crate) fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("empty entry name".into());
    }
    if name == "." || name == ".." {
        return Err(format!("reserved entry name {name:?}"));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(format!("entry name {name:?} contains '/' or NUL"));
    }
    Ok(())
}

/// Directory listing object (analogous to git tree).
///
/// Binary encoding, one record per entry in [`tree_order`]:
///
/// ```text
/// <octal mode, no leading zeros> SP <name> NUL <32-byte raw id>
/// ```
///
/// Decoding is strict: out-of-order or duplicate names, unknown or
/// non-canonical modes, invalid names and truncated records are rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    /// Sorted entries in this directory.
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Create a new tree with the given entries, sorted canonically.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort();
        Self { entries }
    }

    /// Create an empty tree.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Serialize to the canonical binary form.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.entries.len() * 48);
        for (i, entry) in self.entries.iter().enumerate() {
            validate_name(&entry.name).map_err(StoreError::MalformedTree)?;
            if i > 0 {
                let prev = &self.entries[i - 1];
                check_order(prev, entry)?;
            }
            out.extend_from_slice(format!("{:o} ", entry.mode.mode_bits()).as_bytes());
            out.extend_from_slice(entry.name.as_bytes());
            out.push(0);
            out.extend_from_slice(entry.object_id.as_bytes());
        }
        Ok(out)
    }

    /// Parse the canonical binary form.
    pub fn decode(mut data: &[u8]) -> StoreResult<Self> {
        let bad = |reason: String| StoreError::MalformedTree(reason);
        let mut entries: Vec<TreeEntry> = Vec::new();

        while !data.is_empty() {
            let space = data
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| bad("truncated entry mode".into()))?;
            let mode_text = std::str::from_utf8(&data[..space])
                .map_err(|_| bad("mode is not ASCII".into()))?;
            let bits = u32::from_str_radix(mode_text, 8)
                .map_err(|_| bad(format!("invalid mode {mode_text:?}")))?;
            let mode = EntryMode::from_mode_bits(bits)
                .ok_or_else(|| bad(format!("unknown mode {mode_text}")))?;
            if format!("{bits:o}") != mode_text {
                return Err(bad(format!("non-canonical mode {mode_text:?}")));
            }
            data = &data[space + 1..];

            let nul = data
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| bad("truncated entry name".into()))?;
            let name = std::str::from_utf8(&data[..nul])
                .map_err(|_| bad("entry name is not UTF-8".into()))?;
            validate_name(name).map_err(bad)?;
            data = &data[nul + 1..];

            if data.len() < OBJECT_ID_LEN {
                return Err(bad(format!("truncated id for entry {name:?}")));
            }
            let object_id = ObjectId::from_slice(&data[..OBJECT_ID_LEN])
                .map_err(|e| bad(e.to_string()))?;
            data = &data[OBJECT_ID_LEN..];

            let entry = TreeEntry::new(mode, name, object_id);
            if let Some(prev) = entries.last() {
                check_order(prev, &entry)?;
            }
            entries.push(entry);
        }

        Ok(Self { entries })
    }

    /// Convert into a `StoredObject` for storage.
    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        Ok(StoredObject::new(ObjectKind::Tree, self.encode()?))
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Tree)?;
        Self::decode(&obj.data)
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn check_order(prev: &TreeEntry, next: &TreeEntry) -> StoreResult<()> {
    let ord = tree_order(
        prev.name.as_bytes(),
        prev.is_dir(),
        next.name.as_bytes(),
        next.is_dir(),
    );
    match ord {
        Ordering::Less => Ok(()),
        Ordering::Equal => Err(StoreError::MalformedTree(format!(
            "duplicate entry {:?}",
            next.name
        ))),
        Ordering::Greater => Err(StoreError::MalformedTree(format!(
            "entry {:?} sorts before {:?}",
            next.name, prev.name
        ))),
    }
}
