use grove_types::ObjectId;

/// Header-framed BLAKE3 content hasher.
///
/// Each hasher carries the kind tag of the objects it hashes (`"blob"`,
/// `"tree"`, ...). The tag and the body length are hashed ahead of the body,
/// so the id commits to both the kind and the exact byte count:
///
/// ```text
/// blake3("<tag> <decimal length>\0" ++ body)
/// ```
pub struct ContentHasher {
    tag: &'static str,
}

impl ContentHasher {
    /// Hasher for blob objects.
    pub const BLOB: Self = Self { tag: "blob" };
    /// Hasher for tree objects.
    pub const TREE: Self = Self { tag: "tree" };
    /// Hasher for commit objects.
    pub const COMMIT: Self = Self { tag: "commit" };
    /// Hasher for annotated tag objects.
    pub const TAG: Self = Self { tag: "tag" };

    /// Create a hasher with a custom kind tag.
    pub const fn new(tag: &'static str) -> Self {
        Self { tag }
    }

    /// The canonical header that precedes the body.
    pub fn header(&self, len: usize) -> Vec<u8> {
        format!("{} {}\0", self.tag, len).into_bytes()
    }

    /// Hash a complete body.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = self.streaming(data.len() as u64);
        hasher.update(data);
        hasher.finalize()
    }

    /// Start a streaming hash for a body of known length.
    pub fn streaming(&self, len: u64) -> StreamingHasher {
        let mut inner = blake3::Hasher::new();
        inner.update(format!("{} {}\0", self.tag, len).as_bytes());
        StreamingHasher {
            inner,
            expected: len,
            seen: 0,
        }
    }

    /// Verify that data produces the expected object ID.
    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    /// The kind tag used by this hasher.
    pub fn tag(&self) -> &str {
        self.tag
    }
}

/// Incremental hasher for bodies fed in chunks.
///
/// The length is committed up front; [`StreamingHasher::try_finalize`]
/// rejects a stream that delivered a different number of bytes.
pub struct StreamingHasher {
    inner: blake3::Hasher,
    expected: u64,
    seen: u64,
}

impl StreamingHasher {
    /// Feed body bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.seen += data.len() as u64;
        self.inner.update(data);
    }

    /// Finalize, checking that exactly the announced length was fed.
    pub fn try_finalize(self) -> Result<ObjectId, HasherError> {
        if self.seen != self.expected {
            return Err(HasherError::LengthMismatch {
                expected: self.expected,
                actual: self.seen,
            });
        }
        Ok(ObjectId::from_hash(*self.inner.finalize().as_bytes()))
    }

    /// Finalize without the length check.
    pub fn finalize(self) -> ObjectId {
        ObjectId::from_hash(*self.inner.finalize().as_bytes())
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("stream length mismatch: announced {expected} bytes, got {actual}")]
    LengthMismatch { expected: u64, actual: u64 },
}
