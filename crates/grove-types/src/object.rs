use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length of an object identifier in bytes.
pub const OBJECT_ID_LEN: usize = 32;

/// Length of an object identifier in hex characters.
pub const OBJECT_ID_HEX_LEN: usize = OBJECT_ID_LEN * 2;

/// Content-addressed identifier for any stored object.
///
/// An `ObjectId` is the BLAKE3 hash of an object's canonical encoding.
/// Identical content always produces the same `ObjectId`, making objects
/// deduplicatable and verifiable. The all-zero id is reserved as the null
/// identifier ("no object", or "reference did not exist").
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// Hash raw bytes with no framing.
    ///
    /// Useful for synthetic ids in tests; stored objects get their id from
    /// the framed hasher in `grove-crypto`.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create an `ObjectId` from a pre-computed hash.
    pub const fn from_hash(hash: [u8; OBJECT_ID_LEN]) -> Self {
        Self(hash)
    }

    /// Create an `ObjectId` from a raw slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        if bytes.len() != OBJECT_ID_LEN {
            return Err(TypeError::InvalidLength {
                expected: OBJECT_ID_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; OBJECT_ID_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// The null object ID (all zeros). Represents "no object".
    pub const fn null() -> Self {
        Self([0u8; OBJECT_ID_LEN])
    }

    /// Returns `true` if this is the null object ID.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; OBJECT_ID_LEN]
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Split into the fan-out directory and file name used by loose storage.
    pub fn to_path_components(&self) -> (String, String) {
        let hex = self.to_hex();
        (hex[..2].to_string(), hex[2..].to_string())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; OBJECT_ID_LEN]> for ObjectId {
    fn from(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<ObjectId> for [u8; OBJECT_ID_LEN] {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}
