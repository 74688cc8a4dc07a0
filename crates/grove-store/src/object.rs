use grove_crypto::ContentHasher;
use grove_types::{ObjectId, PersonIdent};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::tree::Tree;

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Raw content (file contents, arbitrary data).
    Blob,
    /// Directory listing: ordered entries mapping names to object references.
    Tree,
    /// History node pointing at a root tree and its parent commits.
    Commit,
    /// Annotated tag pointing at another object.
    Tag,
}

impl ObjectKind {
    /// The tag written in the canonical header.
    pub fn as_str(&self) -> &'static str {
        self.hasher().tag()
    }

    /// Parse a header tag.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "blob" => Some(Self::Blob),
            "tree" => Some(Self::Tree),
            "commit" => Some(Self::Commit),
            "tag" => Some(Self::Tag),
            _ => None,
        }
    }

    /// The framed hasher for this kind.
    pub fn hasher(&self) -> &'static ContentHasher {
        match self {
            Self::Blob => &ContentHasher::BLOB,
            Self::Tree => &ContentHasher::TREE,
            Self::Commit => &ContentHasher::COMMIT,
            Self::Tag => &ContentHasher::TAG,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored object: kind tag + serialized data + cached size.
///
/// `StoredObject` is the unit of storage. Backends never interpret `data`;
/// typed decoding lives in [`Blob`], [`Tree`], [`Commit`] and [`Tag`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// The type of this object.
    pub kind: ObjectKind,
    /// The serialized body of the object (without header).
    pub data: Vec<u8>,
    /// The size of `data` in bytes.
    pub size: u64,
}

impl StoredObject {
    /// Create a new stored object from kind and data.
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { kind, data, size }
    }

    /// Compute the content-addressed ID for this object.
    pub fn compute_id(&self) -> ObjectId {
        self.kind.hasher().hash(&self.data)
    }

    /// Header followed by body: the exact bytes the id is computed over.
    pub fn to_canonical(&self) -> Vec<u8> {
        let mut out = self.kind.hasher().header(self.data.len());
        out.extend_from_slice(&self.data);
        out
    }

    /// Parse `"<kind> <len>\0" ++ body`.
    pub fn from_canonical(bytes: &[u8]) -> StoreResult<Self> {
        let corrupt = |reason: &str| StoreError::Malformed {
            kind: "object",
            reason: reason.to_string(),
        };
        let nul = bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| corrupt("missing header terminator"))?;
        let header =
            std::str::from_utf8(&bytes[..nul]).map_err(|_| corrupt("header is not UTF-8"))?;
        let (tag, len) = header
            .split_once(' ')
            .ok_or_else(|| corrupt("header has no length"))?;
        let kind = ObjectKind::parse(tag).ok_or_else(|| corrupt("unknown object kind"))?;
        let len: usize = len.parse().map_err(|_| corrupt("invalid length"))?;
        let body = &bytes[nul + 1..];
        if body.len() != len {
            return Err(corrupt("body length does not match header"));
        }
        Ok(Self::new(kind, body.to_vec()))
    }

    pub(crate) fn expect_kind(&self, expected: ObjectKind) -> StoreResult<()> {
        if self.kind != expected {
            return Err(StoreError::KindMismatch {
                id: self.compute_id(),
                expected,
                actual: self.kind,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw content object (analogous to git blob).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    /// Create a new blob from raw bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Convert into a `StoredObject` for storage.
    pub fn to_stored_object(&self) -> StoredObject {
        StoredObject::new(ObjectKind::Blob, self.data.clone())
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Blob)?;
        Ok(Self {
            data: obj.data.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// History node (analogous to git commit).
///
/// Encoded as text headers followed by a blank line and the message:
///
/// ```text
/// tree <hex>
/// parent <hex>        (zero or more, in order)
/// author <ident>
/// committer <ident>
///
/// <message>
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub tree: ObjectId,
    /// Ordered parents; the first is the mainline parent.
    pub parents: Vec<ObjectId>,
    pub author: PersonIdent,
    pub committer: PersonIdent,
    pub message: String,
}

impl Commit {
    /// Commit time used for date ordering.
    pub fn commit_time(&self) -> i64 {
        self.committer.when
    }

    /// First paragraph of the message, lines joined with spaces.
    pub fn subject(&self) -> String {
        message_subject(&self.message)
    }

    /// Fails when an identity would break the header layout.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        check_ident(ObjectKind::Commit, "author", &self.author)?;
        check_ident(ObjectKind::Commit, "committer", &self.committer)?;
        let mut out = String::new();
        out.push_str(&format!("tree {}\n", self.tree));
        for parent in &self.parents {
            out.push_str(&format!("parent {parent}\n"));
        }
        out.push_str(&format!("author {}\n", self.author));
        out.push_str(&format!("committer {}\n", self.committer));
        out.push('\n');
        out.push_str(&self.message);
        Ok(out.into_bytes())
    }

    pub fn decode(data: &[u8]) -> StoreResult<Self> {
        let bad = |reason: &str| StoreError::malformed(ObjectKind::Commit, reason);
        let text = std::str::from_utf8(data).map_err(|_| bad("not UTF-8"))?;
        let (head, message) = text
            .split_once("\n\n")
            .ok_or_else(|| bad("missing message separator"))?;
        let mut lines = head.lines().peekable();

        let tree = header_id(lines.next(), "tree").ok_or_else(|| bad("missing tree"))?;
        let mut parents = Vec::new();
        while let Some(line) = lines.peek() {
            if !line.starts_with("parent ") {
                break;
            }
            parents.push(header_id(lines.next(), "parent").ok_or_else(|| bad("bad parent"))?);
        }
        let author = header_ident(lines.next(), "author").ok_or_else(|| bad("bad author"))?;
        let committer =
            header_ident(lines.next(), "committer").ok_or_else(|| bad("bad committer"))?;
        if lines.next().is_some() {
            return Err(bad("unexpected header"));
        }

        Ok(Self {
            tree,
            parents,
            author,
            committer,
            message: message.to_string(),
        })
    }

    /// Convert into a `StoredObject` for storage.
    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        Ok(StoredObject::new(ObjectKind::Commit, self.encode()?))
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Commit)?;
        Self::decode(&obj.data)
    }
}

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

/// Annotated tag (analogous to git tag object).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub object: ObjectId,
    pub target_kind: ObjectKind,
    pub name: String,
    pub tagger: PersonIdent,
    pub message: String,
}

impl Tag {
    /// Fails when the name or tagger would break the header layout.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        check_header_value(ObjectKind::Tag, "tag name", &self.name, &[])?;
        check_ident(ObjectKind::Tag, "tagger", &self.tagger)?;
        Ok(format!(
            "object {}\ntype {}\ntag {}\ntagger {}\n\n{}",
            self.object, self.target_kind, self.name, self.tagger, self.message
        )
        .into_bytes())
    }

    pub fn decode(data: &[u8]) -> StoreResult<Self> {
        let bad = |reason: &str| StoreError::malformed(ObjectKind::Tag, reason);
        let text = std::str::from_utf8(data).map_err(|_| bad("not UTF-8"))?;
        let (head, message) = text
            .split_once("\n\n")
            .ok_or_else(|| bad("missing message separator"))?;
        let mut lines = head.lines();

        let object = header_id(lines.next(), "object").ok_or_else(|| bad("bad object"))?;
        let target_kind = lines
            .next()
            .and_then(|l| l.strip_prefix("type "))
            .and_then(ObjectKind::parse)
            .ok_or_else(|| bad("bad type"))?;
        let name = lines
            .next()
            .and_then(|l| l.strip_prefix("tag "))
            .ok_or_else(|| bad("bad tag name"))?
            .to_string();
        let tagger = header_ident(lines.next(), "tagger").ok_or_else(|| bad("bad tagger"))?;
        if lines.next().is_some() {
            return Err(bad("unexpected header"));
        }

        Ok(Self {
            object,
            target_kind,
            name,
            tagger,
            message: message.to_string(),
        })
    }

    /// Convert into a `StoredObject` for storage.
    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        Ok(StoredObject::new(ObjectKind::Tag, self.encode()?))
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Tag)?;
        Self::decode(&obj.data)
    }
}

/// First paragraph of a commit or tag message, lines joined with spaces.
pub fn message_subject(message: &str) -> String {
    message
        .trim_start_matches('\n')
        .split("\n\n")
        .next()
        .unwrap_or("")
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Header values are single lines; NUL is refused as well.
fn check_header_value(
    kind: ObjectKind,
    field: &str,
    value: &str,
    also_forbidden: &[char],
) -> StoreResult<()> {
    match value
        .chars()
        .find(|c| matches!(c, '\n' | '\r' | '\0') || also_forbidden.contains(c))
    {
        Some(c) => Err(StoreError::malformed(
            kind,
            format!("{field} contains {c:?}"),
        )),
        None => Ok(()),
    }
}

fn check_ident(kind: ObjectKind, field: &str, who: &PersonIdent) -> StoreResult<()> {
    check_header_value(kind, field, &who.name, &['<', '>'])?;
    check_header_value(kind, field, &who.email, &['<', '>'])
}

fn header_id(line: Option<&str>, key: &str) -> Option<ObjectId> {
    let value = line?.strip_prefix(key)?.strip_prefix(' ')?;
    ObjectId::from_hex(value).ok()
}

fn header_ident(line: Option<&str>, key: &str) -> Option<PersonIdent> {
    let value = line?.strip_prefix(key)?.strip_prefix(' ')?;
    value.parse().ok()
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// Any decoded object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Blob(_) => ObjectKind::Blob,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Commit(_) => ObjectKind::Commit,
            Self::Tag(_) => ObjectKind::Tag,
        }
    }

    /// Decode a stored object according to its kind.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        Ok(match obj.kind {
            ObjectKind::Blob => Self::Blob(Blob::from_stored_object(obj)?),
            ObjectKind::Tree => Self::Tree(Tree::from_stored_object(obj)?),
            ObjectKind::Commit => Self::Commit(Commit::from_stored_object(obj)?),
            ObjectKind::Tag => Self::Tag(Tag::from_stored_object(obj)?),
        })
    }

    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        Ok(match self {
            Self::Blob(b) => b.to_stored_object(),
            Self::Tree(t) => t.to_stored_object()?,
            Self::Commit(c) => c.to_stored_object()?,
            Self::Tag(t) => t.to_stored_object()?,
        })
    }
}
