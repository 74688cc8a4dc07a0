//! Canonical object hashing for Grove.
//!
//! Every stored object is identified by the BLAKE3 hash of its framed
//! encoding `"<kind> <len>\0" ++ body`. The kind tag doubles as a domain
//! separator: a blob and a tree with identical bodies never share an id.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod hasher;

pub use hasher::{ContentHasher, HasherError, StreamingHasher};
