//! Foundation types for Grove.
//!
//! This crate provides the identifier and identity types shared by every
//! other Grove crate.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Content-addressed identifier (BLAKE3 hash of an object's
//!   canonical encoding)
//! - [`PersonIdent`]: Name, email and timestamp of an author, committer,
//!   tagger or reflog writer

pub mod error;
pub mod identity;
pub mod object;

pub use error::TypeError;
pub use identity::PersonIdent;
pub use object::ObjectId;
