//! Core reference types.

use std::fmt;

use grove_types::{ObjectId, PersonIdent};
use serde::{Deserialize, Serialize};

use crate::error::{RefError, RefResult};

/// A named pointer to an object.
///
/// `generation` starts at 1 when the name is created and grows by one with
/// every successful update, so two reads returning the same generation saw
/// the same value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    /// Full name, e.g. `refs/heads/main`.
    pub name: String,
    /// The object this ref points at. Never null.
    pub target: ObjectId,
    pub generation: u64,
}

impl Ref {
    pub fn new(name: impl Into<String>, target: ObjectId, generation: u64) -> Self {
        Self {
            name: name.into(),
            target,
            generation,
        }
    }

    /// The value this ref takes after moving to `target`.
    pub fn advanced(&self, target: ObjectId) -> Self {
        Self::new(self.name.clone(), target, self.generation + 1)
    }
}

/// One recorded change of a reference.
///
/// A creation has a null `old_id`; a deletion has a null `new_id`. The time
/// of the change is `who.when`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflogEntry {
    pub old_id: ObjectId,
    pub new_id: ObjectId,
    pub who: PersonIdent,
    pub message: String,
}

impl ReflogEntry {
    /// Build an entry. Line breaks in `message` become spaces so the entry
    /// always fits on one log line.
    pub fn new(old_id: ObjectId, new_id: ObjectId, who: PersonIdent, message: &str) -> Self {
        let message = message
            .trim_end()
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        Self {
            old_id,
            new_id,
            who,
            message,
        }
    }

    pub fn is_creation(&self) -> bool {
        self.old_id.is_null()
    }

    pub fn is_deletion(&self) -> bool {
        self.new_id.is_null()
    }

    /// Parse one log line (without its trailing newline).
    ///
    /// `name` is only used for error reporting.
    pub fn parse_line(name: &str, line: &str) -> RefResult<Self> {
        let malformed = |reason: &str| RefError::Malformed {
            name: name.to_string(),
            reason: format!("{reason} in reflog line {line:?}"),
        };

        let (head, message) = line.split_once('\t').ok_or_else(|| malformed("missing tab"))?;
        let (old, rest) = head.split_once(' ').ok_or_else(|| malformed("missing old id"))?;
        let (new, who) = rest.split_once(' ').ok_or_else(|| malformed("missing new id"))?;

        Ok(Self {
            old_id: old.parse().map_err(|_| malformed("bad old id"))?,
            new_id: new.parse().map_err(|_| malformed("bad new id"))?,
            who: who.parse().map_err(|_| malformed("bad identity"))?,
            message: message.to_string(),
        })
    }
}

/// The on-disk line form: `<old> <new> <ident>\t<message>`.
impl fmt::Display for ReflogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}\t{}",
            self.old_id, self.new_id, self.who, self.message
        )
    }
}
