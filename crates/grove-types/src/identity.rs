use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identity of a person plus the moment they acted.
///
/// Used for commit authors and committers, tag taggers and reflog writers.
/// The external form is git's:
///
/// ```text
/// Name <email> 1700000000 +0130
/// ```
///
/// `Display` and [`FromStr`] are exact inverses for any identity whose name
/// and email contain no angle brackets or line breaks (the constructors strip
/// those).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonIdent {
    /// Display name.
    pub name: String,
    /// Email address, without angle brackets.
    pub email: String,
    /// Seconds since the UNIX epoch.
    pub when: i64,
    /// Offset from UTC in minutes (e.g. `-300` for UTC-05:00).
    pub tz_offset_minutes: i16,
}

impl PersonIdent {
    /// Create an identity with an explicit timestamp.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        when: i64,
        tz_offset_minutes: i16,
    ) -> Self {
        Self {
            name: sanitize(&name.into()),
            email: sanitize(&email.into()),
            when,
            tz_offset_minutes,
        }
    }

    /// Create an identity stamped with the current wall-clock time (UTC).
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Self {
        let when = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        Self::new(name, email, when, 0)
    }

    /// Same person, different moment.
    pub fn at(&self, when: i64, tz_offset_minutes: i16) -> Self {
        Self {
            name: self.name.clone(),
            email: self.email.clone(),
            when,
            tz_offset_minutes,
        }
    }

    /// Format the timezone as `+hhmm` / `-hhmm`.
    pub fn tz_string(&self) -> String {
        let sign = if self.tz_offset_minutes < 0 { '-' } else { '+' };
        let abs = self.tz_offset_minutes.unsigned_abs();
        format!("{sign}{:02}{:02}", abs / 60, abs % 60)
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '<' | '>' | '\n' | '\r' | '\0'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn parse_tz(tz: &str) -> Option<i16> {
    let (sign, digits) = match tz.as_bytes().first()? {
        b'+' => (1i16, &tz[1..]),
        b'-' => (-1i16, &tz[1..]),
        _ => return None,
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i16 = digits[..2].parse().ok()?;
    let minutes: i16 = digits[2..].parse().ok()?;
    Some(sign * (hours * 60 + minutes))
}

impl fmt::Display for PersonIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.when,
            self.tz_string()
        )
    }
}

impl FromStr for PersonIdent {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypeError::InvalidIdent(s.to_string());

        let open = s.find('<').ok_or_else(invalid)?;
        let close = s.rfind('>').ok_or_else(invalid)?;
        if close < open {
            return Err(invalid());
        }

        let name = s[..open].trim_end().to_string();
        let email = s[open + 1..close].to_string();

        let mut rest = s[close + 1..].split_whitespace();
        let when: i64 = rest
            .next()
            .and_then(|w| w.parse().ok())
            .ok_or_else(invalid)?;
        let tz = rest.next().and_then(parse_tz).ok_or_else(invalid)?;
        if rest.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            name,
            email,
            when,
            tz_offset_minutes: tz,
        })
    }
}
