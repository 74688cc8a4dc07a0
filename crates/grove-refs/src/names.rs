//! Reference name validation following git-style conventions.
//!
//! A valid full reference name:
//! - starts with `refs/` and has at least one component after it
//! - contains no whitespace, control characters, `~`, `^`, `:`, `?`, `*`,
//!   `[` or `\`
//! - contains no `..` and no `@{`
//! - has no empty components and no component starting with `.` or ending
//!   with `.lock`
//! - does not end with `.` or `/`

use crate::error::{RefError, RefResult};

const FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

const REFS_PREFIX: &str = "refs/";

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a full reference name such as `refs/heads/main`.
///
/// # Examples
///
/// ```
/// use grove_refs::names::validate_ref_name;
///
/// assert!(validate_ref_name("refs/heads/main").is_ok());
/// assert!(validate_ref_name("refs/stash").is_ok());
/// assert!(validate_ref_name("main").is_err());
/// assert!(validate_ref_name("refs/heads/bad..name").is_err());
/// ```
pub fn validate_ref_name(name: &str) -> RefResult<()> {
    let Some(rest) = name.strip_prefix(REFS_PREFIX) else {
        return Err(invalid(name, "must start with 'refs/'"));
    };
    if rest.is_empty() {
        return Err(invalid(name, "must name something below 'refs/'"));
    }

    if let Some(ch) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
    }
    if name.contains("..") {
        return Err(invalid(name, "must not contain '..'"));
    }
    if name.contains("@{") {
        return Err(invalid(name, "must not contain '@{'"));
    }
    if name.ends_with('.') || name.ends_with('/') {
        return Err(invalid(name, "must not end with '.' or '/'"));
    }

    for component in rest.split('/') {
        if component.is_empty() {
            return Err(invalid(name, "path components must not be empty"));
        }
        if component.starts_with('.') {
            return Err(invalid(
                name,
                format!("component must not start with '.': {component:?}"),
            ));
        }
        if component.ends_with(".lock") {
            return Err(invalid(
                name,
                format!("component must not end with '.lock': {component:?}"),
            ));
        }
    }

    Ok(())
}

/// Full name of the branch `short`, validated.
pub fn branch_ref(short: &str) -> RefResult<String> {
    let full = format!("{REFS_PREFIX}heads/{short}");
    validate_ref_name(&full)?;
    Ok(full)
}

/// Human-facing form of a full name: `refs/heads/main` -> `main`,
/// `refs/tags/v1` -> `v1`, `refs/stash` -> `stash`.
pub fn short_name(name: &str) -> &str {
    ["refs/heads/", "refs/tags/", "refs/remotes/", REFS_PREFIX]
        .iter()
        .find_map(|p| name.strip_prefix(p))
        .unwrap_or(name)
}

/// True if one name is a directory-prefix of the other, so both cannot exist
/// side by side (`refs/heads/a` vs `refs/heads/a/b`).
pub(crate) fn nests(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() < b.len() { (a, b) } else { (b, a) };
    long.len() > short.len()
        && long.starts_with(short)
        && long.as_bytes()[short.len()] == b'/'
}
