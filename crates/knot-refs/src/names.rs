//! Branch name validation following git's ref-format rules.
//!
//! A branch name is rejected when it:
//! - is empty
//! - starts with `.` or has a path component starting with `.` (`/.`)
//! - contains `..` or `@{`
//! - ends with `/` or `.lock`
//! - contains a control character, space, DEL, or any of `*:?[\^~`

use crate::error::{RefError, Result};

/// Characters that are forbidden anywhere in a branch name.
const FORBIDDEN_CHARS: &[char] = &['*', ':', '?', '[', '\\', '^', '~'];

/// Validate a branch name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use knot_refs::names::validate_branch_name;
///
/// assert!(validate_branch_name("master").is_ok());
/// assert!(validate_branch_name("topic/auth").is_ok());
/// assert!(validate_branch_name("").is_err());
/// assert!(validate_branch_name("bad..name").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> Result<()> {
    if let Some(reason) = invalid_reason(name) {
        tracing::debug!(name, reason, "rejected branch name");
        return Err(RefError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn invalid_reason(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        return Some("empty");
    }
    if name.starts_with('.') || name.contains("/.") {
        return Some("component starts with '.'");
    }
    if name.contains("..") {
        return Some("contains '..'");
    }
    if name.ends_with('/') {
        return Some("ends with '/'");
    }
    if name.ends_with(".lock") {
        return Some("ends with '.lock'");
    }
    if name.contains("@{") {
        return Some("contains '@{'");
    }
    if name
        .chars()
        .any(|c| c <= ' ' || c == '\x7f' || FORBIDDEN_CHARS.contains(&c))
    {
        return Some("contains a forbidden character");
    }
    None
}
