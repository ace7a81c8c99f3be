//! Key sanitization
//!
//! Turns caller keys into names that are always exactly one path segment
//! inside the cache directory.

use crate::error::{CacheError, Result};
use crate::events::{CacheEvent, EventSink};
use std::fmt;

pub const PATH_SEPARATOR: char = '/';
pub const ESCAPE_CHAR: char = '\\';

/// A key that is safe to use as a file name in the cache directory.
///
/// Only produced by [`sanitize`] (or by the store when it lists its own
/// directory), so unsanitized input can never reach the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SafeKey(String);

impl SafeKey {
    pub(crate) fn from_file_name(name: String) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SafeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SafeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Replace every path separator with [`ESCAPE_CHAR`].
///
/// `.` and `..` would name the directory itself or its parent, so their dots
/// are escaped as well. They then share a file with the keys `\` and
/// `\\`, the same way `a/b` shares one with `a\b`.
pub fn escape(raw: &str) -> String {
    match raw {
        "." | ".." => raw.replace('.', &ESCAPE_CHAR.to_string()),
        _ => raw.replace(PATH_SEPARATOR, &ESCAPE_CHAR.to_string()),
    }
}

/// Validate and escape a caller key
pub fn sanitize(raw: &str, events: &dyn EventSink) -> Result<SafeKey> {
    if raw.is_empty() {
        events.emit(CacheEvent::EmptyKey);
        return Err(CacheError::EmptyKey);
    }

    let escaped = escape(raw);
    if escaped != raw {
        events.emit(CacheEvent::KeyEscaped {
            raw: raw.to_string(),
            escaped: escaped.clone(),
        });
    }

    Ok(SafeKey(escaped))
}
