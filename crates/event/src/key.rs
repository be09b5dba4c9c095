//! Dotted key path validation and splitting
//!
//! Keys address nested maps: `resp.status` reads the `status` field of the
//! `resp` map. Legal characters per segment are alphanumerics plus
//! `. _ @ / -`. Validation happens before any traversal so a malformed key
//! never reads as "absent".

use crate::{EventError, Result};

/// A validated, split key path
pub(crate) struct KeyPath<'a> {
    segments: Vec<&'a str>,
}

impl<'a> KeyPath<'a> {
    pub(crate) fn parse(key: &'a str) -> Result<Self> {
        if key.is_empty() {
            return Err(EventError::invalid_key(key, "key is empty"));
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '/' | '-'))
        {
            return Err(EventError::invalid_key(key, "illegal character"));
        }
        let segments: Vec<&str> = key.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(EventError::invalid_key(key, "empty path segment"));
        }
        Ok(Self { segments })
    }

    /// All segments except the last, and the last segment
    ///
    /// Parsing guarantees at least one segment.
    pub(crate) fn split_last(&self) -> (&[&'a str], &'a str) {
        match self.segments.split_last() {
            Some((last, parents)) => (parents, *last),
            None => (&[], ""),
        }
    }
}
