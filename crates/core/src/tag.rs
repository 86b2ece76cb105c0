//! Temporal tag encoding: `<unix-nanos>|<bare-tag>`
//!
//! A tag is either bare (`"type:user"`) or temporal
//! (`"1737140000000000000|type:user"`). Persisted entities only ever carry
//! temporal tags (invariant I1); bare tags exist only as the caller-facing
//! view produced by stripping the timestamp prefix.

use crate::error::Error;
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A bare tag: a temporal tag with its `<ts>|` prefix stripped.
///
/// `Deref`s to `str` so it can be compared/hashed against plain strings
/// without an extra allocation at call sites that only need to read it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BareTag(pub String);

impl BareTag {
    /// Namespace prefix up to and including the last `:` before the value,
    /// e.g. `rbac:perm:entity:create` -> `rbac:perm:entity:`. Used to
    /// populate `ByPrefix` for wildcard matching.
    pub fn prefixes(&self) -> Vec<String> {
        let mut out = Vec::new();
        let parts: Vec<&str> = self.0.split(':').collect();
        for i in 1..parts.len() {
            out.push(format!("{}:", parts[..i].join(":")));
        }
        out
    }
}

impl fmt::Display for BareTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for BareTag {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BareTag {
    fn from(s: &str) -> Self {
        BareTag(s.to_string())
    }
}

impl From<String> for BareTag {
    fn from(s: String) -> Self {
        BareTag(s)
    }
}

/// A temporal tag as persisted on an entity: `<nanos>|<bare>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Full wire representation, `<nanos>|<bare>`.
    raw: String,
    /// Byte offset of the bare component within `raw` (after the pipe).
    split_at: usize,
}

impl Tag {
    /// Build a temporal tag from a timestamp and a bare tag string.
    ///
    /// Returns [`Error::InvalidInput`] if `bare` is empty or contains a `|`
    /// (which would make the encoding ambiguous on parse).
    pub fn new(ts: Timestamp, bare: &str) -> Result<Self, Error> {
        if bare.is_empty() {
            return Err(Error::InvalidInput("tag value must not be empty".into()));
        }
        if bare.contains('|') {
            return Err(Error::InvalidInput(format!(
                "tag value must not contain '|': {bare}"
            )));
        }
        let raw = format!("{}|{}", ts.as_nanos(), bare);
        let split_at = raw.len() - bare.len();
        Ok(Tag { raw, split_at })
    }

    /// Parse `"<nanos>|<bare>"`. Per invariant P1: `<nanos>` must be a valid
    /// i64 and `<bare>` must be non-empty.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let pipe = raw
            .find('|')
            .ok_or_else(|| Error::InvalidInput(format!("tag missing '|' separator: {raw}")))?;
        let (ts_part, rest) = raw.split_at(pipe);
        let bare = &rest[1..];
        if bare.is_empty() {
            return Err(Error::InvalidInput(format!("tag has empty value: {raw}")));
        }
        ts_part
            .parse::<i64>()
            .map_err(|_| Error::InvalidInput(format!("tag has invalid timestamp: {raw}")))?;
        Ok(Tag {
            raw: raw.to_string(),
            split_at: pipe + 1,
        })
    }

    /// The timestamp component.
    pub fn timestamp(&self) -> Timestamp {
        Timestamp::from_nanos(self.raw[..self.split_at - 1].parse().unwrap_or(0))
    }

    /// The bare tag (timestamp prefix stripped).
    pub fn bare(&self) -> &str {
        &self.raw[self.split_at..]
    }

    /// Full `<nanos>|<bare>` wire representation.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Does `bare` match `required`, treating a trailing namespace prefix in
/// `bare` as a wildcard? E.g. `rbac:perm:entity:*` matches
/// `rbac:perm:entity:create`, and `rbac:perm:*` matches anything under
/// `rbac:perm:`.
pub fn wildcard_matches(bare: &str, required: &str) -> bool {
    if bare == required {
        return true;
    }
    if let Some(prefix) = bare.strip_suffix('*') {
        return required.starts_with(prefix);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let t = Tag::new(Timestamp::from_nanos(123), "type:user").unwrap();
        assert_eq!(t.as_str(), "123|type:user");
        assert_eq!(t.bare(), "type:user");
        assert_eq!(t.timestamp(), Timestamp::from_nanos(123));

        let parsed = Tag::parse(t.as_str()).unwrap();
        assert_eq!(parsed, t);
    }

    #[test]
    fn rejects_missing_pipe() {
        assert!(Tag::parse("type:user").is_err());
    }

    #[test]
    fn rejects_non_integer_timestamp() {
        assert!(Tag::parse("abc|type:user").is_err());
    }

    #[test]
    fn rejects_empty_bare() {
        assert!(Tag::parse("123|").is_err());
        assert!(Tag::new(Timestamp::from_nanos(1), "").is_err());
    }

    #[test]
    fn prefixes_cover_every_namespace_level() {
        let bare = BareTag::from("rbac:perm:entity:create");
        assert_eq!(
            bare.prefixes(),
            vec![
                "rbac:".to_string(),
                "rbac:perm:".to_string(),
                "rbac:perm:entity:".to_string(),
            ]
        );
    }

    #[test]
    fn wildcard_prefix_match() {
        assert!(wildcard_matches("rbac:perm:entity:*", "rbac:perm:entity:create"));
        assert!(wildcard_matches("rbac:perm:*", "rbac:perm:entity:create"));
        assert!(!wildcard_matches("rbac:perm:entity:*", "rbac:perm:session:create"));
        assert!(wildcard_matches("rbac:perm:entity:create", "rbac:perm:entity:create"));
    }
}
