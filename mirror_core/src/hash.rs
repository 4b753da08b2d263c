//! Content hashes as reported by a remote.
//!
//! The remote decides the textual format of a hash. The engine only relies
//! on one property: two entries with the same hash have the same bytes.

use serde::{Deserialize, Serialize};
use std::{borrow::Borrow, fmt, sync::Arc};

/// Identifier of a unique binary payload.
///
/// Cloning is cheap (the string is shared), so hashes can be used freely as
/// map keys in caches and waiter tables.
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(Arc<str>);

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContentHash").field(&self.as_str()).finish()
    }
}

impl ContentHash {
    /// Wraps a hash string reported by a remote.
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    /// Computes the blake3 hex digest of `buf`.
    pub fn digest(buf: impl AsRef<[u8]>) -> Self {
        let hash = blake3::hash(buf.as_ref());
        Self(Arc::from(hash.to_hex().as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First ten characters, for log lines.
    pub fn fmt_short(&self) -> &str {
        match self.0.char_indices().nth(10) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContentHash {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContentHash {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for ContentHash {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<blake3::Hash> for ContentHash {
    fn from(value: blake3::Hash) -> Self {
        Self(Arc::from(value.to_hex().as_str()))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_known_value() {
        // BLAKE3 hash of "hello" is well-known
        let hash = ContentHash::digest(b"hello");
        let expected_hex = "ea8f163db38682925e4491c5e58d4bb3506ef8c14eb78a86e908c5624a67200f";
        assert_eq!(hash.as_str(), expected_hex);
        assert_eq!(hash, ContentHash::from(blake3::hash(b"hello")));
    }

    #[test]
    fn test_fmt_short() {
        let hash = ContentHash::digest(b"hello");
        assert_eq!(hash.fmt_short().len(), 10);
        assert!(hash.as_str().starts_with(hash.fmt_short()));

        let tiny = ContentHash::from("h1");
        assert_eq!(tiny.fmt_short(), "h1");
    }

    #[test]
    fn test_opaque_hashes_compare_by_value() {
        let a = ContentHash::from("h1");
        let b = ContentHash::from(String::from("h1"));
        assert_eq!(a, b);
        assert_ne!(a, ContentHash::from("h2"));
    }

    #[test]
    fn test_debug_and_display() {
        let hash = ContentHash::from("abc");
        assert_eq!(format!("{hash}"), "abc");
        assert_eq!(format!("{hash:?}"), "ContentHash(\"abc\")");
    }

    #[test]
    fn test_serde_transparent() {
        let hash = ContentHash::from("abc");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, "\"abc\"");
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
