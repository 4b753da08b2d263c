use crate::{ContentHash, path};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an entry is a directory-like subtree or a binary payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Tree,
    Blob,
}

/// Metadata for one entry of the remote tree.
///
/// A `Meta` describes one revision of `path`. A later `Meta` for the same
/// path with a different hash is a newer revision.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Meta {
    pub path: String,
    pub hash: ContentHash,
    pub kind: EntryKind,
}

impl Meta {
    pub fn new(path: impl Into<String>, hash: impl Into<ContentHash>, kind: EntryKind) -> Self {
        Self {
            path: path.into(),
            hash: hash.into(),
            kind,
        }
    }

    pub fn blob(path: impl Into<String>, hash: impl Into<ContentHash>) -> Self {
        Self::new(path, hash, EntryKind::Blob)
    }

    pub fn tree(path: impl Into<String>, hash: impl Into<ContentHash>) -> Self {
        Self::new(path, hash, EntryKind::Tree)
    }

    pub fn is_tree(&self) -> bool {
        self.kind == EntryKind::Tree
    }

    pub fn is_blob(&self) -> bool {
        self.kind == EntryKind::Blob
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        path::file_name(&self.path).unwrap_or("")
    }
}

/// Recursion budget for subscriptions and listings.
///
/// `Limited(0)` means "direct children only".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Depth {
    Limited(u32),
    Unbounded,
}

impl Default for Depth {
    fn default() -> Self {
        Depth::ZERO
    }
}

impl Depth {
    pub const ZERO: Depth = Depth::Limited(0);

    /// Budget left for a subtree found `relative_depth` levels below the
    /// root, or `None` when that subtree is out of range.
    ///
    /// This is `depth - relative_depth - 1` and must be non-negative.
    pub fn remaining_after(self, relative_depth: usize) -> Option<Depth> {
        match self {
            Depth::Unbounded => Some(Depth::Unbounded),
            Depth::Limited(n) => {
                let used = u32::try_from(relative_depth).ok()?.checked_add(1)?;
                n.checked_sub(used).map(Depth::Limited)
            }
        }
    }

    /// Budget for the next level of a listing, `None` at the bottom.
    pub fn descend(self) -> Option<Depth> {
        match self {
            Depth::Unbounded => Some(Depth::Unbounded),
            Depth::Limited(0) => None,
            Depth::Limited(n) => Some(Depth::Limited(n - 1)),
        }
    }

    pub fn is_unbounded(self) -> bool {
        matches!(self, Depth::Unbounded)
    }
}

impl From<u32> for Depth {
    fn from(value: u32) -> Self {
        Depth::Limited(value)
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Depth::Unbounded => f.write_str("unbounded"),
            Depth::Limited(n) => write!(f, "{n}"),
        }
    }
}
