//! Core mirror types and traits.
//!
//! This crate defines the shared vocabulary of all mirror crates:
//!
//! - Content hashes (`hash::ContentHash`) and entry metadata (`meta::Meta`)
//! - The persistent tree snapshot (`tree::TreeIndex`) that the engine
//!   publishes to readers
//! - The `Remote` trait: the watch/fetch contract a server side has to
//!   fulfil, implemented by `mirror_remote_memory` and
//!   `mirror_remote_local`
//!
//! The engine itself lives in `mirror_sync`.

pub mod hash;
pub mod meta;
pub mod path;
pub mod remote;
pub mod tree;

// Test utilities (behind feature flag)
#[cfg(feature = "testutil")]
pub mod testutil;

pub use hash::ContentHash;
pub use meta::{Depth, EntryKind, Meta};
pub use remote::{Remote, RemoteError, RemoteResult, WatchEvent, WatchStream};
pub use tree::{TreeIndex, TreeNode};
