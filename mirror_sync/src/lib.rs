//! # Mirror sync engine
//!
//! Keeps a live, in-memory mirror of a remote content-addressed tree.
//!
//! ## Layers
//! 1. `snapshot` holds the published [`mirror_core::TreeIndex`]; watch loops
//!    replace it with compare-and-swap.
//! 2. `cache`, `memo` and `waiters` store fetched payloads, derived values
//!    and pending reads, all keyed by content hash.
//! 3. `subscriptions` and `watch` multiplex subscribers onto one watch loop
//!    per path and fan out into discovered subtrees.
//! 4. `api` is the [`Mirror`] facade applications use.

mod api;
pub mod cache;
mod config;
mod error;
pub mod memo;
mod snapshot;
pub mod subscriptions;
mod waiters;
mod watch;

pub use api::{DirView, EntryRef, Mirror, Progress};
pub use cache::SyncStatus;
pub use config::MirrorConfig;
pub use error::{MirrorError, MirrorResult};
pub use memo::{Transform, TransformId};
pub use subscriptions::{SubscribeOptions, SubscriptionInfo};
