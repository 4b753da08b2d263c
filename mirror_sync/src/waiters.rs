//! Pending "await until present" reads, keyed by content hash.

use crate::cache::BlobCache;
use bytes::Bytes;
use dashmap::{DashMap, mapref::entry::Entry};
use mirror_core::ContentHash;
use tokio::sync::oneshot;

pub(crate) enum Registration {
    /// The payload was already cached.
    Ready(Bytes),
    /// Resolves when the payload arrives.
    Pending(oneshot::Receiver<Bytes>),
}

#[derive(Debug, Default)]
pub struct WaiterRegistry {
    pending: DashMap<ContentHash, Vec<oneshot::Sender<Bytes>>>,
}

impl WaiterRegistry {
    /// Registers a waiter for `hash` unless `cache` already holds it.
    ///
    /// The cache is checked while the waiter slot is locked. Payloads are
    /// stored in the cache before [`WaiterRegistry::resolve`] drains the
    /// slot, so a payload landing concurrently is never missed.
    pub(crate) fn register(&self, hash: &ContentHash, cache: &BlobCache) -> Registration {
        match self.pending.entry(hash.clone()) {
            Entry::Occupied(mut slot) => {
                if let Some(bytes) = cache.get(hash) {
                    return Registration::Ready(bytes);
                }
                let (tx, rx) = oneshot::channel();
                let waiters = slot.get_mut();
                waiters.retain(|waiter| !waiter.is_closed());
                waiters.push(tx);
                Registration::Pending(rx)
            }
            Entry::Vacant(slot) => {
                if let Some(bytes) = cache.get(hash) {
                    return Registration::Ready(bytes);
                }
                let (tx, rx) = oneshot::channel();
                slot.insert(vec![tx]);
                Registration::Pending(rx)
            }
        }
    }

    /// Hands `payload` to every waiter of `hash`. Returns how many were
    /// still listening.
    pub(crate) fn resolve(&self, hash: &ContentHash, payload: &Bytes) -> usize {
        let Some((_, waiters)) = self.pending.remove(hash) else {
            return 0;
        };
        waiters
            .into_iter()
            .filter(|waiter| !waiter.is_closed())
            .map(|waiter| waiter.send(payload.clone()))
            .filter(Result::is_ok)
            .count()
    }

    /// Number of live waiters for `hash`.
    pub fn pending(&self, hash: &ContentHash) -> usize {
        self.pending
            .get(hash)
            .map(|waiters| waiters.iter().filter(|waiter| !waiter.is_closed()).count())
            .unwrap_or(0)
    }

    /// Drops every waiter; their receivers observe a closed channel.
    pub(crate) fn close_all(&self) {
        self.pending.clear();
    }
}
