//! Content-hash keyed payload cache with per-hash sync status.

use bytes::Bytes;
use lru::LruCache;
use mirror_core::ContentHash;
use parking_lot::Mutex;
use serde::Serialize;
use std::{collections::HashMap, num::NonZeroUsize};

/// Sync state of one content hash.
///
/// `Syncing -> Fresh` when the fetch succeeds, `Syncing -> Stale` when it
/// fails. A `Fresh` hash is never fetched again while it stays cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Syncing,
    Fresh,
    Stale,
}

#[derive(Debug)]
struct Entries {
    status: HashMap<ContentHash, SyncStatus>,
    /// Payloads of fresh hashes. Only this part is bounded, so a hash that
    /// is syncing or stale is never evicted.
    payloads: LruCache<ContentHash, Bytes>,
}

/// Blob payloads keyed by content hash.
///
/// Each operation touches a single key inside a short critical section.
/// Since equal hashes mean equal bytes, writes to the same key commute and
/// concurrent watch loops cannot lose each other's updates.
#[derive(Debug)]
pub struct BlobCache {
    entries: Mutex<Entries>,
}

impl BlobCache {
    /// Creates a cache holding at most `capacity` payloads, or an unbounded
    /// one for `None`.
    pub fn new(capacity: Option<usize>) -> Self {
        let payloads = match capacity {
            Some(cap) => LruCache::new(NonZeroUsize::new(cap).unwrap_or(NonZeroUsize::MIN)),
            None => LruCache::unbounded(),
        };
        Self {
            entries: Mutex::new(Entries {
                status: HashMap::new(),
                payloads,
            }),
        }
    }

    /// Marks `hash` as syncing. Returns `false` when it is already fresh or
    /// a fetch is in flight, in which case the caller must not fetch.
    pub fn begin_fetch(&self, hash: &ContentHash) -> bool {
        let mut entries = self.entries.lock();
        match entries.status.get(hash).copied() {
            Some(SyncStatus::Fresh) | Some(SyncStatus::Syncing) => false,
            Some(SyncStatus::Stale) | None => {
                entries.status.insert(hash.clone(), SyncStatus::Syncing);
                true
            }
        }
    }

    /// Stores a fetched payload and marks it fresh. The payload evicted to
    /// make room loses its status, so it is fetched again when next seen.
    pub fn complete(&self, hash: &ContentHash, payload: Bytes) {
        let mut entries = self.entries.lock();
        entries.status.insert(hash.clone(), SyncStatus::Fresh);
        if let Some((evicted, _)) = entries.payloads.push(hash.clone(), payload) {
            if evicted != *hash {
                entries.status.remove(&evicted);
            }
        }
    }

    /// Records a failed fetch. A fresh entry stays fresh.
    pub fn fail(&self, hash: &ContentHash) {
        let mut entries = self.entries.lock();
        let status = entries.status.entry(hash.clone()).or_insert(SyncStatus::Stale);
        if *status != SyncStatus::Fresh {
            *status = SyncStatus::Stale;
        }
    }

    /// Payload for `hash` if it is fresh.
    pub fn get(&self, hash: &ContentHash) -> Option<Bytes> {
        let mut entries = self.entries.lock();
        if entries.status.get(hash) != Some(&SyncStatus::Fresh) {
            return None;
        }
        entries.payloads.get(hash).cloned()
    }

    pub fn status(&self, hash: &ContentHash) -> Option<SyncStatus> {
        self.entries.lock().status.get(hash).copied()
    }

    /// Number of tracked hashes, whatever their status.
    pub fn len(&self) -> usize {
        self.entries.lock().status.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
