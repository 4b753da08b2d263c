//! The [`Mirror`] facade that applications talk to.

use crate::{
    MirrorConfig, MirrorError, MirrorResult,
    cache::{BlobCache, SyncStatus},
    memo::{Transform, TransformMemo},
    snapshot::SnapshotCell,
    subscriptions::{Release, SubscribeOptions, SubscriptionInfo, SubscriptionManager},
    waiters::{Registration, WaiterRegistry},
    watch::{self, WatchLoop},
};
use bytes::Bytes;
use mirror_core::{ContentHash, Depth, Meta, Remote, TreeIndex, path};
use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::runtime::Handle;
use tracing::{debug, info};

/// State shared by the facade, watch loops and fetch tasks.
#[derive(Debug)]
pub(crate) struct Shared {
    pub remote: Arc<dyn Remote>,
    pub config: MirrorConfig,
    pub runtime: Handle,
    pub tree: SnapshotCell,
    pub cache: BlobCache,
    pub memo: TransformMemo,
    pub waiters: WaiterRegistry,
    pub subscriptions: SubscriptionManager,
    closed: AtomicBool,
}

impl Shared {
    pub(crate) fn subscribe(self: &Arc<Self>, path: &str, options: SubscribeOptions) {
        if self.closed.load(Ordering::Acquire) {
            debug!(path, "mirror is shut down; ignoring subscribe");
            return;
        }
        match self.subscriptions.acquire(path, options) {
            Some(ticket) => {
                let watch = WatchLoop::new(self, ticket);
                self.runtime.spawn(watch.run());
            }
            None => debug!(path, "subscription reused"),
        }
    }

    fn unsubscribe(&self, path: &str) {
        match self.subscriptions.release(path) {
            Release::Unknown => debug!(path, "unsubscribe of unknown path"),
            Release::Retained(ref_count) => debug!(path, ref_count, "subscription released"),
            Release::Cancelled { children } => {
                info!(path, children = children.len(), "subscription cancelled");
                if self.config.cascade_unsubscribe {
                    for child in children {
                        self.unsubscribe(&child);
                    }
                }
            }
        }
    }

    fn close(&self) {
        self.subscriptions.cancel_all();
        self.waiters.close_all();
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.close();
    }
}

/// A live, in-memory mirror of a remote content-addressed tree.
///
/// Reads are synchronous and only see what watch loops already mirrored.
/// Cloning is cheap; clones share one engine, and the engine stops once
/// every clone is dropped.
///
/// ```rust,no_run
/// use mirror_core::Meta;
/// use mirror_remote_memory::MemoryRemote;
/// use mirror_sync::{Mirror, MirrorConfig, SubscribeOptions, Transform};
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let remote = MemoryRemote::new();
/// remote.put("Name/c1.json", r#"{"id":1}"#);
///
/// let mirror = Mirror::new(remote, MirrorConfig::default())?;
/// mirror.subscribe("Name", SubscribeOptions::new().unbounded().blobs(true));
/// let value = mirror
///     .await_file_with("Name/c1.json", &Transform::<serde_json::Result<serde_json::Value>>::json())
///     .await?;
/// # Ok(()) }
/// ```
#[derive(Clone, Debug)]
pub struct Mirror {
    shared: Arc<Shared>,
}

impl Mirror {
    /// Creates a mirror on the current tokio runtime.
    pub fn new(remote: impl Remote, config: MirrorConfig) -> MirrorResult<Self> {
        Ok(Self::with_runtime(remote, config, Handle::try_current()?))
    }

    /// Creates a mirror whose watch loops and fetches run on `runtime`.
    pub fn with_runtime(remote: impl Remote, config: MirrorConfig, runtime: Handle) -> Self {
        let shared = Shared {
            remote: Arc::new(remote),
            cache: BlobCache::new(config.blob_cache_capacity),
            memo: TransformMemo::new(config.memo_capacity),
            config,
            runtime,
            tree: SnapshotCell::default(),
            waiters: WaiterRegistry::default(),
            subscriptions: SubscriptionManager::default(),
            closed: AtomicBool::new(false),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.shared.config
    }

    /// Starts mirroring `path`, or adds a reference to an existing
    /// subscription. The first subscriber's options stay in effect.
    pub fn subscribe(&self, path: &str, options: SubscribeOptions) {
        self.shared.subscribe(&path::normalize(path), options);
    }

    /// Drops one reference to `path`; the watch stops at zero.
    ///
    /// Subscriptions created by fan-out are left running unless
    /// [`MirrorConfig::cascade_unsubscribe`] is set.
    pub fn unsubscribe(&self, path: &str) {
        self.shared.unsubscribe(&path::normalize(path));
    }

    pub fn subscription(&self, path: &str) -> Option<SubscriptionInfo> {
        self.shared.subscriptions.get(&path::normalize(path))
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.shared.subscriptions.list()
    }

    /// Cancels every subscription and fails every pending [`Mirror::await_file`].
    /// Later subscribes are ignored.
    pub fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.close();
        info!("mirror shut down");
    }

    /// The currently published tree snapshot.
    pub fn snapshot(&self) -> Arc<TreeIndex> {
        self.shared.tree.load()
    }

    /// Blob metadata known for `path`.
    pub fn get_meta(&self, path: &str) -> Option<Meta> {
        self.snapshot().get_meta(path).cloned()
    }

    pub fn tree_meta(&self, path: &str) -> Option<Meta> {
        self.snapshot().tree_meta(path).cloned()
    }

    pub fn status(&self, hash: &ContentHash) -> Option<SyncStatus> {
        self.shared.cache.status(hash)
    }

    /// Sync status of the blob currently at `path`.
    pub fn status_of(&self, path: &str) -> Option<SyncStatus> {
        let meta = self.get_meta(path)?;
        self.status(&meta.hash)
    }

    pub fn is_synced(&self, path: &str) -> bool {
        self.status_of(path) == Some(SyncStatus::Fresh)
    }

    /// Cached payload of `path`. `None` when the path is unknown or its
    /// blob is not fresh.
    pub fn read_file(&self, path: &str) -> Option<Bytes> {
        let meta = self.get_meta(path)?;
        self.shared.cache.get(&meta.hash)
    }

    /// Like [`Mirror::read_file`], with `transform` applied through the memo.
    pub fn read_file_with<R>(&self, path: &str, transform: &Transform<R>) -> Option<Arc<R>>
    where
        R: Send + Sync + 'static,
    {
        let meta = self.get_meta(path)?;
        self.read_hash_with(&meta.hash, transform)
    }

    fn read_hash_with<R>(&self, hash: &ContentHash, transform: &Transform<R>) -> Option<Arc<R>>
    where
        R: Send + Sync + 'static,
    {
        let raw = self.shared.cache.get(hash)?;
        Some(self.shared.memo.get_or_compute(transform, hash, &raw))
    }

    /// Lists the blobs at or below `path` within `depth` levels.
    pub fn read_dir(&self, path: &str, depth: Depth) -> DirView<'_> {
        let entries = self.snapshot().list_entries(path, depth);
        let synced = entries
            .iter()
            .filter(|meta| self.status(&meta.hash) == Some(SyncStatus::Fresh))
            .count();
        DirView {
            mirror: self,
            progress: Progress {
                synced,
                total: entries.len(),
            },
            entries,
        }
    }

    /// Fetches `path` straight from the remote, ignoring cache and
    /// subscriptions.
    pub async fn one_off_read(&self, path: &str) -> MirrorResult<Bytes> {
        let shared = &self.shared;
        watch::fetch(shared.remote.as_ref(), &path::normalize(path), shared.config.fetch_timeout()).await
    }

    /// Like [`Mirror::one_off_read`], with `transform` applied. The result
    /// is not memoized.
    pub async fn one_off_read_with<R>(&self, path: &str, transform: &Transform<R>) -> MirrorResult<R>
    where
        R: Send + Sync + 'static,
    {
        let raw = self.one_off_read(path).await?;
        Ok(transform.apply(&raw))
    }

    /// Waits until the blob at `path` is fetched.
    ///
    /// Fails with [`MirrorError::NotFound`] right away when no metadata is
    /// known for `path`, and with [`MirrorError::Closed`] when the mirror
    /// shuts down first. A failed fetch does not fail the wait.
    pub async fn await_file(&self, path: &str) -> MirrorResult<Bytes> {
        let (_, payload) = self.await_payload(path).await?;
        Ok(payload)
    }

    /// Like [`Mirror::await_file`], with `transform` applied through the memo.
    pub async fn await_file_with<R>(&self, path: &str, transform: &Transform<R>) -> MirrorResult<Arc<R>>
    where
        R: Send + Sync + 'static,
    {
        let (hash, payload) = self.await_payload(path).await?;
        Ok(self.shared.memo.get_or_compute(transform, &hash, &payload))
    }

    async fn await_payload(&self, path: &str) -> MirrorResult<(ContentHash, Bytes)> {
        let shared = &self.shared;
        if shared.closed.load(Ordering::Acquire) {
            return Err(MirrorError::Closed);
        }
        let path = path::normalize(path);
        let meta = self.get_meta(&path).ok_or(MirrorError::NotFound(path))?;
        let payload = match shared.waiters.register(&meta.hash, &shared.cache) {
            Registration::Ready(payload) => payload,
            Registration::Pending(rx) => rx.await.map_err(|_| MirrorError::Closed)?,
        };
        Ok((meta.hash, payload))
    }

    /// Live waiters for `hash`.
    pub fn pending_waiters(&self, hash: &ContentHash) -> usize {
        self.shared.waiters.pending(hash)
    }
}

/// How many listed blobs are already fetched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub synced: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.synced == self.total
    }
}

/// A path or an already resolved [`Meta`], as accepted by [`DirView::read`].
#[derive(Clone, Copy, Debug)]
pub enum EntryRef<'a> {
    Path(&'a str),
    Meta(&'a Meta),
}

impl<'a> From<&'a str> for EntryRef<'a> {
    fn from(value: &'a str) -> Self {
        EntryRef::Path(value)
    }
}

impl<'a> From<&'a String> for EntryRef<'a> {
    fn from(value: &'a String) -> Self {
        EntryRef::Path(value)
    }
}

impl<'a> From<&'a Meta> for EntryRef<'a> {
    fn from(value: &'a Meta) -> Self {
        EntryRef::Meta(value)
    }
}

/// Result of [`Mirror::read_dir`].
#[derive(Debug)]
pub struct DirView<'a> {
    mirror: &'a Mirror,
    entries: Vec<Meta>,
    progress: Progress,
}

impl<'a> DirView<'a> {
    pub fn entries(&self) -> &[Meta] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Meta> {
        self.entries
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    /// Cached payload of an entry. A [`Meta`] is read by its hash as given,
    /// a path through the current snapshot.
    pub fn read<'e>(&self, entry: impl Into<EntryRef<'e>>) -> Option<Bytes> {
        match entry.into() {
            EntryRef::Path(path) => self.mirror.read_file(path),
            EntryRef::Meta(meta) => self.mirror.shared.cache.get(&meta.hash),
        }
    }

    pub fn read_with<'e, R>(&self, entry: impl Into<EntryRef<'e>>, transform: &Transform<R>) -> Option<Arc<R>>
    where
        R: Send + Sync + 'static,
    {
        match entry.into() {
            EntryRef::Path(path) => self.mirror.read_file_with(path, transform),
            EntryRef::Meta(meta) => self.mirror.read_hash_with(&meta.hash, transform),
        }
    }
}
