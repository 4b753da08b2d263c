use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use mirror_core::{
    ContentHash, Meta, path,
    remote::{Remote, RemoteError, RemoteResult, WatchEvent, WatchStream},
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

type EventSender = mpsc::UnboundedSender<RemoteResult<WatchEvent>>;

/// A [`Remote`] kept entirely in memory.
///
/// Watching a path first replays the metadata of its direct children, then
/// delivers every later [`MemoryRemote::publish`] whose parent is that path.
/// Clones share the same state.
#[derive(Clone, Debug, Default)]
pub struct MemoryRemote {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    metas: DashMap<String, Meta>,
    payloads: DashMap<String, Bytes>,
    watchers: DashMap<String, Vec<EventSender>>,
    watch_counts: DashMap<String, usize>,
    fetch_counts: DashMap<String, usize>,
    /// `true` while fetches are held back.
    paused: watch::Sender<bool>,
    /// Check fetched payloads against blake3 hashes.
    verify_hashes: bool,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            metas: DashMap::new(),
            payloads: DashMap::new(),
            watchers: DashMap::new(),
            watch_counts: DashMap::new(),
            fetch_counts: DashMap::new(),
            paused: watch::channel(false).0,
            verify_hashes: false,
        }
    }
}

impl MemoryRemote {
    /// Creates a new, empty `MemoryRemote`.
    pub fn new() -> Self {
        Self::default()
    }

    /// A remote whose hashes are all blake3 digests, as produced by
    /// [`MemoryRemote::put`]. Fetched payloads are verified against them.
    pub fn with_verified_hashes() -> Self {
        Self {
            inner: Arc::new(Inner {
                verify_hashes: true,
                ..Inner::default()
            }),
        }
    }

    /// Records `meta` and sends it to every watcher of its parent path.
    pub fn publish(&self, meta: Meta) {
        let meta = Meta {
            path: path::normalize(&meta.path),
            ..meta
        };
        let Some(parent) = path::parent(&meta.path) else {
            return;
        };
        self.inner.metas.insert(meta.path.clone(), meta.clone());
        if let Some(mut senders) = self.inner.watchers.get_mut(&parent) {
            senders.retain(|tx| tx.send(Ok(WatchEvent::from(meta.clone()))).is_ok());
        }
        tracing::trace!(path = %meta.path, hash = meta.hash.fmt_short(), "published");
    }

    /// Stores `payload` at `path` and publishes a blob [`Meta`] whose hash
    /// is the blake3 digest of the payload.
    pub fn put(&self, path: &str, payload: impl Into<Bytes>) -> Meta {
        let payload = payload.into();
        let meta = Meta::blob(path::normalize(path), ContentHash::digest(&payload));
        self.put_payload(&meta.path, payload);
        self.publish(meta.clone());
        meta
    }

    /// Stores `payload` at `path` without publishing anything.
    pub fn put_payload(&self, path: &str, payload: impl Into<Bytes>) {
        self.inner.payloads.insert(path::normalize(path), payload.into());
    }

    /// Makes later fetches of `path` fail with [`RemoteError::NotFound`].
    pub fn remove_payload(&self, path: &str) -> Option<Bytes> {
        self.inner
            .payloads
            .remove(&path::normalize(path))
            .map(|(_, payload)| payload)
    }

    /// Ends every open watch stream of `path`.
    pub fn disconnect(&self, path: &str) {
        self.inner.watchers.remove(&path::normalize(path));
    }

    /// Holds back fetches until [`MemoryRemote::resume_fetches`].
    pub fn pause_fetches(&self) {
        self.inner.paused.send_replace(true);
    }

    pub fn resume_fetches(&self) {
        self.inner.paused.send_replace(false);
    }

    /// Number of watch streams ever opened for `path`.
    pub fn watch_count(&self, path: &str) -> usize {
        count(&self.inner.watch_counts, path)
    }

    /// Number of watch streams for `path` whose consumer is still alive.
    pub fn active_watches(&self, path: &str) -> usize {
        self.inner
            .watchers
            .get(&path::normalize(path))
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Number of fetches started for `path`.
    pub fn fetch_count(&self, path: &str) -> usize {
        count(&self.inner.fetch_counts, path)
    }
}

fn count(counts: &DashMap<String, usize>, path: &str) -> usize {
    counts.get(&path::normalize(path)).map(|n| *n).unwrap_or(0)
}

#[async_trait::async_trait]
impl Remote for MemoryRemote {
    async fn watch(&self, path: &str) -> RemoteResult<WatchStream> {
        let path = path::normalize(path);
        *self.inner.watch_counts.entry(path.clone()).or_default() += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        // replay and registration happen under the watcher lock so a
        // concurrent publish lands either in the replay or after it
        let mut senders = self.inner.watchers.entry(path.clone()).or_default();
        let mut children: Vec<Meta> = self
            .inner
            .metas
            .iter()
            .filter(|meta| path::parent(meta.key()).as_deref() == Some(path.as_str()))
            .map(|meta| meta.value().clone())
            .collect();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        for meta in children {
            // the receiver is still in scope, sending cannot fail
            let _ = tx.send(Ok(WatchEvent::from(meta)));
        }
        senders.push(tx);
        drop(senders);

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn fetch_binary(&self, path: &str) -> RemoteResult<Bytes> {
        let path = path::normalize(path);
        *self.inner.fetch_counts.entry(path.clone()).or_default() += 1;

        let mut paused = self.inner.paused.subscribe();
        if paused.wait_for(|paused| !*paused).await.is_err() {
            return Err(RemoteError::Io(std::io::Error::other("fetch gate closed")));
        }
        self.inner
            .payloads
            .get(&path)
            .map(|payload| payload.clone())
            .ok_or(RemoteError::NotFound(path))
    }

    fn verify(&self, hash: &ContentHash, payload: &[u8]) -> bool {
        !self.inner.verify_hashes || ContentHash::digest(payload) == *hash
    }
}
