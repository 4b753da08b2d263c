//! One watch loop per running subscription.

use crate::{
    MirrorError, MirrorResult,
    api::Shared,
    subscriptions::{SubscribeOptions, WatchTicket},
};
use bytes::Bytes;
use futures::StreamExt;
use mirror_core::{EntryKind, Meta, Remote, WatchStream, path};
use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Consumes the remote event stream of one subscribed path.
///
/// The loop only holds a weak reference to the engine, so dropping the last
/// [`crate::Mirror`] ends it at the next event.
pub(crate) struct WatchLoop {
    shared: Weak<Shared>,
    remote: Arc<dyn Remote>,
    path: String,
    options: SubscribeOptions,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
}

impl WatchLoop {
    pub fn new(shared: &Arc<Shared>, ticket: WatchTicket) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            remote: shared.remote.clone(),
            path: ticket.path,
            options: ticket.options,
            cancel: ticket.cancel,
            running: ticket.running,
        }
    }

    pub async fn run(self) {
        info!(
            path = %self.path,
            depth = %self.options.depth,
            blobs = self.options.blobs,
            "watch started"
        );
        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            opened = self.remote.watch(&self.path) => Some(opened),
        };
        match opened {
            Some(Ok(stream)) => self.consume(stream).await,
            Some(Err(err)) => warn!(path = %self.path, %err, "failed to open watch"),
            None => {}
        }
        match self.shared.upgrade() {
            Some(shared) => shared.subscriptions.mark_stopped(&self.path, &self.running),
            None => self.running.store(false, Ordering::Release),
        }
        info!(path = %self.path, cancelled = self.cancel.is_cancelled(), "watch stopped");
    }

    async fn consume(&self, mut stream: WatchStream) {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                next = stream.next() => next,
            };
            match next {
                Some(Ok(event)) => {
                    let Some(shared) = self.shared.upgrade() else {
                        return;
                    };
                    shared.apply_event(&self.path, self.options, event.meta);
                }
                Some(Err(err)) => {
                    warn!(path = %self.path, %err, "watch stream failed");
                    return;
                }
                None => {
                    debug!(path = %self.path, "watch stream ended");
                    return;
                }
            }
        }
    }
}

impl Shared {
    /// Applies one watch event observed under the subscription at `root`.
    pub(crate) fn apply_event(self: &Arc<Self>, root: &str, options: SubscribeOptions, meta: Meta) {
        let meta = Meta {
            path: path::normalize(&meta.path),
            ..meta
        };
        if self.tree.insert(&meta) {
            debug!(path = %meta.path, hash = meta.hash.fmt_short(), kind = ?meta.kind, "tree updated");
        }
        match meta.kind {
            EntryKind::Tree => self.fan_out(root, options, &meta),
            EntryKind::Blob if options.blobs => self.start_fetch(meta),
            EntryKind::Blob => {}
        }
    }

    fn fan_out(self: &Arc<Self>, root: &str, options: SubscribeOptions, meta: &Meta) {
        let Some(relative) = path::relative_depth(root, &meta.path) else {
            debug!(root, path = %meta.path, "tree outside of subscribed root");
            return;
        };
        if relative == 0 {
            return;
        }
        let Some(depth) = options.depth.remaining_after(relative) else {
            return;
        };
        if self.subscriptions.record_child(root, &meta.path) {
            debug!(parent = root, path = %meta.path, %depth, "fanning out");
            self.subscribe(&meta.path, SubscribeOptions { depth, ..options });
        }
    }

    /// Fetches the payload of `meta` in the background unless its hash is
    /// already fresh or in flight.
    fn start_fetch(self: &Arc<Self>, meta: Meta) {
        if !self.cache.begin_fetch(&meta.hash) {
            trace!(path = %meta.path, hash = meta.hash.fmt_short(), "blob cached or in flight");
            return;
        }
        let remote = self.remote.clone();
        let shared = Arc::downgrade(self);
        let timeout = self.config.fetch_timeout();
        self.runtime.spawn(async move {
            let fetched = fetch(remote.as_ref(), &meta.path, timeout)
                .await
                .and_then(|payload| {
                    if remote.verify(&meta.hash, &payload) {
                        Ok(payload)
                    } else {
                        Err(MirrorError::HashMismatch {
                            path: meta.path.clone(),
                            hash: meta.hash.clone(),
                        })
                    }
                });
            // an engine dropped mid-fetch has nowhere to store the result
            if let Some(shared) = shared.upgrade() {
                shared.finish_fetch(&meta, fetched);
            }
        });
    }

    fn finish_fetch(&self, meta: &Meta, fetched: MirrorResult<Bytes>) {
        match fetched {
            Ok(payload) => {
                self.cache.complete(&meta.hash, payload.clone());
                let woken = self.waiters.resolve(&meta.hash, &payload);
                debug!(
                    path = %meta.path,
                    hash = meta.hash.fmt_short(),
                    size = payload.len(),
                    woken,
                    "blob fetched"
                );
            }
            Err(err) => {
                self.cache.fail(&meta.hash);
                warn!(path = %meta.path, hash = meta.hash.fmt_short(), %err, "blob fetch failed");
            }
        }
    }
}

/// Fetches `path` from `remote`, giving up after `timeout`.
pub(crate) async fn fetch(
    remote: &dyn Remote,
    path: &str,
    timeout: Option<Duration>,
) -> MirrorResult<Bytes> {
    let Some(limit) = timeout else {
        return Ok(remote.fetch_binary(path).await?);
    };
    match tokio::time::timeout(limit, remote.fetch_binary(path)).await {
        Ok(fetched) => Ok(fetched?),
        Err(_) => Err(MirrorError::Timeout {
            path: path.to_owned(),
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
