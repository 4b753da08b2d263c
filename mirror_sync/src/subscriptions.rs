//! Reference-counted registry of watched paths.
//!
//! At most one subscription exists per path. The first caller's options
//! govern it until it is released; later callers only add references.

use dashmap::{DashMap, mapref::entry::Entry};
use mirror_core::Depth;
use serde::Serialize;
use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio_util::sync::CancellationToken;

/// Options for [`crate::Mirror::subscribe`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Recursion budget for automatic fan-out into subtrees.
    pub depth: Depth,
    /// Also download blob payloads.
    pub blobs: bool,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(mut self, depth: impl Into<Depth>) -> Self {
        self.depth = depth.into();
        self
    }

    pub fn unbounded(mut self) -> Self {
        self.depth = Depth::Unbounded;
        self
    }

    pub fn blobs(mut self, blobs: bool) -> Self {
        self.blobs = blobs;
        self
    }
}

/// Read-only view of a subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    pub path: String,
    #[serde(serialize_with = "serialize_depth")]
    pub depth: Depth,
    pub want_blobs: bool,
    pub ref_count: usize,
    /// False once the watch loop stopped on its own.
    pub running: bool,
}

fn serialize_depth<S: serde::Serializer>(depth: &Depth, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(depth)
}

#[derive(Debug)]
struct Subscription {
    options: SubscribeOptions,
    ref_count: usize,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    /// Children this subscription holds one reference on.
    children: BTreeSet<String>,
}

/// Everything a new watch loop needs from the registry.
#[derive(Debug)]
pub(crate) struct WatchTicket {
    pub path: String,
    pub options: SubscribeOptions,
    pub cancel: CancellationToken,
    pub running: Arc<AtomicBool>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Release {
    Unknown,
    Retained(usize),
    /// The last reference is gone and the watch was cancelled.
    Cancelled { children: Vec<String> },
}

#[derive(Debug, Default)]
pub struct SubscriptionManager {
    entries: DashMap<String, Subscription>,
}

impl SubscriptionManager {
    /// Adds a reference to `path`. Returns a ticket when a watch loop has
    /// to be (re)started for it.
    pub(crate) fn acquire(&self, path: &str, options: SubscribeOptions) -> Option<WatchTicket> {
        match self.entries.entry(path.to_owned()) {
            Entry::Occupied(mut slot) => {
                let sub = slot.get_mut();
                sub.ref_count += 1;
                if options != sub.options {
                    tracing::debug!(
                        path,
                        depth = %sub.options.depth,
                        blobs = sub.options.blobs,
                        "subscription exists; keeping its original options"
                    );
                }
                if sub.running.load(Ordering::Acquire) {
                    return None;
                }
                // the previous loop stopped on its own: start a new one
                sub.cancel = CancellationToken::new();
                sub.running = Arc::new(AtomicBool::new(true));
                Some(WatchTicket {
                    path: path.to_owned(),
                    options: sub.options,
                    cancel: sub.cancel.clone(),
                    running: sub.running.clone(),
                })
            }
            Entry::Vacant(slot) => {
                let cancel = CancellationToken::new();
                let running = Arc::new(AtomicBool::new(true));
                slot.insert(Subscription {
                    options,
                    ref_count: 1,
                    cancel: cancel.clone(),
                    running: running.clone(),
                    children: BTreeSet::new(),
                });
                Some(WatchTicket {
                    path: path.to_owned(),
                    options,
                    cancel,
                    running,
                })
            }
        }
    }

    /// Drops a reference to `path`, cancelling the watch at zero.
    pub(crate) fn release(&self, path: &str) -> Release {
        let Entry::Occupied(mut slot) = self.entries.entry(path.to_owned()) else {
            return Release::Unknown;
        };
        let sub = slot.get_mut();
        sub.ref_count -= 1;
        if sub.ref_count > 0 {
            return Release::Retained(sub.ref_count);
        }
        let sub = slot.remove();
        sub.cancel.cancel();
        Release::Cancelled {
            children: sub.children.into_iter().collect(),
        }
    }

    /// Marks the watch loop owning `running` as stopped. The flag is cleared
    /// while holding the entry for `path`, so a concurrent [`Self::acquire`]
    /// either sees the loop running and counts on it, or restarts it.
    pub(crate) fn mark_stopped(&self, path: &str, running: &AtomicBool) {
        let _entry = self.entries.get(path);
        running.store(false, Ordering::Release);
    }

    /// Records that `parent` fanned out to `child`. Returns `true` only the
    /// first time, and only while `parent` is still subscribed.
    pub(crate) fn record_child(&self, parent: &str, child: &str) -> bool {
        match self.entries.get_mut(parent) {
            Some(mut sub) => sub.children.insert(child.to_owned()),
            None => false,
        }
    }

    pub fn get(&self, path: &str) -> Option<SubscriptionInfo> {
        self.entries.get(path).map(|sub| info(sub.key(), sub.value()))
    }

    /// All subscriptions, ordered by path.
    pub fn list(&self) -> Vec<SubscriptionInfo> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|sub| info(sub.key(), sub.value()))
            .collect();
        all.sort_by(|a, b| a.path.cmp(&b.path));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cancels and forgets every subscription.
    pub(crate) fn cancel_all(&self) {
        self.entries.retain(|_, sub| {
            sub.cancel.cancel();
            false
        });
    }
}

fn info(path: &str, sub: &Subscription) -> SubscriptionInfo {
    SubscriptionInfo {
        path: path.to_owned(),
        depth: sub.options.depth,
        want_blobs: sub.options.blobs,
        ref_count: sub.ref_count,
        running: sub.running.load(Ordering::Acquire),
    }
}
