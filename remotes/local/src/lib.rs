//! A [`Remote`] backed by a directory on the local file system.
//!
//! Watches poll: the watched directory is re-scanned every
//! [`LocalRemoteConfig::poll_interval_ms`] and changed entries are reported.
//! Removals are not reported.

use bytes::Bytes;
use futures::{StreamExt, stream};
use mirror_core::{
    ContentHash, Meta, path,
    remote::{Remote, RemoteError, RemoteResult, WatchEvent, WatchStream},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    io,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

mod scan;

use scan::Scanner;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocalRemoteConfig {
    /// Directory that the empty mirror path maps to.
    pub base_path: PathBuf,
    pub poll_interval_ms: u64,
}

impl Default for LocalRemoteConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalRemote {
    base_path: PathBuf,
    poll_interval: Duration,
    scanner: Arc<Scanner>,
}

impl LocalRemote {
    pub fn new(config: LocalRemoteConfig) -> Self {
        Self {
            base_path: config.base_path,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            scanner: Arc::default(),
        }
    }

    /// Maps a mirror path onto the file system. `.` and `..` segments are
    /// rejected so a path can never leave the base directory.
    fn resolve(&self, rel: &str) -> RemoteResult<PathBuf> {
        let mut resolved = self.base_path.clone();
        for segment in path::segments(rel) {
            if segment == "." || segment == ".." {
                return Err(RemoteError::InvalidPath(rel.to_owned()));
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }

    async fn scan(&self, rel: &str) -> RemoteResult<Vec<Meta>> {
        let dir = self.resolve(rel)?;
        self.scanner
            .scan(&dir, rel)
            .await
            .map_err(|err| not_found_or(err, rel))
    }
}

fn not_found_or(err: io::Error, rel: &str) -> RemoteError {
    match err.kind() {
        io::ErrorKind::NotFound => RemoteError::NotFound(rel.to_owned()),
        _ => RemoteError::Io(err),
    }
}

/// State carried between polls of one watch.
struct Poll {
    remote: LocalRemote,
    rel: String,
    seen: HashMap<String, ContentHash>,
    failed: bool,
}

impl Poll {
    /// Waits one interval, re-scans and returns the entries whose hash changed.
    async fn next(mut self) -> Option<(Vec<RemoteResult<WatchEvent>>, Self)> {
        if self.failed {
            return None;
        }
        tokio::time::sleep(self.remote.poll_interval).await;
        match self.remote.scan(&self.rel).await {
            Ok(metas) => {
                let changed: Vec<_> = metas
                    .into_iter()
                    .filter(|meta| self.seen.get(&meta.path) != Some(&meta.hash))
                    .collect();
                for meta in &changed {
                    tracing::debug!(path = %meta.path, hash = meta.hash.fmt_short(), "changed");
                    self.seen.insert(meta.path.clone(), meta.hash.clone());
                }
                let events = changed.into_iter().map(|meta| Ok(meta.into())).collect();
                Some((events, self))
            }
            Err(err) => {
                self.failed = true;
                Some((vec![Err(err)], self))
            }
        }
    }
}

#[async_trait::async_trait]
impl Remote for LocalRemote {
    async fn watch(&self, path: &str) -> RemoteResult<WatchStream> {
        let rel = path::normalize(path);
        let initial = self.scan(&rel).await?;
        tracing::debug!(path = %rel, entries = initial.len(), "watching directory");

        let poll = Poll {
            remote: self.clone(),
            seen: initial
                .iter()
                .map(|meta| (meta.path.clone(), meta.hash.clone()))
                .collect(),
            rel,
            failed: false,
        };
        let initial = stream::iter(initial.into_iter().map(|meta| Ok(WatchEvent::from(meta))));
        let updates = stream::unfold(poll, Poll::next).flat_map(stream::iter);
        Ok(initial.chain(updates).boxed())
    }

    async fn fetch_binary(&self, path: &str) -> RemoteResult<Bytes> {
        let rel = path::normalize(path);
        let file = self.resolve(&rel)?;
        let payload = tokio::fs::read(&file)
            .await
            .map_err(|err| not_found_or(err, &rel))?;
        Ok(Bytes::from(payload))
    }

    /// A file rewritten after its scan hashes differently; the next poll
    /// reports the new hash.
    fn verify(&self, hash: &ContentHash, payload: &[u8]) -> bool {
        ContentHash::digest(payload) == *hash
    }
}
