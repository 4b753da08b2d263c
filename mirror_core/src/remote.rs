use crate::{ContentHash, Meta};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

pub type RemoteResult<T, E = RemoteError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One change reported by a watch stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    pub meta: Meta,
}

impl From<Meta> for WatchEvent {
    fn from(meta: Meta) -> Self {
        Self { meta }
    }
}

/// Server-pushed sequence of changes for one watched path.
///
/// Dropping the stream cancels the watch.
pub type WatchStream = BoxStream<'static, RemoteResult<WatchEvent>>;

/// The remote side of a mirror.
///
/// # Semantics
///
/// - `watch` delivers the changes for `path` in revision order. Remotes
///   are not required to watch recursively; the engine subscribes to
///   nested subtrees itself.
/// - `fetch_binary` returns the current payload at `path`. Implementations
///   should map a missing path to [`RemoteError::NotFound`].
/// - The payload at a path may change between the event that announced a
///   hash and the fetch. Remotes that can recompute their hashes override
///   `verify` so the engine never caches bytes under the wrong hash.
#[async_trait]
pub trait Remote: std::fmt::Debug + Send + Sync + 'static {
    /// Opens a watch stream for `path`.
    async fn watch(&self, path: &str) -> RemoteResult<WatchStream>;

    /// Downloads the payload stored at `path`.
    async fn fetch_binary(&self, path: &str) -> RemoteResult<Bytes>;

    /// Whether `payload` is the content identified by `hash`. Opaque hashes
    /// cannot be checked, so the default accepts everything.
    fn verify(&self, hash: &ContentHash, payload: &[u8]) -> bool {
        let _ = (hash, payload);
        true
    }
}

#[async_trait]
impl<T: Remote + ?Sized> Remote for std::sync::Arc<T> {
    async fn watch(&self, path: &str) -> RemoteResult<WatchStream> {
        (**self).watch(path).await
    }

    async fn fetch_binary(&self, path: &str) -> RemoteResult<Bytes> {
        (**self).fetch_binary(path).await
    }

    fn verify(&self, hash: &ContentHash, payload: &[u8]) -> bool {
        (**self).verify(hash, payload)
    }
}
