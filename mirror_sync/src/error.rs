use mirror_core::{ContentHash, RemoteError};

pub type MirrorResult<T> = std::result::Result<T, MirrorError>;

#[derive(thiserror::Error, Debug)]
pub enum MirrorError {
    /// No metadata is known for the path (or the remote reports it missing).
    #[error("not found: {0}")]
    NotFound(String),
    #[error("fetch of {path} timed out after {after_ms}ms")]
    Timeout { path: String, after_ms: u64 },
    /// The fetched bytes do not match the announced hash, usually because
    /// the remote changed again before the fetch.
    #[error("payload of {path} does not match hash {hash}")]
    HashMismatch { path: String, hash: ContentHash },
    /// The mirror was shut down while the read was pending.
    #[error("mirror was shut down")]
    Closed,
    #[error("mirror must be created inside a tokio runtime")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
    #[error(transparent)]
    Remote(RemoteError),
}

impl From<RemoteError> for MirrorError {
    fn from(value: RemoteError) -> Self {
        match value {
            RemoteError::NotFound(path) => MirrorError::NotFound(path),
            other => MirrorError::Remote(other),
        }
    }
}
