//! One-level directory scans with cached content hashes.

use dashmap::DashMap;
use mirror_core::{ContentHash, Meta, path};
use std::{
    fs::Metadata,
    io,
    path::{Path, PathBuf},
    time::SystemTime,
};

/// What a file looked like when it was last hashed.
#[derive(Clone, Debug)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
    hash: ContentHash,
}

impl Fingerprint {
    fn matches(&self, meta: &Metadata) -> bool {
        self.len == meta.len() && self.modified == meta.modified().ok()
    }
}

/// Hashes files, skipping those whose size and mtime did not change.
#[derive(Debug, Default)]
pub(crate) struct Scanner {
    fingerprints: DashMap<PathBuf, Fingerprint>,
}

impl Scanner {
    /// Metadata of every direct child of `dir`, which is mirrored at `rel`.
    /// Sorted by path.
    pub async fn scan(&self, dir: &Path, rel: &str) -> io::Result<Vec<Meta>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut metas = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                tracing::debug!(path = ?entry.path(), "skipping non UTF-8 name");
                continue;
            };
            let child = path::join(rel, &name);
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                metas.push(Meta::tree(child, self.hash_dir(&entry.path()).await?));
            } else if file_type.is_file() {
                let meta = entry.metadata().await?;
                metas.push(Meta::blob(child, self.hash_file(&entry.path(), &meta).await?));
            }
        }
        metas.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::trace!(dir = ?dir, entries = metas.len(), "scanned");
        Ok(metas)
    }

    async fn hash_file(&self, file: &Path, meta: &Metadata) -> io::Result<ContentHash> {
        if let Some(known) = self.fingerprints.get(file) {
            if known.matches(meta) {
                return Ok(known.hash.clone());
            }
        }
        let owned = file.to_path_buf();
        let hash = tokio::task::spawn_blocking(move || -> io::Result<ContentHash> {
            let mut hasher = blake3::Hasher::new();
            hasher.update_reader(std::fs::File::open(&owned)?)?;
            Ok(ContentHash::from(hasher.finalize()))
        })
        .await
        .map_err(io::Error::other)??;
        tracing::trace!(file = ?file, hash = hash.fmt_short(), "hashed");
        self.fingerprints.insert(
            file.to_path_buf(),
            Fingerprint {
                len: meta.len(),
                modified: meta.modified().ok(),
                hash: hash.clone(),
            },
        );
        Ok(hash)
    }

    /// Hash of a directory's listing: child names, kinds and file hashes.
    /// Subdirectories contribute their name only.
    async fn hash_dir(&self, dir: &Path) -> io::Result<ContentHash> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut lines = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().await?;
            let line = if file_type.is_dir() {
                format!("d {name}\n")
            } else if file_type.is_file() {
                let meta = entry.metadata().await?;
                let hash = self.hash_file(&entry.path(), &meta).await?;
                format!("f {name} {hash}\n")
            } else {
                continue;
            };
            lines.push(line);
        }
        lines.sort();
        Ok(ContentHash::digest(lines.concat()))
    }
}
