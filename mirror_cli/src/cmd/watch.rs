use std::{sync::Arc, time::Duration};

use anyhow::Result;
use mirror_core::{Depth, Meta, TreeIndex};
use mirror_sync::{Mirror, Progress, SubscribeOptions, SyncStatus};

pub fn options(depth: Option<u32>, unbounded: bool, blobs: bool) -> SubscribeOptions {
    let options = SubscribeOptions::new().blobs(blobs);
    match (unbounded, depth) {
        (true, _) => options.unbounded(),
        (false, Some(depth)) => options.depth(depth),
        (false, None) => options,
    }
}

pub async fn run_watch(mirror: &Mirror, path: &str, options: SubscribeOptions) -> Result<()> {
    mirror.subscribe(path, options);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let mut shown: Option<(Arc<TreeIndex>, Progress)> = None;

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal?;
                break;
            }
            _ = ticker.tick() => {
                let snapshot = mirror.snapshot();
                let view = mirror.read_dir(path, Depth::Unbounded);
                let progress = view.progress();
                let unchanged = shown
                    .as_ref()
                    .is_some_and(|(tree, seen)| Arc::ptr_eq(tree, &snapshot) && *seen == progress);
                if unchanged {
                    continue;
                }
                println!("--- {} ({}/{} synced)", display_path(path), progress.synced, progress.total);
                for meta in view.entries() {
                    println!("{} {}", status_mark(mirror, meta), meta.path);
                }
                shown = Some((snapshot, progress));
            }
        }
    }

    mirror.unsubscribe(path);
    Ok(())
}

fn status_mark(mirror: &Mirror, meta: &Meta) -> &'static str {
    match mirror.status(&meta.hash) {
        Some(SyncStatus::Fresh) => "[ok]   ",
        Some(SyncStatus::Syncing) => "[..]   ",
        Some(SyncStatus::Stale) => "[fail] ",
        None => "[meta] ",
    }
}

pub(crate) fn display_path(path: &str) -> String {
    let path = mirror_core::path::normalize(path);
    if path.is_empty() {
        ".".to_string()
    } else {
        format!("./{}", path)
    }
}
