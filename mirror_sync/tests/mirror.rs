//! End-to-end reads through the `Mirror` facade over a `MemoryRemote`.
//!
//! It validates:
//! 1.  **Mirroring:** a subscribed directory shows up in the tree snapshot and
//!     its blobs are fetched when requested.
//! 2.  **Synchronous reads:** `read_file` stays empty until the fetch lands.
//! 3.  **Memoization:** repeated transforms over one content hash return the
//!     same `Arc`.
//! 4.  **Listings:** `read_dir` reports entries and sync progress.
//! 5.  **Concurrency:** many watch loops publishing disjoint subtrees keep
//!     every write.

use bytes::Bytes;
use mirror_core::{Depth, Meta, testutil::eventually};
use mirror_remote_memory::MemoryRemote;
use mirror_sync::{Mirror, MirrorConfig, SubscribeOptions, SyncStatus, Transform};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize, PartialEq)]
struct Contact {
    id: u32,
    name: String,
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn json_file_is_mirrored_and_memoized() -> anyhow::Result<()> {
    let remote = MemoryRemote::new();
    remote.pause_fetches();
    let mirror = Mirror::new(remote.clone(), MirrorConfig::default())?;

    mirror.subscribe("Name", SubscribeOptions::new().unbounded().blobs(true));
    remote.put_payload("Name/c1.json", r#"{"id": 1, "name": "c1"}"#);
    remote.publish(Meta::blob("Name/c1.json", "h1"));

    // the metadata arrives while the fetch is held back
    eventually(|| mirror.status_of("Name/c1.json") == Some(SyncStatus::Syncing)).await;
    assert_eq!(mirror.get_meta("Name/c1.json"), Some(Meta::blob("Name/c1.json", "h1")));
    assert!(mirror.read_file("Name/c1.json").is_none());
    assert!(!mirror.is_synced("Name/c1.json"));

    remote.resume_fetches();
    eventually(|| mirror.is_synced("Name/c1.json")).await;
    assert_eq!(
        mirror.read_file("Name/c1.json"),
        Some(Bytes::from_static(br#"{"id": 1, "name": "c1"}"#))
    );

    let json = Transform::<serde_json::Result<Contact>>::json();
    let first = mirror.read_file_with("Name/c1.json", &json).unwrap();
    let second = mirror.read_file_with("Name/c1.json", &json).unwrap();
    assert_eq!(
        (*first).as_ref().unwrap(),
        &Contact {
            id: 1,
            name: "c1".into()
        }
    );
    assert!(Arc::ptr_eq(&first, &second), "memo must hand out the same value");
    assert_eq!(remote.fetch_count("Name/c1.json"), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blobs_are_not_fetched_unless_requested() -> anyhow::Result<()> {
    let remote = MemoryRemote::new();
    remote.put("docs/readme.md", "# hi");
    let mirror = Mirror::new(remote.clone(), MirrorConfig::default())?;

    mirror.subscribe("docs", SubscribeOptions::new());
    eventually(|| mirror.get_meta("docs/readme.md").is_some()).await;
    assert_eq!(mirror.status_of("docs/readme.md"), None);
    assert!(mirror.read_file("docs/readme.md").is_none());
    assert_eq!(remote.fetch_count("docs/readme.md"), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_dir_reports_progress() -> anyhow::Result<()> {
    let remote = MemoryRemote::new();
    remote.put("list/a.txt", "alpha");
    remote.put("list/b.txt", "beta");
    remote.publish(Meta::blob("list/c.txt", "missing"));
    let mirror = Mirror::new(remote.clone(), MirrorConfig::default())?;

    mirror.subscribe("list", SubscribeOptions::new().blobs(true));
    eventually(|| mirror.read_dir("list", Depth::ZERO).progress().synced == 2).await;
    eventually(|| mirror.status_of("list/c.txt") == Some(SyncStatus::Stale)).await;

    let view = mirror.read_dir("list", Depth::ZERO);
    let names: Vec<&str> = view.entries().iter().map(Meta::name).collect();
    assert_eq!(names, ["a.txt", "b.txt", "c.txt"]);
    assert_eq!(view.progress().total, 3);
    assert!(!view.progress().is_complete());

    let a = &view.entries()[0];
    assert_eq!(view.read(a), Some(Bytes::from_static(b"alpha")));
    assert_eq!(view.read("list/b.txt"), Some(Bytes::from_static(b"beta")));
    assert_eq!(view.read("list/c.txt"), None);
    assert_eq!(
        view.read_with(a, &Transform::text()).as_deref().map(String::as_str),
        Some("alpha")
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disjoint_subtrees_are_all_kept() -> anyhow::Result<()> {
    let remote = MemoryRemote::new();
    let mirror = Mirror::new(remote.clone(), MirrorConfig::default())?;

    for dir in 0..8 {
        mirror.subscribe(&format!("d{dir}"), SubscribeOptions::new());
    }
    eventually(|| (0..8).all(|dir| remote.active_watches(&format!("d{dir}")) == 1)).await;

    let publishers: Vec<_> = (0..8)
        .map(|dir| {
            let remote = remote.clone();
            tokio::spawn(async move {
                for file in 0..25 {
                    remote.publish(Meta::blob(format!("d{dir}/f{file}"), format!("h{dir}-{file}")));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for publisher in publishers {
        publisher.await?;
    }

    eventually(|| mirror.snapshot().len() == 8 * 25).await;
    assert_eq!(mirror.read_dir("d3", Depth::ZERO).entries().len(), 25);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_the_mirror_stops_its_watches() -> anyhow::Result<()> {
    let remote = MemoryRemote::new();
    let mirror = Mirror::new(remote.clone(), MirrorConfig::default())?;
    mirror.subscribe("a", SubscribeOptions::new());
    eventually(|| remote.active_watches("a") == 1).await;

    drop(mirror);
    eventually(|| remote.active_watches("a") == 0).await;
    Ok(())
}
