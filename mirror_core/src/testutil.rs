//! Test utilities for crates built on the mirror engine.
//!
//! Enable the `testutil` feature in a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! mirror_core = { workspace = true, features = ["testutil"] }
//! ```

use std::time::Duration;

/// How long [`eventually`] waits before failing the test.
pub const EVENTUALLY_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Polls `check` until it holds, panicking after [`EVENTUALLY_TIMEOUT`].
///
/// Engine state is updated by background tasks, so tests observe it by
/// polling instead of sleeping for a fixed time.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let polled = tokio::time::timeout(EVENTUALLY_TIMEOUT, async {
        while !check() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "condition not met within {EVENTUALLY_TIMEOUT:?}");
}
