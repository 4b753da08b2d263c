use arc_swap::ArcSwap;
use mirror_core::{Meta, TreeIndex};
use std::sync::Arc;

/// The currently published [`TreeIndex`].
///
/// Readers load the snapshot without locking. Writers derive a new snapshot
/// and publish it with compare-and-swap, retrying when another watch loop
/// published first.
#[derive(Debug, Default)]
pub(crate) struct SnapshotCell {
    current: ArcSwap<TreeIndex>,
}

impl SnapshotCell {
    pub fn load(&self) -> Arc<TreeIndex> {
        self.current.load_full()
    }

    /// Records `meta`. Returns `false` when the snapshot already held it.
    pub fn insert(&self, meta: &Meta) -> bool {
        let mut current = self.current.load_full();
        loop {
            let next = current.insert(meta.clone());
            if next.ptr_eq(&current) {
                return false;
            }
            let prev = self.current.compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&prev, &current) {
                return true;
            }
            current = Arc::clone(&prev);
        }
    }
}
