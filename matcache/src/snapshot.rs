//! Atomic holder of the published cache snapshot.
//!
//! The snapshot is an immutable map replaced wholesale by compare-and-set.
//! Readers load the current `Arc` in O(1) and may keep it as long as they
//! like; a reader that observed one snapshot is never forced onto the next.
//! Writers run a CAS-retry loop: read current, build an updated copy, swap.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use matcache_core::types::{EntryId, ExpandedDescriptor};

/// Immutable view of the cache contents at a point in time.
pub type Snapshot = HashMap<EntryId, Arc<ExpandedDescriptor>>;

/// Shared cell holding the current [`Snapshot`].
pub struct SnapshotCell {
    inner: ArcSwap<Snapshot>,
}

impl SnapshotCell {
    /// A cell holding the empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(Snapshot::new()),
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<Snapshot> {
        self.inner.load_full()
    }

    /// Atomically replace `expected` with `next`.
    ///
    /// Comparison is by `Arc` identity, not map contents. Returns false when
    /// another writer published in between; the caller rebuilds from the new
    /// current snapshot and retries. A failed swap is logged so concurrent
    /// refreshes are observable.
    #[must_use]
    pub fn compare_and_set(&self, expected: &Arc<Snapshot>, next: Arc<Snapshot>) -> bool {
        let next_len = next.len();
        let previous = self.inner.compare_and_swap(expected, next);
        let swapped = Arc::ptr_eq(&previous, expected);
        if !swapped {
            tracing::warn!(
                target: "matcache",
                expected_entries = expected.len(),
                next_entries = next_len,
                "lost snapshot compare-and-set race"
            );
        }
        swapped
    }
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SnapshotCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotCell")
            .field("entries", &self.inner.load().len())
            .finish()
    }
}
