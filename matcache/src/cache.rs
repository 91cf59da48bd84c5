//! The materialization cache: public surface and snapshot lifecycle.
//!
//! Holds pre-expanded query-plan descriptors so the planner can match
//! incoming queries against precomputed results without re-expanding every
//! stored plan. A scheduler drives [`MaterializationCache::refresh`]; planner
//! threads read through the snapshot-consistent lookup methods. All writers
//! go through the snapshot cell's compare-and-set, so readers always observe
//! a fully-built map and a linearizable sequence of snapshot values.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use matcache_core::config::OptionProvider;
use matcache_core::error::{CacheError, CacheResult};
use matcache_core::traits::{
    CacheMetricsSink as _, CatalogService, Expander, MaterializationStore, NoOpCacheMetrics,
    SharedMetricsSink, StatusService, TimeSource, WallClock,
};
use matcache_core::types::{EntryId, ExpandedDescriptor, Materialization};

use crate::barrier::InitBarrier;
use crate::retry::RetryLedger;
use crate::snapshot::{Snapshot, SnapshotCell};

/// Ceiling on how long a direct [`update`](MaterializationCache::update)
/// waits for the cold-start sync before proceeding anyway.
const UPDATE_BARRIER_WAIT: Duration = Duration::from_secs(600);

/// Collaborators the cache is wired to.
pub struct CacheDeps {
    /// Provider of the current materialization set and expansion machinery.
    pub expander: Arc<dyn Expander>,
    /// External-reflection sync state.
    pub status: Arc<dyn StatusService>,
    /// Source of fresh catalog views.
    pub catalog: Arc<dyn CatalogService>,
    /// Durable materialization store, used only for FAILED escalation.
    pub store: Arc<dyn MaterializationStore>,
    /// Source of the current tunables.
    pub options: Arc<dyn OptionProvider>,
}

/// Concurrently refreshed cache of expanded materialization descriptors.
pub struct MaterializationCache {
    pub(crate) expander: Arc<dyn Expander>,
    pub(crate) status: Arc<dyn StatusService>,
    pub(crate) catalog: Arc<dyn CatalogService>,
    pub(crate) store: Arc<dyn MaterializationStore>,
    pub(crate) options: Arc<dyn OptionProvider>,
    pub(crate) metrics: SharedMetricsSink,
    pub(crate) time: Arc<dyn TimeSource>,
    pub(crate) cell: SnapshotCell,
    pub(crate) ledger: RetryLedger,
    pub(crate) barrier: InitBarrier,
}

impl MaterializationCache {
    /// Build a cache with no telemetry sink and the system wall clock.
    #[must_use]
    pub fn new(deps: CacheDeps) -> Self {
        Self::with_instrumentation(deps, Arc::new(NoOpCacheMetrics), Arc::new(WallClock))
    }

    /// Build a cache with an explicit metrics sink and time source.
    #[must_use]
    pub fn with_instrumentation(
        deps: CacheDeps,
        metrics: SharedMetricsSink,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let ledger_ttl = deps.options.cache_options().ledger_ttl();
        Self {
            expander: deps.expander,
            status: deps.status,
            catalog: deps.catalog,
            store: deps.store,
            options: deps.options,
            metrics,
            ledger: RetryLedger::new(ledger_ttl, Arc::clone(&time)),
            time,
            cell: SnapshotCell::new(),
            barrier: InitBarrier::new(),
        }
    }

    /// Run one full reconciliation pass.
    ///
    /// Diffs the provider's current set against the published snapshot,
    /// expands new and changed entries, reuses the rest, and atomically
    /// swaps the rebuilt map in. The init barrier opens when the first pass
    /// completes, whether or not every entry expanded. Safe to invoke from
    /// multiple threads; a lost swap rebuilds from the winner's snapshot.
    pub fn refresh(&self) {
        let initial = !self.barrier.is_open();
        let started = Instant::now();
        // Opens the barrier and records the sync timer even if a collaborator
        // panics mid-pass.
        let _guard = SyncGuard {
            cache: self,
            started,
            initial,
        };

        let catalog = self.catalog.system_view();
        loop {
            let old = self.cell.load();
            let updated = self.build_updated(&old, catalog.as_ref());
            let count = updated.len();
            if self.cell.compare_and_set(&old, Arc::new(updated)) {
                self.metrics.on_entries(count);
                break;
            }
        }
        catalog.clear_dataset_caches();

        if initial {
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            tracing::info!(
                target: "matcache",
                elapsed_ms,
                entries = self.cell.load().len(),
                "cold materialization cache sync complete"
            );
        }
    }

    /// Swap in the empty snapshot. The retry ledger and the init barrier are
    /// left untouched.
    pub fn reset(&self) {
        loop {
            let old = self.cell.load();
            if self.cell.compare_and_set(&old, Arc::new(Snapshot::new())) {
                break;
            }
        }
        self.metrics.on_entries(0);
    }

    /// The descriptor for `id` in the current snapshot. Non-blocking.
    #[must_use]
    pub fn get(&self, id: &EntryId) -> Option<Arc<ExpandedDescriptor>> {
        self.cell.load().get(id).cloned()
    }

    /// Whether `id` is present in the current snapshot. Non-blocking.
    #[must_use]
    pub fn contains(&self, id: &EntryId) -> bool {
        self.cell.load().contains_key(id)
    }

    /// All descriptors in the current snapshot.
    ///
    /// Blocks until the first refresh completes, up to the configured init
    /// timeout.
    ///
    /// # Errors
    ///
    /// [`CacheError::InitTimeout`] when the barrier does not open in time.
    pub fn get_all(&self) -> CacheResult<Vec<Arc<ExpandedDescriptor>>> {
        let timeout = self.options.cache_options().init_timeout();
        if !self.barrier.wait_timeout(timeout) {
            return Err(CacheError::InitTimeout {
                waited_secs: timeout.as_secs(),
            });
        }
        Ok(self.cell.load().values().cloned().collect())
    }

    /// Remove `id` from the snapshot. Returns immediately when the id is
    /// absent. The retry ledger is not touched.
    pub fn invalidate(&self, id: &EntryId) {
        loop {
            let old = self.cell.load();
            if !old.contains_key(id) {
                break;
            }
            let mut updated = Snapshot::clone(&old);
            updated.remove(id);
            let count = updated.len();
            if self.cell.compare_and_set(&old, Arc::new(updated)) {
                self.metrics.on_entries(count);
                break;
            }
        }
    }

    /// Expand `materialization` and insert it into the snapshot immediately,
    /// ahead of the next scheduled refresh.
    ///
    /// Waits up to ten minutes for the cold-start sync so the insert does not
    /// race its compare-and-set loop, then proceeds either way. Expansion
    /// runs against a fresh catalog view outside the swap loop. An absent
    /// expansion result is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates the expansion failure, unlike the refresh path which
    /// recovers per-entry failures locally.
    pub fn update(&self, materialization: &Materialization) -> CacheResult<()> {
        let _ = self.barrier.wait_timeout(UPDATE_BARRIER_WAIT);

        let catalog = self.catalog.system_view();
        let Some(descriptor) = self.expander.expand(materialization, catalog.as_ref())? else {
            return Ok(());
        };
        let descriptor = Arc::new(descriptor);

        loop {
            let old = self.cell.load();
            let mut updated = Snapshot::clone(&old);
            updated.insert(materialization.id.clone(), Arc::clone(&descriptor));
            let count = updated.len();
            if self.cell.compare_and_set(&old, Arc::new(updated)) {
                self.metrics.on_entries(count);
                break;
            }
        }
        Ok(())
    }

    /// Whether readers can rely on the cache.
    ///
    /// True when the cache is disabled (planning falls through to direct
    /// expansion) or once the first refresh has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        if !self.options.cache_options().enabled {
            return true;
        }
        self.barrier.is_open()
    }

    /// Whether `id` currently has a pending retry record. Diagnostic.
    #[must_use]
    pub fn has_retry_record(&self, id: &EntryId) -> bool {
        self.ledger.contains(id)
    }

    /// Number of pending retry records. Diagnostic.
    #[must_use]
    pub fn retry_record_count(&self) -> usize {
        self.ledger.len()
    }
}

impl fmt::Debug for MaterializationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaterializationCache")
            .field("entries", &self.cell.load().len())
            .field("initialized", &self.barrier.is_open())
            .field("retry_records", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

/// Opens the init barrier and records the sync timer when a refresh pass
/// unwinds, mirroring a `finally` around the whole pass.
struct SyncGuard<'a> {
    cache: &'a MaterializationCache,
    started: Instant,
    initial: bool,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.cache.barrier.open();
        self.cache
            .metrics
            .on_sync(self.started.elapsed(), self.initial);
    }
}
