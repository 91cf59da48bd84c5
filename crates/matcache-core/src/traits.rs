//! Collaborator contracts consumed by the materialization cache.
//!
//! - [`Expander`]: turns stored descriptors into expanded plans.
//! - [`CatalogService`] / [`CatalogView`]: dataset-config resolution.
//! - [`StatusService`]: external-reflection sync state.
//! - [`MaterializationStore`]: durable home of materialization records.
//! - [`CacheMetricsSink`]: telemetry callbacks.
//! - [`TimeSource`]: injectable wall clock for retry-window arithmetic.
//!
//! All traits are dyn-compatible and `Send + Sync` so the cache can hold them
//! behind `Arc<dyn _>` and be shared across planner and refresh threads.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{CacheResult, StoreError};
use crate::types::{
    DatasetConfig, DatasetKey, EntryId, ExpandedDescriptor, ExternalReflection, Materialization,
    RawDescriptor,
};

// ─── Expander ───────────────────────────────────────────────────────────────

/// Provider of the current materialization set and the expansion machinery.
///
/// # Contract
///
/// - `Ok(None)` from an expansion method means the plan could not be rebuilt
///   for a non-fatal reason; the entry is dropped from the pass without retry
///   tracking.
/// - `Err(_)` is retryable. A [`CacheError::SourceDown`] classification marks
///   the failure as an upstream outage with unbounded retries.
///
/// [`CacheError::SourceDown`]: crate::error::CacheError::SourceDown
pub trait Expander: Send + Sync {
    /// Current set of valid internal materializations.
    fn valid_materializations(&self) -> Vec<Materialization>;

    /// Current set of external reflections.
    fn external_reflections(&self) -> Vec<ExternalReflection>;

    /// Resolve the stored descriptor for an external reflection.
    fn descriptor(
        &self,
        reflection: &ExternalReflection,
        catalog: &dyn CatalogView,
    ) -> CacheResult<Option<RawDescriptor>>;

    /// Expand a stored descriptor's plan against live catalog metadata.
    fn expand_descriptor(
        &self,
        descriptor: &RawDescriptor,
        catalog: &dyn CatalogView,
    ) -> CacheResult<Option<ExpandedDescriptor>>;

    /// Expand an internal materialization's plan against live catalog
    /// metadata.
    fn expand(
        &self,
        materialization: &Materialization,
        catalog: &dyn CatalogView,
    ) -> CacheResult<Option<ExpandedDescriptor>>;
}

// ─── Catalog ────────────────────────────────────────────────────────────────

/// A point-in-time view of the catalog.
///
/// Each refresh pass acquires one view, resolves dataset configs through it,
/// and clears its per-dataset caches when the pass completes. The view is
/// exclusive to the pass that acquired it.
pub trait CatalogView: Send + Sync {
    /// Current config for a dataset, or `None` if the dataset is gone.
    fn dataset_config(&self, key: &DatasetKey) -> Option<DatasetConfig>;

    /// Drop any per-dataset caches held by this view.
    fn clear_dataset_caches(&self);
}

/// Source of fresh catalog views.
pub trait CatalogService: Send + Sync {
    /// A fresh system-level view. Acquired once per refresh pass and once per
    /// direct update.
    fn system_view(&self) -> Arc<dyn CatalogView>;
}

// ─── Status service ─────────────────────────────────────────────────────────

/// Configuration sync state of an external reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigStatus {
    /// Reflection config matches the external system.
    Ok,
    /// External system has drifted; the cached plan must be re-expanded.
    OutOfSync,
    /// State could not be determined.
    Unknown,
}

/// Status report for an external reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalReflectionStatus {
    /// Config sync state.
    pub config_status: ConfigStatus,
}

/// Reports external-reflection sync state.
pub trait StatusService: Send + Sync {
    /// Current status of the given external reflection.
    fn external_reflection_status(&self, id: &EntryId) -> ExternalReflectionStatus;
}

// ─── Materialization store ──────────────────────────────────────────────────

/// Durable store of materialization records. The only external mutable
/// resource the cache touches, and only to escalate exhausted retries to the
/// `Failed` state.
pub trait MaterializationStore: Send + Sync {
    /// Load the current stored form of a materialization.
    fn get(&self, id: &EntryId) -> Result<Materialization, StoreError>;

    /// Persist a materialization. Fails with
    /// [`StoreError::ConcurrentModification`] when another writer saved the
    /// same record first.
    fn save(&self, materialization: &Materialization) -> Result<(), StoreError>;
}

// ─── Metrics sink ───────────────────────────────────────────────────────────

/// Telemetry callbacks for cache activity.
///
/// Implementations must be non-blocking and fast; callbacks are invoked from
/// the refresh path.
pub trait CacheMetricsSink: fmt::Debug + Send + Sync {
    /// A refresh pass completed. `initial` is true for the cold-start pass.
    fn on_sync(&self, elapsed: Duration, initial: bool);

    /// An expansion attempt failed. `reason` is the stable error-kind label.
    fn on_expansion_error(&self, reason: &'static str, source_down: bool);

    /// An entry exhausted its retries and was escalated to the store.
    fn on_retry_exhausted(&self, reason: &'static str, source_down: bool);

    /// The published snapshot changed size.
    fn on_entries(&self, count: usize);
}

/// Shared handle for dynamic metrics sinks.
pub type SharedMetricsSink = Arc<dyn CacheMetricsSink>;

/// No-op sink used when no telemetry consumer is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpCacheMetrics;

impl CacheMetricsSink for NoOpCacheMetrics {
    fn on_sync(&self, _: Duration, _: bool) {}

    fn on_expansion_error(&self, _: &'static str, _: bool) {}

    fn on_retry_exhausted(&self, _: &'static str, _: bool) {}

    fn on_entries(&self, _: usize) {}
}

// ─── Time source ────────────────────────────────────────────────────────────

/// Injectable wall clock. The retry ledger stores first-failure timestamps in
/// epoch milliseconds so the retry window survives process-local clock
/// abstractions in tests.
pub trait TimeSource: fmt::Debug + Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// System wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

impl TimeSource for WallClock {
    fn now_ms(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
            Err(_) => 0,
        }
    }
}
