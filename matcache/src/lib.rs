//! Concurrently refreshed cache of expanded materialization descriptors.
//!
//! The planner matches incoming queries against precomputed results
//! (reflections). Expanding a stored descriptor into a plan tree bound to
//! live catalog metadata is expensive, so this crate keeps an atomic,
//! consistent snapshot of expanded descriptors that a background refresher
//! reconciles against the provider's current set:
//!
//! - [`SnapshotCell`]: atomic holder of the immutable id-to-descriptor map,
//!   replaced wholesale by compare-and-set.
//! - [`RetryLedger`]: per-entry first-failure timestamps with time-based
//!   expiry, driving the bounded retry policy.
//! - [`InitBarrier`]: one-shot latch readers block on until the first refresh
//!   completes.
//! - [`MaterializationCache`]: the public surface, with the reconciliation
//!   pass, change detection, and FAILED escalation behind it.
//! - [`CacheMetrics`]: atomic recorder for the `mat_cache_*` telemetry.
//!
//! Collaborator contracts, the descriptor data model, configuration, and
//! error types live in `matcache-core` and are re-exported here.

pub mod barrier;
pub mod cache;
mod detect;
pub mod metrics;
mod refresh;
pub mod retry;
pub mod snapshot;

pub use barrier::InitBarrier;
pub use cache::{CacheDeps, MaterializationCache};
pub use metrics::{
    CacheMetrics, CacheMetricsSnapshot, MAT_CACHE_ENTRIES, MAT_CACHE_ERRORS,
    MAT_CACHE_RETRY_FAILED, MAT_CACHE_SYNC,
};
pub use retry::RetryLedger;
pub use snapshot::{Snapshot, SnapshotCell};

pub use matcache_core::config::{CacheOptions, OptionProvider};
pub use matcache_core::error::{CacheError, CacheResult, StoreError};
pub use matcache_core::plan::{ExpandedPlan, PlanNode, ScanLeaf, ScanSource};
pub use matcache_core::traits::{
    CacheMetricsSink, CatalogService, CatalogView, ConfigStatus, Expander,
    ExternalReflectionStatus, MaterializationStore, NoOpCacheMetrics, SharedMetricsSink,
    StatusService, TimeSource, WallClock,
};
pub use matcache_core::types::{
    DatasetConfig, DatasetKey, EntryId, ExpandedDescriptor, ExternalReflection, Failure,
    Materialization, MaterializationState, RawDescriptor, RecordSchema, SchemaField,
};
