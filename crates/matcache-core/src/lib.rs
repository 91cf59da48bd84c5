//! Core contracts, data model, and error types for the matcache
//! materialization cache.
//!
//! This crate defines the collaborator traits (`Expander`, `CatalogService`,
//! `StatusService`, `MaterializationStore`), the descriptor and plan data
//! model, configuration, and the shared error enum. It has minimal external
//! dependencies and is intended to be depended on by every other crate in the
//! workspace.

pub mod config;
pub mod error;
pub mod plan;
pub mod traits;
pub mod types;

pub use config::{CacheOptions, OptionProvider};
pub use error::{CacheError, CacheResult, StoreError};
pub use plan::{ExpandedPlan, PlanNode, ScanLeaf, ScanSource};
pub use traits::{
    CacheMetricsSink, CatalogService, CatalogView, ConfigStatus, Expander,
    ExternalReflectionStatus, MaterializationStore, NoOpCacheMetrics, SharedMetricsSink,
    StatusService, TimeSource, WallClock,
};
pub use types::{
    DatasetConfig, DatasetKey, EntryId, ExpandedDescriptor, ExternalReflection, Failure,
    Materialization, MaterializationState, RawDescriptor, RecordSchema, SchemaField,
};
