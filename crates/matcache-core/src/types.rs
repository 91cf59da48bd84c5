//! Data model shared between the cache engine and its collaborators.
//!
//! The stored forms ([`Materialization`], [`ExternalReflection`],
//! [`RawDescriptor`]) are plain serde-friendly records owned by the host
//! engine. The computed form ([`ExpandedDescriptor`]) is produced by the
//! plan expander and held only through published cache snapshots; its
//! staleness flag and version tag change exclusively by copy-on-write so a
//! published snapshot is never mutated in place.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::plan::ExpandedPlan;

// ─── Identifiers ────────────────────────────────────────────────────────────

/// Opaque identifier for a cache entry.
///
/// Internal materializations and external reflections share one id-space in
/// the cache map; the provider guarantees the two namespaces never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(String);

impl EntryId {
    /// Wrap an id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for EntryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Qualified dotted path of a dataset in the catalog, e.g.
/// `acceleration.reflections.m_42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetKey(Vec<String>);

impl DatasetKey {
    /// Build a key from path components.
    pub fn new<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(components.into_iter().map(Into::into).collect())
    }

    /// The path components.
    #[must_use]
    pub fn components(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

// ─── Schemas ────────────────────────────────────────────────────────────────

/// One field of a record schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Field name.
    pub name: String,
    /// Engine type name, e.g. `"varchar"`, `"bigint"`.
    pub data_type: String,
    /// Whether the field admits nulls.
    pub nullable: bool,
}

/// Structural snapshot of a dataset's record schema.
///
/// Equality is field-by-field structural comparison; the refresh engine uses
/// it to detect schema drift between the catalog's current schema and the
/// schema captured when a plan was expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    /// Ordered fields.
    pub fields: Vec<SchemaField>,
}

impl RecordSchema {
    /// Decode a schema from the opaque blob stored in a [`DatasetConfig`].
    pub fn from_blob(blob: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(blob)
    }

    /// Encode this schema into the blob form stored in a [`DatasetConfig`].
    pub fn to_blob(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Catalog record for a dataset: its current version tag and serialized
/// record schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Dataset key.
    pub key: DatasetKey,
    /// Current version tag. Bumped whenever the dataset gains new data.
    pub tag: String,
    /// Opaque serialized record schema.
    pub record_schema: Vec<u8>,
}

impl DatasetConfig {
    /// Decode the stored record schema.
    pub fn schema(&self) -> Result<RecordSchema, serde_json::Error> {
        RecordSchema::from_blob(&self.record_schema)
    }
}

// ─── Stored forms ───────────────────────────────────────────────────────────

/// Lifecycle state of a stored materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterializationState {
    /// Refresh job is producing the physical data.
    Running,
    /// Physical data is available and the entry is eligible for planning.
    Done,
    /// The entry was marked unusable, either by its refresh job or by the
    /// cache after exhausting expansion retries.
    Failed,
    /// Superseded by a newer materialization.
    Deprecated,
}

/// Failure details attached to a [`Materialization`] in the `Failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Human-readable failure message.
    pub message: String,
}

/// Stored form of an internal materialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Materialization {
    /// Cache entry id.
    pub id: EntryId,
    /// Owning reflection.
    pub reflection_id: String,
    /// Optimistic-concurrency version tag.
    pub tag: String,
    /// Whether the physical data is known to be stale.
    pub is_stale: bool,
    /// Lifecycle state.
    pub state: MaterializationState,
    /// Failure details, present in the `Failed` state.
    pub failure: Option<Failure>,
    /// Catalog path of the backing table.
    pub path: DatasetKey,
    /// Opaque serialized plan.
    pub plan: Vec<u8>,
}

/// A materialization whose physical data is managed outside the engine.
/// Freshness is tracked by the external status service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalReflection {
    /// Cache entry id.
    pub id: EntryId,
    /// Display name.
    pub name: String,
    /// Dataset the reflection accelerates.
    pub query_dataset_id: String,
    /// Dataset holding the precomputed data.
    pub target_dataset_id: String,
}

/// Stored, unexpanded descriptor: identifiers, version tag, staleness flag
/// and the opaque serialized plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDescriptor {
    /// Cache entry id of the materialization.
    pub materialization_id: EntryId,
    /// Owning reflection.
    pub reflection_id: String,
    /// Version tag at the time the descriptor was stored.
    pub tag: String,
    /// Whether the physical data is known to be stale.
    pub is_stale: bool,
    /// Opaque serialized plan.
    pub plan: Vec<u8>,
}

// ─── Expanded form ──────────────────────────────────────────────────────────

/// The computed cache artifact: a raw descriptor joined with its expanded
/// plan tree and the schema captured during expansion.
///
/// Reuse across refresh passes is by identity of the expanded plan. The
/// staleness flag and version tag are the only mutable facets, and they
/// change via [`ExpandedDescriptor::with_freshness`], which produces a new
/// descriptor wrapping the same plan.
#[derive(Debug, Clone)]
pub struct ExpandedDescriptor {
    source: RawDescriptor,
    plan: Arc<ExpandedPlan>,
    schema: RecordSchema,
    is_stale: bool,
    tag: String,
}

impl ExpandedDescriptor {
    /// Build a descriptor from a successful expansion. Staleness and tag are
    /// taken from the source descriptor.
    #[must_use]
    pub fn new(source: RawDescriptor, plan: Arc<ExpandedPlan>, schema: RecordSchema) -> Self {
        let is_stale = source.is_stale;
        let tag = source.tag.clone();
        Self {
            source,
            plan,
            schema,
            is_stale,
            tag,
        }
    }

    /// Copy-on-write variant with updated staleness and tag, sharing the
    /// expanded plan and schema of `self`.
    #[must_use]
    pub fn with_freshness(&self, is_stale: bool, tag: impl Into<String>) -> Self {
        Self {
            source: self.source.clone(),
            plan: Arc::clone(&self.plan),
            schema: self.schema.clone(),
            is_stale,
            tag: tag.into(),
        }
    }

    /// The stored descriptor this expansion came from.
    #[must_use]
    pub fn source(&self) -> &RawDescriptor {
        &self.source
    }

    /// The expanded plan tree.
    #[must_use]
    pub fn plan(&self) -> &Arc<ExpandedPlan> {
        &self.plan
    }

    /// The record schema captured at expansion time.
    #[must_use]
    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Current staleness flag.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.is_stale
    }

    /// Current version tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }
}
