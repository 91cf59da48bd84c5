use crate::types::{DatasetKey, EntryId};

/// Unified error type for the materialization cache pipeline.
///
/// Per-entry expansion failures are recovered locally by the refresh engine
/// (the entry is retried on later passes or escalated to the durable store).
/// Only [`CacheError::InitTimeout`] and errors raised by a direct `update`
/// call are surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An upstream data source is unreachable.
    ///
    /// Classified as transient without a time bound: the refresh engine keeps
    /// retrying until the source recovers or the retry ledger expires the
    /// entry.
    #[error("Source \"{source_name}\" is down: {detail}. Expansion is retried until the source recovers.")]
    SourceDown {
        /// Name of the unreachable source.
        source_name: String,
        /// Underlying connectivity detail.
        detail: String,
    },

    /// Plan expansion failed for an entry. Retried within the configured
    /// retry window, then escalated.
    #[error("Failed to expand plan for {id}: {detail}")]
    ExpansionFailed {
        /// Entry whose expansion failed.
        id: EntryId,
        /// What went wrong.
        detail: String,
    },

    /// The serialized plan blob could not be decoded.
    #[error("Could not deserialize plan for {id}: {detail}. The materialization may need a rebuild.")]
    PlanDeserialization {
        /// Entry whose plan blob is unreadable.
        id: EntryId,
        /// Decoder detail.
        detail: String,
    },

    /// A stored record schema could not be decoded while binding a plan.
    #[error("Could not deserialize record schema for dataset {key}: {source}")]
    SchemaDeserialization {
        /// Dataset whose schema blob is unreadable.
        key: DatasetKey,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// Expansion exceeded the collaborator's own deadline.
    #[error("Expansion timed out for {id} after {elapsed_ms}ms")]
    ExpansionTimeout {
        /// Entry whose expansion timed out.
        id: EntryId,
        /// How long the expansion ran before the deadline.
        elapsed_ms: u64,
    },

    /// The cache did not finish its first refresh within the reader's wait
    /// budget. Raised by `get_all`.
    #[error(
        "Timed out after {waited_secs}s waiting for the materialization cache to initialize. \
         Increase init_timeout_secs or check the refresh scheduler."
    )]
    InitTimeout {
        /// Seconds the reader waited.
        waited_secs: u64,
    },

    /// Failure from the durable materialization store.
    #[error("Materialization store error: {0}")]
    Store(#[from] StoreError),
}

impl CacheError {
    /// Whether this failure is classified as an upstream source outage.
    ///
    /// Source-down failures never trigger FAILED escalation, no matter how
    /// long the entry has been retrying.
    #[must_use]
    pub const fn is_source_down(&self) -> bool {
        matches!(self, Self::SourceDown { .. })
    }

    /// Stable label for this error kind, used as the `reason` tag on the
    /// error and retry-failed counters.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::SourceDown { .. } => "source_down",
            Self::ExpansionFailed { .. } => "expansion_failed",
            Self::PlanDeserialization { .. } => "plan_deserialization",
            Self::SchemaDeserialization { .. } => "schema_deserialization",
            Self::ExpansionTimeout { .. } => "expansion_timeout",
            Self::InitTimeout { .. } => "init_timeout",
            Self::Store(_) => "store",
        }
    }
}

/// Errors raised by the durable materialization store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another writer saved the same materialization first. Swallowed during
    /// FAILED escalation: a peer coordinator already escalated the entry.
    #[error("Concurrent modification of materialization {id}")]
    ConcurrentModification {
        /// Entry that was modified concurrently.
        id: EntryId,
    },

    /// The materialization no longer exists in the store.
    #[error("Materialization {id} not found in store")]
    NotFound {
        /// Missing entry.
        id: EntryId,
    },

    /// The store backend is unreachable or failed.
    #[error("Materialization store unavailable: {detail}")]
    Unavailable {
        /// Backend detail.
        detail: String,
    },
}

/// Convenience alias used throughout the matcache crates.
pub type CacheResult<T> = Result<T, CacheError>;
