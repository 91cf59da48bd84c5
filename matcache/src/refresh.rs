//! The reconciliation pass behind [`MaterializationCache::refresh`].
//!
//! One pass walks the provider's current set of internal materializations and
//! external reflections, reusing cached expansions wherever change detection
//! allows and expanding the rest. Per-entry failures never abort the pass:
//! internal failures feed the retry ledger and, once the retry window is
//! exhausted, escalate the entry to the durable `Failed` state; external
//! failures are only counted, since external freshness is owned by the status
//! service.

use std::sync::Arc;

use matcache_core::config::OptionProvider as _;
use matcache_core::error::{CacheError, StoreError};
use matcache_core::traits::{
    CacheMetricsSink as _, CatalogView, ConfigStatus, Expander as _, MaterializationStore as _,
    StatusService as _, TimeSource as _,
};
use matcache_core::types::{
    EntryId, ExternalReflection, Failure, Materialization, MaterializationState,
};

use crate::cache::MaterializationCache;
use crate::detect;
use crate::snapshot::Snapshot;

/// Per-pass reuse/expand/error tallies, split by entry kind.
#[derive(Debug, Default, Clone, Copy)]
struct RefreshCounts {
    reused: usize,
    expanded: usize,
    errors: usize,
    external_reused: usize,
    external_expanded: usize,
    external_errors: usize,
}

impl MaterializationCache {
    /// Build the next snapshot from the provider's current set, reusing
    /// entries of `old` whenever change detection allows.
    ///
    /// Thread-safe: concurrent passes each build a private map, and the
    /// caller's compare-and-set decides the winner.
    pub(crate) fn build_updated(&self, old: &Snapshot, catalog: &dyn CatalogView) -> Snapshot {
        let mut updated = Snapshot::new();
        let mut counts = RefreshCounts::default();

        for materialization in self.expander.valid_materializations() {
            match old.get(&materialization.id) {
                Some(cached) if !detect::schema_changed(cached, &materialization, catalog) => {
                    // Reuse. A staleness or tag change alone does not warrant
                    // re-expansion; the cached plan is rewrapped copy-on-write.
                    if cached.is_stale() != materialization.is_stale
                        || cached.tag() != materialization.tag
                    {
                        updated.insert(
                            materialization.id.clone(),
                            Arc::new(cached.with_freshness(
                                materialization.is_stale,
                                materialization.tag.clone(),
                            )),
                        );
                    } else {
                        updated.insert(materialization.id.clone(), Arc::clone(cached));
                    }
                    counts.reused += 1;
                }
                _ => {
                    if self.expand_into(&mut updated, &materialization, catalog) {
                        counts.expanded += 1;
                    } else {
                        counts.errors += 1;
                    }
                }
            }
        }

        for reflection in self.expander.external_reflections() {
            match old.get(&reflection.id) {
                Some(cached)
                    if !self.external_out_of_sync(&reflection.id)
                        && !detect::external_metadata_updated(cached, catalog) =>
                {
                    updated.insert(reflection.id.clone(), Arc::clone(cached));
                    counts.external_reused += 1;
                }
                _ => {
                    if self.expand_external_into(&mut updated, &reflection, catalog) {
                        counts.external_expanded += 1;
                    } else {
                        counts.external_errors += 1;
                    }
                }
            }
        }

        tracing::info!(
            target: "matcache",
            reused = counts.reused,
            expanded = counts.expanded,
            errors = counts.errors,
            external_reused = counts.external_reused,
            external_expanded = counts.external_expanded,
            external_errors = counts.external_errors,
            "materialization cache updated"
        );

        updated
    }

    /// Expand one internal materialization into `updated`. Returns whether
    /// an entry was inserted.
    fn expand_into(
        &self,
        updated: &mut Snapshot,
        materialization: &Materialization,
        catalog: &dyn CatalogView,
    ) -> bool {
        match self.expander.expand(materialization, catalog) {
            Ok(Some(descriptor)) => {
                updated.insert(materialization.id.clone(), Arc::new(descriptor));
                // Success invalidates any pending retry record.
                self.ledger.clear(&materialization.id);
                true
            }
            // The plan could not be rebuilt for a non-fatal reason; drop the
            // entry without retry tracking.
            Ok(None) => false,
            Err(error) => {
                tracing::warn!(
                    target: "matcache",
                    id = %materialization.id,
                    phase = self.refresh_phase(),
                    %error,
                    "error expanding materialization, will retry"
                );
                self.metrics
                    .on_expansion_error(error.reason(), error.is_source_down());
                self.track_failure(materialization, &error);
                false
            }
        }
    }

    /// Record a failed internal expansion and escalate it to the durable
    /// `Failed` state once the retry window is exhausted.
    ///
    /// Source-down failures only refresh the ledger record: they retry for as
    /// long as the ledger keeps it.
    fn track_failure(&self, materialization: &Materialization, error: &CacheError) {
        let first_failure_ms = self.ledger.first_failure_ms(&materialization.id);
        if error.is_source_down() {
            return;
        }

        let elapsed_ms = self.time.now_ms().saturating_sub(first_failure_ms);
        let window = self.options.cache_options().retry_window();
        if elapsed_ms < i64::try_from(window.as_millis()).unwrap_or(i64::MAX) {
            return;
        }

        let message = format!(
            "Error expanding {}. All retries exhausted. Updated to FAILED. {error}",
            materialization.id
        );
        tracing::error!(
            target: "matcache",
            id = %materialization.id,
            %error,
            "expansion retries exhausted, marking materialization FAILED"
        );

        match self.store.get(&materialization.id) {
            Ok(mut current) => {
                current.state = MaterializationState::Failed;
                current.failure = Some(Failure { message });
                match self.store.save(&current) {
                    Ok(()) => {
                        self.metrics
                            .on_retry_exhausted(error.reason(), error.is_source_down());
                    }
                    // A peer coordinator escalated first; theirs stands.
                    Err(StoreError::ConcurrentModification { .. }) => {}
                    Err(store_error) => {
                        tracing::warn!(
                            target: "matcache",
                            id = %materialization.id,
                            %store_error,
                            "could not persist FAILED state"
                        );
                    }
                }
            }
            Err(store_error) => {
                tracing::error!(
                    target: "matcache",
                    id = %materialization.id,
                    %store_error,
                    "could not load materialization for FAILED escalation"
                );
            }
        }

        // Cleared whatever the save outcome: the next materialization is
        // rebuilt under the reflection's own refresh policy.
        self.ledger.clear(&materialization.id);
    }

    /// Expand one external reflection into `updated`. Returns whether an
    /// entry was inserted.
    ///
    /// Externals carry no retry state and never escalate: a dropped or failed
    /// entry is governed by the external status service.
    fn expand_external_into(
        &self,
        updated: &mut Snapshot,
        reflection: &ExternalReflection,
        catalog: &dyn CatalogView,
    ) -> bool {
        let attempt = || {
            let Some(descriptor) = self.expander.descriptor(reflection, catalog)? else {
                return Ok(None);
            };
            self.expander.expand_descriptor(&descriptor, catalog)
        };

        match attempt() {
            Ok(Some(descriptor)) => {
                updated.insert(reflection.id.clone(), Arc::new(descriptor));
                true
            }
            Ok(None) => false,
            Err(error) => {
                tracing::warn!(
                    target: "matcache",
                    id = %reflection.id,
                    name = %reflection.name,
                    phase = self.refresh_phase(),
                    %error,
                    "error expanding external reflection"
                );
                self.metrics
                    .on_expansion_error(error.reason(), error.is_source_down());
                false
            }
        }
    }

    fn external_out_of_sync(&self, id: &EntryId) -> bool {
        self.status.external_reflection_status(id).config_status == ConfigStatus::OutOfSync
    }

    fn refresh_phase(&self) -> &'static str {
        if self.is_initialized() {
            "retry"
        } else {
            "initialization"
        }
    }
}
