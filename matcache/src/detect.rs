//! Change detectors deciding when a cached entry must be re-expanded.
//!
//! Reuse is preferred whenever safe: a cached expansion is kept across
//! refresh passes unless the dataset schema behind it drifted (internal
//! entries) or an upstream dataset moved past the version captured in the
//! plan (external entries).

use matcache_core::plan::ScanSource;
use matcache_core::traits::CatalogView;
use matcache_core::types::{ExpandedDescriptor, Materialization};

/// Whether the record schema of `materialization`'s backing dataset differs
/// from the schema captured when `cached` was expanded.
///
/// A missing dataset config or an undecodable schema blob counts as changed,
/// forcing re-expansion rather than serving a plan bound to stale metadata.
pub(crate) fn schema_changed(
    cached: &ExpandedDescriptor,
    materialization: &Materialization,
    catalog: &dyn CatalogView,
) -> bool {
    let Some(config) = catalog.dataset_config(&materialization.path) else {
        return true;
    };

    let current = match config.schema() {
        Ok(schema) => schema,
        Err(error) => {
            tracing::warn!(
                target: "matcache",
                key = %materialization.path,
                %error,
                "could not decode current record schema, treating as changed"
            );
            return true;
        }
    };

    current != *cached.schema()
}

/// Whether any table scanned by the cached plan has newer data than the plan
/// captured at expansion.
///
/// Catalog-resident scans compare their captured version tag against the
/// catalog's current dataset tag; a mismatch or missing dataset means
/// updated. Scans that are not catalog-resident cannot be checked and are
/// conservatively treated as updated.
pub(crate) fn external_metadata_updated(
    cached: &ExpandedDescriptor,
    catalog: &dyn CatalogView,
) -> bool {
    let mut updated = false;
    cached.plan().for_each_scan(&mut |scan| match &scan.source {
        ScanSource::Catalog { version } => match catalog.dataset_config(&scan.table) {
            Some(config) => {
                if config.tag != *version {
                    tracing::debug!(
                        target: "matcache",
                        table = %scan.table,
                        cached_version = %version,
                        current_tag = %config.tag,
                        "dataset has new data, invalidating cached external reflection"
                    );
                    updated = true;
                }
            }
            None => updated = true,
        },
        ScanSource::External => updated = true,
    });
    updated
}
