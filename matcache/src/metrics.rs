//! Atomic metrics recorder for the materialization cache.
//!
//! [`CacheMetrics`] implements the [`CacheMetricsSink`] callbacks with
//! relaxed atomic counters and exposes a serializable snapshot. Exporters
//! that bridge to a process-wide registry should publish under the
//! `mat_cache_*` names below, tagging error counts with the reason label and
//! source-down flag, and the sync timer with the initial flag.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use matcache_core::traits::CacheMetricsSink;
use serde::{Deserialize, Serialize};

/// Timer of refresh pass durations.
pub const MAT_CACHE_SYNC: &str = "mat_cache_sync";
/// Gauge of current snapshot size.
pub const MAT_CACHE_ENTRIES: &str = "mat_cache_entries";
/// Counter of expansion errors that may be retried.
pub const MAT_CACHE_ERRORS: &str = "mat_cache_errors";
/// Counter of entries escalated to FAILED after exhausting retries.
pub const MAT_CACHE_RETRY_FAILED: &str = "mat_cache_retry_failed";

/// In-process metrics recorder.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    errors: AtomicU64,
    source_down_errors: AtomicU64,
    retry_failed: AtomicU64,
    syncs: AtomicU64,
    initial_syncs: AtomicU64,
    last_sync_ms: AtomicU64,
    entries: AtomicU64,
}

/// Point-in-time copy of [`CacheMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetricsSnapshot {
    /// Total expansion errors observed.
    pub errors: u64,
    /// Subset of `errors` classified as source-down.
    pub source_down_errors: u64,
    /// Entries escalated to FAILED.
    pub retry_failed: u64,
    /// Refresh passes completed.
    pub syncs: u64,
    /// Refresh passes completed while the barrier was still closed.
    pub initial_syncs: u64,
    /// Duration of the most recent refresh pass in milliseconds.
    pub last_sync_ms: u64,
    /// Current snapshot size.
    pub entries: u64,
}

impl CacheMetrics {
    /// A zeroed recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy out the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            errors: self.errors.load(Ordering::Relaxed),
            source_down_errors: self.source_down_errors.load(Ordering::Relaxed),
            retry_failed: self.retry_failed.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
            initial_syncs: self.initial_syncs.load(Ordering::Relaxed),
            last_sync_ms: self.last_sync_ms.load(Ordering::Relaxed),
            entries: self.entries.load(Ordering::Relaxed),
        }
    }
}

impl CacheMetricsSink for CacheMetrics {
    fn on_sync(&self, elapsed: Duration, initial: bool) {
        self.syncs.fetch_add(1, Ordering::Relaxed);
        if initial {
            self.initial_syncs.fetch_add(1, Ordering::Relaxed);
        }
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.last_sync_ms.store(elapsed_ms, Ordering::Relaxed);
    }

    fn on_expansion_error(&self, _reason: &'static str, source_down: bool) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        if source_down {
            self.source_down_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_retry_exhausted(&self, _reason: &'static str, _source_down: bool) {
        self.retry_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn on_entries(&self, count: usize) {
        let count = u64::try_from(count).unwrap_or(u64::MAX);
        self.entries.store(count, Ordering::Relaxed);
    }
}
