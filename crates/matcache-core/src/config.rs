//! Configuration for the materialization cache.
//!
//! [`CacheOptions`] carries the recognized tunables with documented defaults.
//! Deployments whose option store can change values at runtime implement
//! [`OptionProvider`]; a plain [`CacheOptions`] value works directly for the
//! static case.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables recognized by the materialization cache.
///
/// All fields have sensible defaults; override selectively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Whether the cache is enabled. When false the cache reports itself as
    /// initialized without waiting for a refresh, so planning falls through
    /// to direct expansion. Default: true.
    pub enabled: bool,

    /// How long enumerative readers wait for the first refresh to complete
    /// (seconds). Default: 300.
    pub init_timeout_secs: u64,

    /// Retry window for failed expansions that are not source-down
    /// (minutes). Once an entry has been failing for at least this long it is
    /// escalated to the durable `Failed` state. Default: 120.
    pub retry_minutes: u64,

    /// Retry-ledger horizon (hours). Ledger records expire
    /// `max_retry_hours + 1` hours after the first failure, so an entry that
    /// is deprecated upstream without ever succeeding cannot pin ledger
    /// memory. Default: 24.
    pub max_retry_hours: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            init_timeout_secs: 300,
            retry_minutes: 120,
            max_retry_hours: 24,
        }
    }
}

impl CacheOptions {
    /// Reader wait budget as a [`Duration`].
    #[must_use]
    pub const fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    /// Retry window as a [`Duration`].
    #[must_use]
    pub const fn retry_window(&self) -> Duration {
        Duration::from_secs(self.retry_minutes * 60)
    }

    /// Ledger time-to-live: one hour past the retry horizon, so a
    /// still-retrying entry is never evicted before its window closes.
    #[must_use]
    pub fn ledger_ttl(&self) -> Duration {
        Duration::from_secs(self.max_retry_hours.saturating_add(1).saturating_mul(3600))
    }
}

/// Source of the current cache options.
///
/// Called on each read so a deployment's option manager can change values at
/// runtime without restarting the cache.
pub trait OptionProvider: fmt::Debug + Send + Sync {
    /// The current option values.
    fn cache_options(&self) -> CacheOptions;
}

impl OptionProvider for CacheOptions {
    fn cache_options(&self) -> CacheOptions {
        self.clone()
    }
}
