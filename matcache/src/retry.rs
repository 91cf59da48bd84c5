//! Per-entry retry ledger.
//!
//! Records the wall time of the first failed expansion attempt for each
//! entry. A record is created on first failure, removed on success or on
//! terminal escalation, and expires `max_retry_hours + 1` after it was
//! written, so an entry that is deprecated upstream without ever succeeding
//! cannot pin ledger memory. Expiry is applied lazily on access and is
//! bounded by the total entry count.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use matcache_core::traits::TimeSource;
use matcache_core::types::EntryId;

/// Keyed store of first-failure timestamps with write-time expiry.
#[derive(Debug)]
pub struct RetryLedger {
    entries: Mutex<HashMap<EntryId, i64>>,
    ttl_ms: i64,
    time: Arc<dyn TimeSource>,
}

impl RetryLedger {
    /// A ledger whose records expire `ttl` after their write time.
    #[must_use]
    pub fn new(ttl: Duration, time: Arc<dyn TimeSource>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            time,
        }
    }

    /// First-failure time for `id` in epoch milliseconds, inserting the
    /// current time if no live record exists.
    pub fn first_failure_ms(&self, id: &EntryId) -> i64 {
        let now = self.time.now_ms();
        let mut entries = self.entries.lock().expect("retry ledger lock poisoned");
        Self::expire(&mut entries, now, self.ttl_ms);
        *entries.entry(id.clone()).or_insert(now)
    }

    /// Drop the record for `id`, if any. Called on successful expansion and
    /// on terminal escalation.
    pub fn clear(&self, id: &EntryId) {
        let mut entries = self.entries.lock().expect("retry ledger lock poisoned");
        entries.remove(id);
    }

    /// Whether a live (unexpired) record exists for `id`.
    #[must_use]
    pub fn contains(&self, id: &EntryId) -> bool {
        let now = self.time.now_ms();
        let mut entries = self.entries.lock().expect("retry ledger lock poisoned");
        Self::expire(&mut entries, now, self.ttl_ms);
        entries.contains_key(id)
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = self.time.now_ms();
        let mut entries = self.entries.lock().expect("retry ledger lock poisoned");
        Self::expire(&mut entries, now, self.ttl_ms);
        entries.len()
    }

    /// Whether the ledger holds no live records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expire(entries: &mut HashMap<EntryId, i64>, now: i64, ttl_ms: i64) {
        entries.retain(|_, first| now.saturating_sub(*first) < ttl_ms);
    }
}
