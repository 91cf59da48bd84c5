//! One-shot initialization barrier.
//!
//! Created closed; opened by the first refresh pass to complete, whether or
//! not every entry expanded. Once open it never closes again, so `reset`
//! cannot send readers back to waiting. Readers wait with a timeout and
//! tolerate spurious wakeups.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// One-shot latch readers block on until the first refresh completes.
#[derive(Debug)]
pub struct InitBarrier {
    opened: Mutex<bool>,
    condvar: Condvar,
}

impl InitBarrier {
    /// A closed barrier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            opened: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Open the barrier and wake all waiters. Idempotent.
    pub fn open(&self) {
        let mut opened = self.opened.lock().expect("init barrier lock poisoned");
        if !*opened {
            *opened = true;
            self.condvar.notify_all();
        }
    }

    /// Whether the barrier has opened.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.opened.lock().expect("init barrier lock poisoned")
    }

    /// Block until the barrier opens, up to `timeout`. Returns whether the
    /// barrier is open on return.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let opened = self.opened.lock().expect("init barrier lock poisoned");
        let (opened, _result) = self
            .condvar
            .wait_timeout_while(opened, timeout, |opened| !*opened)
            .expect("init barrier lock poisoned");
        *opened
    }
}

impl Default for InitBarrier {
    fn default() -> Self {
        Self::new()
    }
}
