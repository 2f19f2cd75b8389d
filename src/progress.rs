//! Run admission and progress counters shared between the HTTP handlers and
//! the background sweep.

use std::sync::{Mutex, MutexGuard, PoisonError};

use time::{format_description::well_known, OffsetDateTime};

use crate::types::ProgressState;

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    current: u64,
    running: bool,
    started_at: Option<OffsetDateTime>,
}

/// Total/current counters plus the running flag, all behind one lock.
///
/// Critical sections never await or do I/O, so a plain `std::sync::Mutex` is used.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    inner: Mutex<Counters>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        // Every section leaves the counters consistent, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a new run. Returns `false` and changes nothing if one is already running.
    pub fn try_start(&self) -> bool {
        let mut c = self.lock();
        if c.running {
            return false;
        }
        c.running = true;
        c.current = 0;
        c.total = 0;
        c.started_at = Some(OffsetDateTime::now_utc());
        true
    }

    /// Record the number of pairs the admitted run will examine.
    pub fn set_total(&self, total: u64) {
        self.lock().total = total;
    }

    /// Count one completed probe. Never moves `current` past `total`.
    pub fn advance(&self) {
        let mut c = self.lock();
        if c.current < c.total {
            c.current += 1;
        }
    }

    /// Return to idle. Called from the sweep's cleanup path.
    pub fn finish(&self) {
        self.lock().running = false;
    }

    pub fn snapshot(&self) -> ProgressState {
        let c = self.lock();
        ProgressState {
            total: c.total,
            current: c.current,
            is_running: c.running,
            started_at: c
                .started_at
                .and_then(|t| t.format(&well_known::Rfc3339).ok()),
        }
    }
}
