//! Time sources for the selection timers.
//!
//! Deadlines are offsets from an arbitrary origin, so the state machine never
//! touches wall-clock time directly and tests can drive it by hand.

use std::{cell::Cell, rc::Rc, time::Duration, time::Instant};

pub trait Clock {
    /// Elapsed time since the clock's origin. Must never go backwards.
    fn now(&self) -> Duration;
}

/// Monotonic clock anchored at construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    start_instant: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start_instant: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start_instant.elapsed()
    }
}

/// Virtual clock advanced explicitly. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, t: Duration) {
        if t < self.now.get() {
            log::warn!(
                "manual clock refused to go backwards ({:?} -> {:?})",
                self.now.get(),
                t
            );
            return;
        }
        self.now.set(t);
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set_ms(&self, ms: u64) {
        self.set(Duration::from_millis(ms));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}
