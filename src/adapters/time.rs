//! System clock adapter.
//!
//! Monotonic uptime from `std::time::Instant`, wall-clock hour/minute from
//! the local timezone via `chrono`.  The scheduler only ever sees
//! [`SchedTime`].

use std::time::Instant;

use chrono::Local;

use crate::scheduler::SchedTime;

pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Seconds since start (monotonic).
    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }

    /// "Now" as the scheduler sees it.
    pub fn now(&self) -> SchedTime {
        SchedTime::from_datetime(self.uptime_secs(), &Local::now())
    }
}
