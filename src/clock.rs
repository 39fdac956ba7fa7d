//! Tick sources driving the service curves.
//!
//! All curve state is kept in ticks of a fixed frequency, converted once at
//! class creation, so a scheduler must stay on the clock it was built with.
//! Production uses the monotonic wall clock; tests and the demo binary use
//! a manually advanced clock to simulate a link at an exact rate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic tick source consumed by the scheduler.
pub trait Clock: Send + Sync {
    /// Current time in ticks.
    fn now(&self) -> u64;
    /// Ticks per second.
    fn frequency(&self) -> u64;
}

/// Wall-clock source counting microseconds since its creation.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    fn frequency(&self) -> u64 {
        1_000_000
    }
}

/// Manually driven tick source for tests and link simulations.
pub struct ManualClock {
    ticks: AtomicU64,
    frequency: u64,
}

impl ManualClock {
    pub fn new(frequency: u64) -> Self {
        ManualClock {
            ticks: AtomicU64::new(0),
            frequency,
        }
    }

    /// Move time forward by `ticks`.
    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::Relaxed);
    }

    /// Jump to an absolute tick count.
    pub fn set(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn frequency(&self) -> u64 {
        self.frequency
    }
}
