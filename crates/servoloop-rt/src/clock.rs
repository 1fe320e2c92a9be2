//! Microsecond time source shared by all tasks.

use std::sync::Arc;
use std::time::Instant;

/// Monotonic microsecond time source.
///
/// Decoders and supervisors take timestamps as plain `u64` microseconds so
/// that tests can drive them with synthetic time; tasks obtain those
/// timestamps from a `Clock`.
pub trait Clock: Send + Sync {
    /// Microseconds since the clock's epoch.
    fn now_us(&self) -> u64;
}

/// [`Clock`] backed by [`Instant`], with its epoch at construction.
///
/// Clones share the same epoch.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    epoch: Arc<Instant>,
}

impl MonotonicClock {
    /// Create a clock whose epoch is now.
    pub fn new() -> Self {
        Self {
            epoch: Arc::new(Instant::now()),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}
