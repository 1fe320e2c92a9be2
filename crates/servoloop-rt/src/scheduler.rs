//! Absolute-deadline scheduler with fatal overrun detection.

use std::time::{Duration, Instant};

use crate::error::{RTError, RTResult};
use crate::metrics::TimingMetrics;

/// Remaining time below which the scheduler busy-spins instead of sleeping.
const SPIN_THRESHOLD: Duration = Duration::from_micros(200);

/// Absolute scheduler for fixed-period tasks.
///
/// Wake times are computed as `start + n * period`, so sleep inaccuracy never
/// accumulates into drift. A tick that starts later than its scheduled wake
/// time plus the overrun tolerance means the previous cycle overran: the
/// scheduler reports [`RTError::DeadlineMissed`] instead of catching up.
///
/// # RT-Safety
///
/// - `wait_for_tick` is O(1) and allocation-free
/// - The final part of each wait busy-spins for precision
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use servoloop_rt::PeriodicScheduler;
///
/// let mut scheduler = PeriodicScheduler::new(Duration::from_millis(1));
/// for _ in 0..10 {
///     scheduler.wait_for_tick()?;
/// }
/// # Ok::<(), servoloop_rt::RTError>(())
/// ```
#[derive(Debug)]
pub struct PeriodicScheduler {
    period: Duration,
    overrun_tolerance: Duration,
    next_tick: Instant,
    tick_count: u64,
    metrics: TimingMetrics,
}

impl PeriodicScheduler {
    /// Create a scheduler whose overrun tolerance equals one period.
    pub fn new(period: Duration) -> Self {
        Self::with_tolerance(period, period)
    }

    /// Create a scheduler with an explicit overrun tolerance.
    ///
    /// A zero period is raised to one microsecond.
    pub fn with_tolerance(period: Duration, overrun_tolerance: Duration) -> Self {
        Self {
            period: period.max(Duration::from_micros(1)),
            overrun_tolerance,
            next_tick: Instant::now(),
            tick_count: 0,
            metrics: TimingMetrics::new(),
        }
    }

    /// Wait for the next tick.
    ///
    /// Returns the tick number (starting at 1).
    ///
    /// # Errors
    ///
    /// Returns [`RTError::DeadlineMissed`] if this call happens later than the
    /// scheduled wake time plus the overrun tolerance.
    pub fn wait_for_tick(&mut self) -> RTResult<u64> {
        let now = Instant::now();
        let lateness = now.saturating_duration_since(self.next_tick);
        if lateness > self.overrun_tolerance {
            return Err(RTError::DeadlineMissed);
        }
        self.metrics
            .record_tick(u64::try_from(lateness.as_nanos()).unwrap_or(u64::MAX));

        let remaining = self.next_tick.saturating_duration_since(now);
        if remaining > SPIN_THRESHOLD {
            std::thread::sleep(remaining.saturating_sub(SPIN_THRESHOLD));
        }
        while Instant::now() < self.next_tick {
            std::hint::spin_loop();
        }

        self.next_tick += self.period;
        self.tick_count = self.tick_count.saturating_add(1);
        Ok(self.tick_count)
    }

    /// Restart the schedule with the first tick due now.
    pub fn reset(&mut self) {
        self.next_tick = Instant::now();
        self.tick_count = 0;
        self.metrics.reset();
    }

    /// Get current tick count.
    #[inline]
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Get the configured period.
    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Get timing metrics.
    #[inline]
    pub fn metrics(&self) -> &TimingMetrics {
        &self.metrics
    }
}
