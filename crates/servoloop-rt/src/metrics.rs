//! Lateness statistics for periodic tasks.

/// Timing statistics of a periodic task.
///
/// Lateness is how far past its scheduled wake time a tick started.
///
/// # RT-Safety
///
/// `record_tick` is O(1) and allocation-free.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimingMetrics {
    /// Total number of ticks recorded
    pub total_ticks: u64,

    /// Ticks that started after their scheduled wake time
    pub late_ticks: u64,

    /// Maximum observed lateness in nanoseconds
    pub max_lateness_ns: u64,

    /// Last observed lateness in nanoseconds
    pub last_lateness_ns: u64,

    lateness_sum_ns: u128,
}

impl TimingMetrics {
    /// Create an empty metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one tick.
    pub fn record_tick(&mut self, lateness_ns: u64) {
        self.total_ticks = self.total_ticks.saturating_add(1);
        if lateness_ns > 0 {
            self.late_ticks = self.late_ticks.saturating_add(1);
        }
        self.max_lateness_ns = self.max_lateness_ns.max(lateness_ns);
        self.last_lateness_ns = lateness_ns;
        self.lateness_sum_ns = self.lateness_sum_ns.saturating_add(u128::from(lateness_ns));
    }

    /// Mean lateness in nanoseconds.
    pub fn mean_lateness_ns(&self) -> f64 {
        if self.total_ticks == 0 {
            return 0.0;
        }
        self.lateness_sum_ns as f64 / self.total_ticks as f64
    }

    /// Clear all statistics.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
