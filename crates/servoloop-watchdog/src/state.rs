//! Watchdog state machine and metrics.
//!
//! This module provides the state machine for the watchdog with
//! deterministic, atomic state transitions.

use portable_atomic::{AtomicU32, AtomicU64, Ordering};

use crate::error::{WatchdogError, WatchdogResult};

/// Watchdog operational status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum WatchdogStatus {
    /// Watchdog is not supervising.
    #[default]
    Stopped = 0,
    /// Watchdog is supervising heartbeats and protection limits.
    Running = 1,
    /// A fault was latched; outputs are forced off.
    Tripped = 2,
}

impl WatchdogStatus {
    /// Convert from raw u32 value.
    #[must_use]
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Stopped),
            1 => Some(Self::Running),
            2 => Some(Self::Tripped),
            _ => None,
        }
    }

    /// Convert to raw u32 value.
    #[must_use]
    pub fn to_raw(self) -> u32 {
        self as u32
    }

    /// Get the status as a string slice.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Running => "Running",
            Self::Tripped => "Tripped",
        }
    }
}

impl core::fmt::Display for WatchdogStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Atomic watchdog state.
///
/// # State Transition Diagram
///
/// ```text
/// Stopped ──start()──► Running ──trip()──► Tripped
///    ▲                    │                   │
///    └──────stop()────────┘                   │
///    ▲                                        │
///    └───────────reset(was_running=false)─────┤
///                Running ◄──reset(true)───────┘
/// ```
#[derive(Debug)]
pub struct WatchdogState {
    status: AtomicU32,
    /// Whether the watchdog was running before it tripped.
    resume_running: AtomicU32,
    heartbeat_count: AtomicU64,
    trip_count: AtomicU64,
    reset_count: AtomicU64,
    max_heartbeat_interval_us: AtomicU64,
}

impl WatchdogState {
    /// Create a new watchdog state in the Stopped status.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: AtomicU32::new(WatchdogStatus::Stopped.to_raw()),
            resume_running: AtomicU32::new(0),
            heartbeat_count: AtomicU64::new(0),
            trip_count: AtomicU64::new(0),
            reset_count: AtomicU64::new(0),
            max_heartbeat_interval_us: AtomicU64::new(0),
        }
    }

    /// Get the current status.
    #[must_use]
    pub fn status(&self) -> WatchdogStatus {
        let raw = self.status.load(Ordering::Acquire);
        WatchdogStatus::from_raw(raw).unwrap_or(WatchdogStatus::Stopped)
    }

    fn transition(&self, from: WatchdogStatus, to: WatchdogStatus) -> WatchdogResult<()> {
        self.status
            .compare_exchange(from.to_raw(), to.to_raw(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|current| {
                let current = WatchdogStatus::from_raw(current).unwrap_or(WatchdogStatus::Stopped);
                WatchdogError::invalid_transition(current.as_str(), to.as_str())
            })
    }

    /// Transition from Stopped to Running.
    ///
    /// # Errors
    ///
    /// Returns an error if the current state is not `Stopped`.
    pub fn start(&self) -> WatchdogResult<()> {
        self.transition(WatchdogStatus::Stopped, WatchdogStatus::Running)
    }

    /// Transition from Running to Stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the current state is not `Running`.
    pub fn stop(&self) -> WatchdogResult<()> {
        self.transition(WatchdogStatus::Running, WatchdogStatus::Stopped)
    }

    /// Enter `Tripped` from any state. Returns `false` if already tripped.
    pub fn trip(&self) -> bool {
        let previous = self
            .status
            .swap(WatchdogStatus::Tripped.to_raw(), Ordering::AcqRel);
        if previous == WatchdogStatus::Tripped.to_raw() {
            return false;
        }
        let was_running = u32::from(previous == WatchdogStatus::Running.to_raw());
        self.resume_running.store(was_running, Ordering::Release);
        self.trip_count.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Leave `Tripped`, resuming the status held before the trip.
    ///
    /// Does nothing when not tripped. Returns the resulting status.
    pub fn reset(&self) -> WatchdogStatus {
        let resume = if self.resume_running.load(Ordering::Acquire) == 1 {
            WatchdogStatus::Running
        } else {
            WatchdogStatus::Stopped
        };
        if self.transition(WatchdogStatus::Tripped, resume).is_ok() {
            self.reset_count.fetch_add(1, Ordering::Relaxed);
        }
        self.status()
    }

    /// Record a heartbeat and the interval since the previous one.
    pub fn record_heartbeat(&self, interval_us: u64) {
        self.heartbeat_count.fetch_add(1, Ordering::Relaxed);
        self.max_heartbeat_interval_us
            .fetch_max(interval_us, Ordering::Relaxed);
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn metrics(&self) -> WatchdogMetrics {
        WatchdogMetrics {
            heartbeats: self.heartbeat_count.load(Ordering::Relaxed),
            trips: self.trip_count.load(Ordering::Relaxed),
            resets: self.reset_count.load(Ordering::Relaxed),
            max_heartbeat_interval_us: self.max_heartbeat_interval_us.load(Ordering::Relaxed),
        }
    }
}

impl Default for WatchdogState {
    fn default() -> Self {
        Self::new()
    }
}

/// Watchdog metrics for monitoring and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchdogMetrics {
    /// Total number of heartbeats received.
    pub heartbeats: u64,
    /// Total number of trips.
    pub trips: u64,
    /// Total number of fault resets that left the Tripped state.
    pub resets: u64,
    /// Longest observed interval between two heartbeats, in microseconds.
    pub max_heartbeat_interval_us: u64,
}
