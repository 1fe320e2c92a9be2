//! Escalation of persistent sensor unavailability.

use servoloop_errors::{DecodeStatus, FaultCode};

/// Counts consecutive cycles in which a sensor did not answer.
///
/// Single decode errors are absorbed by the sensor layer. A sensor that does
/// not answer for more than `limit` consecutive cycles is a protection fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorMonitor {
    limit: u32,
    consecutive: u32,
}

impl SensorMonitor {
    /// Create a monitor tolerating `limit` consecutive unavailable cycles.
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            consecutive: 0,
        }
    }

    /// Observe the decode status of one cycle.
    ///
    /// Returns `Some(FaultCode::SensorUnavailable)` on the cycle the limit is
    /// exceeded and on every following unavailable cycle.
    pub fn observe(&mut self, status: DecodeStatus) -> Option<FaultCode> {
        if status.is_unavailable() {
            self.consecutive = self.consecutive.saturating_add(1);
        } else {
            self.consecutive = 0;
        }
        (self.consecutive > self.limit).then_some(FaultCode::SensorUnavailable)
    }

    /// Consecutive unavailable cycles seen so far.
    #[must_use]
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}
