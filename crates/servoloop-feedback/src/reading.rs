//! Published sensor readings and velocity estimation.

use serde::{Deserialize, Serialize};
use servoloop_errors::DecodeStatus;

/// Ticks per electrical turn, shared by every sensor type.
pub const ELECTRICAL_RESOLUTION: u32 = 4096;

/// Microseconds per minute, the rpm conversion constant.
pub const MICROS_PER_MINUTE: i64 = 60_000_000;

/// One decoded sample of a position sensor.
///
/// Produced by exactly one decoder and published through the feedback cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SensorReading {
    /// Electrical angle in `0..ELECTRICAL_RESOLUTION`, offset applied.
    pub angle: u32,
    /// Position within one mechanical turn, in `0..ticks_per_turn`.
    pub singleturn: u32,
    /// Absolute multiturn position in ticks.
    pub count: i32,
    /// Shaft velocity in rpm.
    pub velocity: i32,
    /// Result of the decode attempt that produced this reading.
    pub status: DecodeStatus,
    /// Time of the decode attempt, in microseconds.
    pub timestamp_us: u64,
}

impl SensorReading {
    /// Copy of this reading with a different status and timestamp.
    ///
    /// Used to hold the last valid values when a decode attempt fails.
    #[must_use]
    pub fn held(self, status: DecodeStatus, timestamp_us: u64) -> Self {
        Self {
            status,
            timestamp_us,
            ..self
        }
    }
}

/// Position-difference velocity estimate over a fixed compute period.
///
/// `velocity = Δticks * 60_000_000 / (ticks_per_turn * Δt_us)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VelocityEstimator {
    period_us: u64,
    ticks_per_turn: u32,
    last: Option<(i64, u64)>,
    velocity: i32,
}

impl VelocityEstimator {
    /// Create an estimator updating every `period_us`.
    #[must_use]
    pub fn new(period_us: u32, ticks_per_turn: u32) -> Self {
        Self {
            period_us: u64::from(period_us.max(1)),
            ticks_per_turn: ticks_per_turn.max(1),
            last: None,
            velocity: 0,
        }
    }

    /// Feed the current absolute position. Returns the latest estimate, in rpm.
    ///
    /// `position` is the unwrapped tick count; it must not be folded back
    /// by the multiturn bound between two updates.
    pub fn update(&mut self, position: i64, now_us: u64) -> i32 {
        match self.last {
            None => self.last = Some((position, now_us)),
            Some((last_position, last_us)) => {
                let elapsed = now_us.saturating_sub(last_us);
                if elapsed >= self.period_us {
                    let delta = i128::from(position.saturating_sub(last_position));
                    let denominator = i128::from(self.ticks_per_turn) * i128::from(elapsed);
                    let rpm = delta * i128::from(MICROS_PER_MINUTE) / denominator;
                    self.velocity = i32::try_from(rpm).unwrap_or(if rpm < 0 {
                        i32::MIN
                    } else {
                        i32::MAX
                    });
                    self.last = Some((position, now_us));
                }
            }
        }
        self.velocity
    }

    /// Last estimate, in rpm.
    #[must_use]
    pub fn velocity(&self) -> i32 {
        self.velocity
    }

    /// Forget the position history, e.g. after the position was rebased.
    pub fn reset(&mut self) {
        self.last = None;
        self.velocity = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_velocity_one_turn_per_second() {
        let mut estimator = VelocityEstimator::new(1_000, 4_000);
        assert_eq!(estimator.update(0, 0), 0);
        // 4 ticks per ms is one turn per second
        assert_eq!(estimator.update(4, 1_000), 60);
        assert_eq!(estimator.update(0, 2_000), -60);
    }

    #[test]
    fn test_velocity_only_updates_after_period() {
        let mut estimator = VelocityEstimator::new(1_000, 4_000);
        estimator.update(0, 0);
        assert_eq!(estimator.update(400, 500), 0);
        assert_eq!(estimator.update(400, 1_000), 6_000);
    }

    #[test]
    fn test_held_reading_keeps_values() {
        let reading = SensorReading {
            angle: 100,
            singleturn: 5,
            count: 1_005,
            velocity: 30,
            status: DecodeStatus::NoError,
            timestamp_us: 10,
        };
        let held = reading.held(DecodeStatus::CrcError, 20);
        assert_eq!(held.count, 1_005);
        assert_eq!(held.status, DecodeStatus::CrcError);
        assert_eq!(held.timestamp_us, 20);
    }
}
