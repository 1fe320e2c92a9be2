//! Velocity and torque ramps
//!
//! Linear ramps that move a command toward its target by a bounded amount
//! per sample. The velocity ramp distinguishes acceleration (speed magnitude
//! growing) from deceleration; the torque ramp uses a single slope.

use serde::{Deserialize, Serialize};

use crate::pid::saturate;

fn approach(current: f64, target: f64, step: f64) -> f64 {
    let step = step.abs();
    if target > current {
        (current + step).min(target)
    } else {
        (current - step).max(target)
    }
}

/// Velocity ramp parameters, in rpm and rpm/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityRampConfig {
    /// Velocity ceiling
    pub max_velocity: f64,
    /// Rate at which the speed magnitude may grow
    pub acceleration: f64,
    /// Rate at which the speed magnitude may shrink
    pub deceleration: f64,
}

impl Default for VelocityRampConfig {
    fn default() -> Self {
        Self {
            max_velocity: 3_000.0,
            acceleration: 10_000.0,
            deceleration: 10_000.0,
        }
    }
}

/// Linear velocity ramp.
///
/// # Example
///
/// ```
/// use servoloop_controllers::{VelocityRamp, VelocityRampConfig};
///
/// let config = VelocityRampConfig { max_velocity: 1000.0, acceleration: 1000.0, deceleration: 2000.0 };
/// let mut ramp = VelocityRamp::new(config, 1_000);
/// ramp.set_target(500.0);
/// assert!((ramp.next_setpoint() - 1.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityRamp {
    config: VelocityRampConfig,
    sample_period_s: f64,
    current: f64,
    target: f64,
}

impl VelocityRamp {
    /// Create a ramp at rest, stepping every `sample_period_us`.
    #[must_use]
    pub fn new(config: VelocityRampConfig, sample_period_us: u32) -> Self {
        Self {
            config,
            sample_period_s: f64::from(sample_period_us) / 1_000_000.0,
            current: 0.0,
            target: 0.0,
        }
    }

    /// Replace the ramp parameters.
    pub fn set_config(&mut self, config: VelocityRampConfig) {
        self.config = config;
        self.target = saturate(self.target, config.max_velocity);
    }

    /// Set a new target; it is clamped to the velocity ceiling.
    pub fn set_target(&mut self, target: f64) {
        self.target = saturate(target, self.config.max_velocity);
    }

    /// Clamped target.
    #[must_use]
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Last setpoint.
    #[must_use]
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Whether the ramp has reached its target.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        (self.current - self.target).abs() <= f64::EPSILON
    }

    /// Advance one sample and return the setpoint.
    pub fn next_setpoint(&mut self) -> f64 {
        let same_direction = (self.target >= 0.0) == (self.current >= 0.0);
        let speeding_up = (same_direction && self.target.abs() > self.current.abs())
            || self.current.abs() <= f64::EPSILON;
        let rate = if speeding_up {
            self.config.acceleration
        } else {
            self.config.deceleration
        };
        // Crossing zero decelerates to zero first, then accelerates.
        let waypoint = if self.current * self.target < 0.0 {
            0.0
        } else {
            self.target
        };
        self.current = approach(self.current, waypoint, rate * self.sample_period_s);
        self.current
    }

    /// Restart the ramp from `velocity` with that as target.
    pub fn reset(&mut self, velocity: f64) {
        self.current = velocity;
        self.target = saturate(velocity, self.config.max_velocity);
    }
}

/// Linear torque ramp with a slope in mNm/s.
#[derive(Debug, Clone, PartialEq)]
pub struct TorqueRamp {
    slope: f64,
    sample_period_s: f64,
    current: f64,
    target: f64,
}

impl TorqueRamp {
    /// Create a ramp at zero torque.
    #[must_use]
    pub fn new(slope: f64, sample_period_us: u32) -> Self {
        Self {
            slope,
            sample_period_s: f64::from(sample_period_us) / 1_000_000.0,
            current: 0.0,
            target: 0.0,
        }
    }

    /// Replace the torque slope.
    pub fn set_slope(&mut self, slope: f64) {
        self.slope = slope;
    }

    /// Torque slope.
    #[must_use]
    pub fn slope(&self) -> f64 {
        self.slope
    }

    /// Set a new target torque.
    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    /// Target torque.
    #[must_use]
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Advance one sample and return the torque setpoint.
    pub fn next_setpoint(&mut self) -> f64 {
        self.current = approach(self.current, self.target, self.slope * self.sample_period_s);
        self.current
    }

    /// Restart the ramp at `torque`.
    pub fn reset(&mut self, torque: f64) {
        self.current = torque;
        self.target = torque;
    }
}
