//! Nonlinear position controller with saturation
//!
//! The outer loop commands a speed proportional to the position error, but
//! never faster than the speed from which the drive can still stop at the
//! target with the available torque:
//!
//! ```text
//! a_max   = margin * t_max / J
//! v_dyn   = min(w_max, sqrt(2 * a_max * |e|))
//! v_cmd   = clamp(kp * e, -v_dyn, v_dyn)
//! torque  = clamp(kd * (v_cmd - w) + ki * integral(v_cmd - w), -t_max, t_max)
//! ```
//!
//! Positions are in sensor ticks, speeds in rad/s, torques in mNm and the
//! inertia in kg·m².

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};
use servoloop_errors::ConfigError;

use crate::pid::saturate;

/// Fraction of the torque-limited deceleration used for the approach speed.
pub const DECELERATION_MARGIN: f64 = 0.8;

/// Nonlinear position controller parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NonlinearConfig {
    /// Position error to speed command gain, 1/s
    pub kp: f64,
    /// Speed error integral to torque gain, mNm/rad
    pub ki: f64,
    /// Speed error to torque gain, mNm/(rad/s)
    pub kd: f64,
    /// Position sensor ticks per mechanical turn
    pub resolution: u32,
    /// Maximum speed, rad/s
    pub w_max: f64,
    /// Maximum torque, mNm
    pub t_max: f64,
    /// Moment of inertia, kg·m²
    pub j: f64,
    /// Controller sample period in microseconds
    pub sample_period_us: u32,
}

impl Default for NonlinearConfig {
    fn default() -> Self {
        Self {
            kp: 20.0,
            ki: 0.0,
            kd: 40.0,
            resolution: 65_536,
            w_max: 300.0,
            t_max: 1_000.0,
            j: 0.000_2,
            sample_period_us: 1_000,
        }
    }
}

impl NonlinearConfig {
    /// Sample period in seconds.
    #[must_use]
    pub fn sample_period_s(&self) -> f64 {
        f64::from(self.sample_period_us) / 1_000_000.0
    }

    /// Radians per sensor tick.
    #[must_use]
    pub fn radians_per_tick(&self) -> f64 {
        TAU / f64::from(self.resolution.max(1))
    }

    /// Deceleration budget in rad/s², or zero without a usable inertia.
    #[must_use]
    pub fn max_deceleration(&self) -> f64 {
        if self.j > 0.0 {
            DECELERATION_MARGIN * (self.t_max.abs() / 1_000.0) / self.j
        } else {
            0.0
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero resolution, zero sample period or
    /// a non-positive inertia.
    pub fn validate(&self) -> Result<(), ConfigError> {
        servoloop_errors::config::ensure_non_zero("resolution", self.resolution)?;
        servoloop_errors::config::ensure_non_zero("sample_period_us", self.sample_period_us)?;
        if !(self.j > 0.0) {
            return Err(ConfigError::zero("j"));
        }
        Ok(())
    }
}

/// State of the nonlinear position controller.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct NonlinearState {
    /// Speed error integral, rad
    pub integral: f64,
    /// Approach speed bound of the last sample, rad/s
    pub dynamic_max_speed: f64,
    /// Speed command of the last sample, rad/s
    pub speed_command: f64,
    /// Torque command of the last sample, mNm
    pub torque_command: f64,
}

/// Nonlinear position controller instance.
#[derive(Debug, Clone, PartialEq)]
pub struct NonlinearPositionController {
    config: NonlinearConfig,
    state: NonlinearState,
}

impl NonlinearPositionController {
    /// Create a controller with cleared state.
    #[must_use]
    pub fn new(config: NonlinearConfig) -> Self {
        Self {
            config,
            state: NonlinearState::default(),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &NonlinearConfig {
        &self.config
    }

    /// Replace the configuration, keeping the state.
    pub fn set_config(&mut self, config: NonlinearConfig) {
        self.config = config;
    }

    /// Update the moment of inertia.
    pub fn set_j(&mut self, j: f64) {
        self.config.j = j;
    }

    /// Update the torque limit.
    pub fn set_t_max(&mut self, t_max: f64) {
        self.config.t_max = t_max;
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &NonlinearState {
        &self.state
    }

    /// Approach speed bound of the last sample, rad/s.
    #[must_use]
    pub fn dynamic_max_speed(&self) -> f64 {
        self.state.dynamic_max_speed
    }

    /// Run one sample.
    ///
    /// `previous` and `feedback` are the measured positions of the previous
    /// and the current sample. Returns the torque command in mNm.
    ///
    /// # Example
    ///
    /// ```
    /// use servoloop_controllers::{NonlinearConfig, NonlinearPositionController};
    ///
    /// let mut controller = NonlinearPositionController::new(NonlinearConfig::default());
    /// let torque = controller.update(10_000.0, 0.0, 0.0);
    /// assert!(torque > 0.0);
    /// assert!(torque <= NonlinearConfig::default().t_max);
    /// ```
    pub fn update(&mut self, reference: f64, previous: f64, feedback: f64) -> f64 {
        let c = &self.config;
        let dt = c.sample_period_s();
        let rad = c.radians_per_tick();

        let error = (reference - feedback) * rad;
        let speed = if dt > 0.0 {
            (feedback - previous) * rad / dt
        } else {
            0.0
        };

        let dynamic_max_speed = (2.0 * c.max_deceleration() * error.abs())
            .sqrt()
            .min(c.w_max.abs());
        let speed_command = saturate(c.kp * error, dynamic_max_speed);
        let speed_error = speed_command - speed;

        let integral_limit = if c.ki.abs() > 0.0 {
            c.t_max.abs() / c.ki.abs()
        } else {
            0.0
        };
        let integral = saturate(self.state.integral + speed_error * dt, integral_limit);
        let torque = saturate(c.kd * speed_error + c.ki * integral, c.t_max);

        self.state = NonlinearState {
            integral,
            dynamic_max_speed,
            speed_command,
            torque_command: torque,
        };
        torque
    }

    /// Clear the controller state. Parameters are kept.
    pub fn reset(&mut self) {
        self.state = NonlinearState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn config() -> NonlinearConfig {
        NonlinearConfig {
            kp: 2.0,
            ki: 0.0,
            kd: 10.0,
            resolution: 4_096,
            w_max: 50.0,
            t_max: 1_000.0,
            j: 0.001,
            sample_period_us: 1_000,
        }
    }

    #[test]
    fn test_approach_speed_follows_stopping_distance() {
        let mut controller = NonlinearPositionController::new(NonlinearConfig {
            kp: 1_000.0,
            ..config()
        });
        // Half a turn away: a_max = 0.8 * 1 Nm / 0.001 = 800 rad/s^2.
        controller.update(2_048.0, 0.0, 0.0);
        let expected = (2.0 * 800.0 * std::f64::consts::PI).sqrt().min(50.0);
        assert_relative_eq!(controller.dynamic_max_speed(), expected, max_relative = 1e-9);
        assert_relative_eq!(controller.state().speed_command, expected, max_relative = 1e-9);
    }

    #[test]
    fn test_speed_bound_vanishes_at_target() {
        let mut controller = NonlinearPositionController::new(config());
        let torque = controller.update(100.0, 100.0, 100.0);
        assert_relative_eq!(controller.dynamic_max_speed(), 0.0);
        assert_relative_eq!(torque, 0.0);
    }

    #[test]
    fn test_moving_at_target_brakes() {
        let mut controller = NonlinearPositionController::new(config());
        let torque = controller.update(100.0, 90.0, 100.0);
        assert!(torque < 0.0);
    }

    #[test]
    fn test_torque_is_limited() {
        let mut controller = NonlinearPositionController::new(NonlinearConfig {
            kd: 1e9,
            ..config()
        });
        assert_relative_eq!(controller.update(1e6, 0.0, 0.0), 1_000.0);
        assert_relative_eq!(controller.update(-1e6, 0.0, 0.0), -1_000.0);
    }

    #[test]
    fn test_set_j_changes_bound() {
        let mut controller = NonlinearPositionController::new(NonlinearConfig {
            kp: 1_000.0,
            w_max: 1e9,
            ..config()
        });
        controller.update(4_096.0, 0.0, 0.0);
        let light = controller.dynamic_max_speed();
        controller.set_j(0.004);
        controller.update(4_096.0, 0.0, 0.0);
        assert_relative_eq!(controller.dynamic_max_speed(), light / 2.0, max_relative = 1e-9);
    }

    #[test]
    fn test_reaches_target_without_overshoot() {
        let config = config();
        let mut controller = NonlinearPositionController::new(config);
        let dt = config.sample_period_s();
        let target = 4_096.0;

        let (mut position, mut previous, mut speed) = (0.0f64, 0.0f64, 0.0f64);
        let mut peak = 0.0f64;
        for _ in 0..5_000 {
            let torque = controller.update(target, previous, position);
            speed += torque / 1_000.0 / config.j * dt;
            previous = position;
            position += speed * dt / config.radians_per_tick();
            peak = peak.max(position);
        }
        assert!(peak <= target * 1.005, "peak {peak}");
        assert!((position - target).abs() < 1.0, "final {position}");
    }

    #[test]
    fn test_validate() {
        assert!(config().validate().is_ok());
        assert!(NonlinearConfig { j: 0.0, ..config() }.validate().is_err());
        assert!(NonlinearConfig { resolution: 0, ..config() }.validate().is_err());
    }
}
