//! PID controller
//!
//! Parallel-form PID with the derivative acting on low-pass filtered
//! feedback and anti-windup by clamping the integral accumulator.

use serde::{Deserialize, Serialize};
use servoloop_errors::ConfigError;

/// Fixed denominator for integer gain numerators.
pub const PID_DENOMINATOR: i32 = 10_000;

/// Clamp `value` to `[-limit, limit]`.
///
/// The sign of `limit` is ignored, so a misconfigured negative limit never
/// inverts the interval.
#[must_use]
pub fn saturate(value: f64, limit: f64) -> f64 {
    let limit = limit.abs();
    value.max(-limit).min(limit)
}

/// Proportional, integral and derivative gains.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PidGains {
    /// Proportional gain
    pub kp: f64,
    /// Integral gain, per second
    pub ki: f64,
    /// Derivative gain, in seconds
    pub kd: f64,
}

impl PidGains {
    /// Create gains from real values.
    #[must_use]
    pub const fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }

    /// Create gains from integer numerators over [`PID_DENOMINATOR`].
    ///
    /// # Example
    ///
    /// ```
    /// use servoloop_controllers::PidGains;
    ///
    /// let gains = PidGains::from_numerators(15_000, 500, 0);
    /// assert!((gains.kp - 1.5).abs() < 1e-12);
    /// assert_eq!(gains.to_numerators(), (15_000, 500, 0));
    /// ```
    #[must_use]
    pub fn from_numerators(kp: i32, ki: i32, kd: i32) -> Self {
        let denominator = f64::from(PID_DENOMINATOR);
        Self {
            kp: f64::from(kp) / denominator,
            ki: f64::from(ki) / denominator,
            kd: f64::from(kd) / denominator,
        }
    }

    /// Integer numerators over [`PID_DENOMINATOR`], rounded to nearest and
    /// saturated to the `i32` range.
    #[must_use]
    pub fn to_numerators(&self) -> (i32, i32, i32) {
        (
            to_numerator(self.kp),
            to_numerator(self.ki),
            to_numerator(self.kd),
        )
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_numerator(gain: f64) -> i32 {
    let scaled = (gain * f64::from(PID_DENOMINATOR)).round();
    if scaled.is_nan() {
        return 0;
    }
    // Float to int `as` casts saturate.
    scaled as i32
}

/// Configuration of one PID instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidConfig {
    /// Controller gains
    pub gains: PidGains,
    /// Bound on the integral accumulator magnitude (error x seconds)
    pub integral_limit: f64,
    /// Bound on the output magnitude
    pub output_limit: f64,
    /// Feedback low-pass coefficient in `(0, 1]`; `1.0` disables filtering
    pub derivative_filter: f64,
    /// Sample period in microseconds
    pub sample_period_us: u32,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            gains: PidGains::default(),
            integral_limit: 1_000.0,
            output_limit: 1_000.0,
            derivative_filter: 0.5,
            sample_period_us: 1_000,
        }
    }
}

impl PidConfig {
    /// Create a configuration with the given gains and limits.
    #[must_use]
    pub fn new(gains: PidGains, integral_limit: f64, output_limit: f64, sample_period_us: u32) -> Self {
        Self {
            gains,
            integral_limit,
            output_limit,
            sample_period_us,
            ..Self::default()
        }
    }

    /// Set the feedback low-pass coefficient.
    #[must_use]
    pub fn with_derivative_filter(mut self, alpha: f64) -> Self {
        self.derivative_filter = alpha;
        self
    }

    /// Sample period in seconds.
    #[must_use]
    pub fn sample_period_s(&self) -> f64 {
        f64::from(self.sample_period_us) / 1_000_000.0
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero sample period or a derivative
    /// filter coefficient outside `(0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        servoloop_errors::config::ensure_non_zero("sample_period_us", self.sample_period_us)?;
        if !(self.derivative_filter > 0.0 && self.derivative_filter <= 1.0) {
            return Err(ConfigError::out_of_range(
                "derivative_filter",
                self.derivative_filter,
                f64::MIN_POSITIVE,
                1.0,
            ));
        }
        Ok(())
    }
}

/// Mutable state of a PID instance.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PidState {
    /// Integral accumulator, always within `integral_limit`
    pub integral: f64,
    /// Filtered feedback of the previous sample
    pub filtered_feedback: f64,
    /// Whether `filtered_feedback` holds a sample
    pub primed: bool,
}

/// PID controller instance.
///
/// ```text
/// output = Kp * e + Ki * integral(e) - Kd * d/dt(filtered feedback)
/// ```
///
/// # Example
///
/// ```
/// use servoloop_controllers::{PidConfig, PidController, PidGains};
///
/// let config = PidConfig::new(PidGains::new(2.0, 0.0, 0.0), 100.0, 1_000.0, 1_000);
/// let mut pid = PidController::new(config);
/// assert!((pid.update(10.0, 4.0) - 12.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PidController {
    config: PidConfig,
    state: PidState,
}

impl PidController {
    /// Create a controller with cleared state.
    #[must_use]
    pub fn new(config: PidConfig) -> Self {
        Self {
            config,
            state: PidState::default(),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    /// Replace the configuration, keeping the state. The integral is
    /// re-clamped to the new limit.
    pub fn set_config(&mut self, config: PidConfig) {
        self.config = config;
        self.state.integral = saturate(self.state.integral, config.integral_limit);
    }

    /// Replace only the gains.
    pub fn set_gains(&mut self, gains: PidGains) {
        self.config.gains = gains;
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &PidState {
        &self.state
    }

    /// Integral accumulator.
    #[must_use]
    pub fn integral(&self) -> f64 {
        self.state.integral
    }

    /// Run one sample and return the clamped command.
    pub fn update(&mut self, setpoint: f64, feedback: f64) -> f64 {
        let c = &self.config;
        let dt = c.sample_period_s();
        let error = setpoint - feedback;

        self.state.integral = saturate(self.state.integral + error * dt, c.integral_limit);

        let previous = if self.state.primed {
            self.state.filtered_feedback
        } else {
            feedback
        };
        let filtered = previous + c.derivative_filter * (feedback - previous);
        self.state.filtered_feedback = filtered;
        self.state.primed = true;

        let derivative = if dt > 0.0 {
            (filtered - previous) / dt
        } else {
            0.0
        };

        let output = c.gains.kp * error + c.gains.ki * self.state.integral - c.gains.kd * derivative;
        saturate(output, c.output_limit)
    }

    /// Clear integral and derivative history. Gains and limits are kept.
    pub fn reset(&mut self) {
        self.state = PidState::default();
    }
}
