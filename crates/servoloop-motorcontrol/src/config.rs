//! Motorcontrol configuration.

use serde::{Deserialize, Serialize};
use servoloop_controllers::{PidConfig, PidGains};
use servoloop_errors::ConfigError;
use servoloop_errors::config::ensure_non_zero;
use servoloop_feedback::{ELECTRICAL_RESOLUTION, Polarity};

use crate::foc::VOLTAGE_FULL_SCALE;

/// Motor construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorType {
    /// Brushless, three phases.
    #[default]
    Bldc,
    /// Brushed DC across phases A and B.
    Bdc,
}

/// Winding connection of a brushless motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindingType {
    /// Star (wye) connection.
    #[default]
    Star,
    /// Delta connection; the phase voltages lead by 30 electrical degrees.
    Delta,
}

/// Configuration of the commutation and torque loop.
///
/// Replaced as a whole by `set_config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorcontrolConfig {
    /// Motor construction.
    pub motor_type: MotorType,
    /// Winding connection.
    pub winding_type: WindingType,
    /// Motor pole pairs.
    pub pole_pairs: u32,
    /// Direction of the applied voltage relative to the sensor.
    pub polarity: Polarity,
    /// Commutation angle offset for positive (clockwise) commands.
    pub hall_offset_clk: u32,
    /// Commutation angle offset for negative (counter-clockwise) commands.
    pub hall_offset_cclk: u32,
    /// Commutation period in microseconds.
    pub commutation_period_us: u32,
    /// Torque constant in mNm per A.
    pub torque_constant: f64,
    /// Torque ceiling in mNm.
    pub max_torque: i32,
    /// PWM counter period.
    pub pwm_max: u16,
    /// Dead time between the high and low side switch, in PWM counts.
    pub dead_time: u16,
    /// Torque loop: torque error (mNm) to q-axis voltage.
    pub torque_pid: PidConfig,
}

impl Default for MotorcontrolConfig {
    fn default() -> Self {
        let commutation_period_us = 100;
        Self {
            motor_type: MotorType::Bldc,
            winding_type: WindingType::Star,
            pole_pairs: 4,
            polarity: Polarity::Normal,
            hall_offset_clk: 0,
            hall_offset_cclk: 0,
            commutation_period_us,
            torque_constant: 50.0,
            max_torque: 1_000,
            pwm_max: 4_096,
            dead_time: 32,
            torque_pid: PidConfig::new(
                PidGains::new(2.0, 400.0, 0.0),
                f64::from(VOLTAGE_FULL_SCALE) / 400.0,
                f64::from(VOLTAGE_FULL_SCALE),
                commutation_period_us,
            )
            .with_derivative_filter(1.0),
        }
    }
}

impl MotorcontrolConfig {
    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> MotorcontrolConfigBuilder {
        MotorcontrolConfigBuilder::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for zero pole pairs or period, offsets outside the
    /// electrical range, a non-positive torque ceiling, a dead time that
    /// leaves no PWM range, or an invalid torque PID.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_non_zero("pole_pairs", self.pole_pairs)?;
        ensure_non_zero("commutation_period_us", self.commutation_period_us)?;
        for (field, offset) in [
            ("hall_offset_clk", self.hall_offset_clk),
            ("hall_offset_cclk", self.hall_offset_cclk),
        ] {
            if offset >= ELECTRICAL_RESOLUTION {
                return Err(ConfigError::out_of_range(
                    field,
                    offset,
                    0,
                    ELECTRICAL_RESOLUTION - 1,
                ));
            }
        }
        if self.max_torque <= 0 {
            return Err(ConfigError::out_of_range("max_torque", self.max_torque, 1, i32::MAX));
        }
        if u32::from(self.dead_time).saturating_mul(2) >= u32::from(self.pwm_max) {
            return Err(ConfigError::inverted("dead_time", "pwm_max"));
        }
        self.torque_pid.validate()
    }
}

/// Builder for `MotorcontrolConfig`.
#[derive(Debug, Default)]
pub struct MotorcontrolConfigBuilder {
    config: MotorcontrolConfig,
}

impl MotorcontrolConfigBuilder {
    /// Set the motor construction.
    #[must_use]
    pub fn motor_type(mut self, motor_type: MotorType) -> Self {
        self.config.motor_type = motor_type;
        self
    }

    /// Set the winding connection.
    #[must_use]
    pub fn winding_type(mut self, winding_type: WindingType) -> Self {
        self.config.winding_type = winding_type;
        self
    }

    /// Set the pole pairs.
    #[must_use]
    pub fn pole_pairs(mut self, pole_pairs: u32) -> Self {
        self.config.pole_pairs = pole_pairs;
        self
    }

    /// Set the voltage polarity.
    #[must_use]
    pub fn polarity(mut self, polarity: Polarity) -> Self {
        self.config.polarity = polarity;
        self
    }

    /// Set both commutation offsets.
    #[must_use]
    pub fn offsets(mut self, clk: u32, cclk: u32) -> Self {
        self.config.hall_offset_clk = clk;
        self.config.hall_offset_cclk = cclk;
        self
    }

    /// Set the commutation period. The torque PID samples at the same rate.
    #[must_use]
    pub fn commutation_period_us(mut self, us: u32) -> Self {
        self.config.commutation_period_us = us;
        self.config.torque_pid.sample_period_us = us;
        self
    }

    /// Set the torque constant in mNm/A.
    #[must_use]
    pub fn torque_constant(mut self, torque_constant: f64) -> Self {
        self.config.torque_constant = torque_constant;
        self
    }

    /// Set the torque ceiling in mNm.
    #[must_use]
    pub fn max_torque(mut self, max_torque: i32) -> Self {
        self.config.max_torque = max_torque;
        self
    }

    /// Set the PWM period and dead time.
    #[must_use]
    pub fn pwm(mut self, pwm_max: u16, dead_time: u16) -> Self {
        self.config.pwm_max = pwm_max;
        self.config.dead_time = dead_time;
        self
    }

    /// Set the torque PID gains.
    #[must_use]
    pub fn torque_gains(mut self, gains: PidGains) -> Self {
        self.config.torque_pid.gains = gains;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// See [`MotorcontrolConfig::validate`].
    pub fn build(self) -> Result<MotorcontrolConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
