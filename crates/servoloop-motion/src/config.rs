//! Motion control configuration.

use serde::{Deserialize, Serialize};
use servoloop_controllers::{NonlinearConfig, PidConfig, PidGains, PositionProfileLimits, rpm_to_ticks};
use servoloop_errors::ConfigError;
use servoloop_errors::config::ensure_non_zero;
use servoloop_feedback::Polarity;
use servoloop_rt::MOTION_CONTROL_PERIOD_US;

/// Control cascade run in position or velocity control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum ControlStrategy {
    /// Position PID straight to torque.
    PositionPid = 101,
    /// Position PID to velocity, velocity PID to torque.
    #[default]
    PositionPidVelocityCascaded = 102,
    /// Nonlinear position controller with torque-limited approach speed.
    NonlinearPosition = 103,
    /// Velocity PID to torque.
    VelocityPid = 201,
}

impl ControlStrategy {
    /// Numeric tag of the strategy.
    #[must_use]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Strategy for a numeric tag.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            101 => Some(Self::PositionPid),
            102 => Some(Self::PositionPidVelocityCascaded),
            103 => Some(Self::NonlinearPosition),
            201 => Some(Self::VelocityPid),
            _ => None,
        }
    }

    /// Whether the strategy closes a position loop.
    #[must_use]
    pub fn is_position(self) -> bool {
        !matches!(self, Self::VelocityPid)
    }
}

/// Setpoint shaping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Shape setpoints; otherwise commands are applied as they arrive.
    pub enabled: bool,
    /// Cruise velocity of position moves, rpm.
    pub velocity: f64,
    /// Acceleration, rpm/s.
    pub acceleration: f64,
    /// Deceleration, rpm/s.
    pub deceleration: f64,
    /// Torque slope, mNm/s.
    pub torque_slope: f64,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            velocity: 1_000.0,
            acceleration: 10_000.0,
            deceleration: 10_000.0,
            torque_slope: 10_000.0,
        }
    }
}

/// Holding brake handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrakeConfig {
    /// A holding brake is fitted: engaged while disabled, released on enable.
    pub enabled: bool,
    /// Time the brake needs to open; torque stays zero meanwhile, ms.
    pub release_delay_ms: u32,
}

/// Configuration of the motion control task.
///
/// Positions are in sensor ticks, velocities in rpm and torques in mNm.
/// Replaced as a whole by `set_config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionControlConfig {
    /// Cascade used by position control.
    pub strategy: ControlStrategy,
    /// Lower position limit.
    pub min_position: i32,
    /// Upper position limit.
    pub max_position: i32,
    /// Velocity ceiling.
    pub max_speed: f64,
    /// Torque ceiling.
    pub max_torque: f64,
    /// Acceleration ceiling of position moves, rpm/s.
    pub max_acceleration: f64,
    /// Sensor ticks per mechanical turn.
    pub ticks_per_turn: u32,
    /// Control period in microseconds.
    pub control_period_us: u32,
    /// Direction of position, velocity and torque relative to the drive.
    pub polarity: Polarity,
    /// Position loop: ticks to rpm (cascaded) or to mNm (direct).
    pub position_pid: PidConfig,
    /// Velocity loop: rpm to mNm.
    pub velocity_pid: PidConfig,
    /// Nonlinear position controller.
    pub nonlinear: NonlinearConfig,
    /// Setpoint shaping.
    pub profiler: ProfilerConfig,
    /// Holding brake.
    pub brake: BrakeConfig,
}

impl Default for MotionControlConfig {
    fn default() -> Self {
        let period = MOTION_CONTROL_PERIOD_US;
        Self {
            strategy: ControlStrategy::PositionPidVelocityCascaded,
            min_position: -1_000_000_000,
            max_position: 1_000_000_000,
            max_speed: 3_000.0,
            max_torque: 1_000.0,
            max_acceleration: 100_000.0,
            ticks_per_turn: 16_384,
            control_period_us: period,
            polarity: Polarity::Normal,
            position_pid: PidConfig::new(PidGains::new(0.05, 0.0, 0.0), 1_000.0, 3_000.0, period),
            velocity_pid: PidConfig::new(PidGains::new(2.0, 20.0, 0.0), 100.0, 1_000.0, period),
            nonlinear: NonlinearConfig {
                resolution: 16_384,
                sample_period_us: period,
                ..NonlinearConfig::default()
            },
            profiler: ProfilerConfig::default(),
            brake: BrakeConfig::default(),
        }
    }
}

impl MotionControlConfig {
    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> MotionControlConfigBuilder {
        MotionControlConfigBuilder::default()
    }

    /// Limits of the position profiler, in ticks.
    #[must_use]
    pub fn profile_limits(&self) -> PositionProfileLimits {
        PositionProfileLimits {
            min_position: f64::from(self.min_position),
            max_position: f64::from(self.max_position),
            max_velocity: rpm_to_ticks(self.max_speed, self.ticks_per_turn),
            max_acceleration: rpm_to_ticks(self.max_acceleration, self.ticks_per_turn),
        }
    }

    /// Nonlinear controller parameters with the drive limits applied.
    #[must_use]
    pub fn nonlinear_config(&self) -> NonlinearConfig {
        NonlinearConfig {
            resolution: self.ticks_per_turn,
            t_max: self.max_torque,
            sample_period_us: self.control_period_us,
            ..self.nonlinear
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero period or resolution, inverted position
    /// limits, non-positive ceilings, an invalid controller configuration,
    /// or non-positive profile rates while the profiler is enabled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_non_zero("control_period_us", self.control_period_us)?;
        ensure_non_zero("ticks_per_turn", self.ticks_per_turn)?;
        if self.min_position > self.max_position {
            return Err(ConfigError::inverted("min_position", "max_position"));
        }
        for (field, value) in [
            ("max_speed", self.max_speed),
            ("max_torque", self.max_torque),
            ("max_acceleration", self.max_acceleration),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::zero(field));
            }
        }
        self.position_pid.validate()?;
        self.velocity_pid.validate()?;
        self.nonlinear_config().validate()?;
        if self.profiler.enabled {
            for (field, value) in [
                ("profiler.velocity", self.profiler.velocity),
                ("profiler.acceleration", self.profiler.acceleration),
                ("profiler.deceleration", self.profiler.deceleration),
                ("profiler.torque_slope", self.profiler.torque_slope),
            ] {
                if !(value > 0.0) {
                    return Err(ConfigError::zero(field));
                }
            }
        }
        Ok(())
    }
}

/// Builder for `MotionControlConfig`.
#[derive(Debug, Default)]
pub struct MotionControlConfigBuilder {
    config: MotionControlConfig,
}

impl MotionControlConfigBuilder {
    /// Set the position control cascade.
    #[must_use]
    pub fn strategy(mut self, strategy: ControlStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Set the position window.
    #[must_use]
    pub fn position_limits(mut self, min: i32, max: i32) -> Self {
        self.config.min_position = min;
        self.config.max_position = max;
        self
    }

    /// Set the velocity ceiling in rpm.
    #[must_use]
    pub fn max_speed(mut self, rpm: f64) -> Self {
        self.config.max_speed = rpm;
        self
    }

    /// Set the torque ceiling in mNm.
    #[must_use]
    pub fn max_torque(mut self, torque: f64) -> Self {
        self.config.max_torque = torque;
        self
    }

    /// Set the sensor resolution.
    #[must_use]
    pub fn ticks_per_turn(mut self, ticks: u32) -> Self {
        self.config.ticks_per_turn = ticks;
        self
    }

    /// Set the control period. The controllers sample at the same rate.
    #[must_use]
    pub fn control_period_us(mut self, us: u32) -> Self {
        self.config.control_period_us = us;
        self.config.position_pid.sample_period_us = us;
        self.config.velocity_pid.sample_period_us = us;
        self.config.nonlinear.sample_period_us = us;
        self
    }

    /// Set the polarity.
    #[must_use]
    pub fn polarity(mut self, polarity: Polarity) -> Self {
        self.config.polarity = polarity;
        self
    }

    /// Set the position loop gains.
    #[must_use]
    pub fn position_gains(mut self, gains: PidGains) -> Self {
        self.config.position_pid.gains = gains;
        self
    }

    /// Set the velocity loop gains.
    #[must_use]
    pub fn velocity_gains(mut self, gains: PidGains) -> Self {
        self.config.velocity_pid.gains = gains;
        self
    }

    /// Set the nonlinear controller parameters.
    #[must_use]
    pub fn nonlinear(mut self, nonlinear: NonlinearConfig) -> Self {
        self.config.nonlinear = nonlinear;
        self
    }

    /// Set the setpoint shaping.
    #[must_use]
    pub fn profiler(mut self, profiler: ProfilerConfig) -> Self {
        self.config.profiler = profiler;
        self
    }

    /// Set the holding brake handling.
    #[must_use]
    pub fn brake(mut self, brake: BrakeConfig) -> Self {
        self.config.brake = brake;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// See [`MotionControlConfig::validate`].
    pub fn build(self) -> Result<MotionControlConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
