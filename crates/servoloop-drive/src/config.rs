//! Drive configuration.
//!
//! One JSON document configures the whole stack:
//!
//! ```json
//! {
//!   "feedback": { "sensor_type": "qei", "resolution": 4000 },
//!   "motion": { "ticks_per_turn": 4000 },
//!   "periods": { "motion_us": 1000 }
//! }
//! ```
//!
//! Missing sections and fields take their defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use servoloop_errors::ConfigError;
use servoloop_errors::config::ensure_non_zero;
use servoloop_feedback::PositionFeedbackConfig;
use servoloop_motion::MotionControlConfig;
use servoloop_motorcontrol::MotorcontrolConfig;
use servoloop_rt::{FAST_LOOP_PERIOD_US, MOTION_CONTROL_PERIOD_US};
use servoloop_watchdog::WatchdogConfig;
use tracing::debug;

/// Task periods and deadline tolerance, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPeriods {
    /// Position feedback task.
    pub feedback_us: u32,
    /// Motorcontrol (commutation) task.
    pub motorcontrol_us: u32,
    /// Motion control task; must match `motion.control_period_us`.
    pub motion_us: u32,
    /// Watchdog supervisor task.
    pub supervisor_us: u32,
    /// Lateness beyond which a tick is a missed deadline.
    pub overrun_tolerance_us: u32,
}

impl Default for TaskPeriods {
    fn default() -> Self {
        Self {
            feedback_us: FAST_LOOP_PERIOD_US,
            motorcontrol_us: FAST_LOOP_PERIOD_US,
            motion_us: MOTION_CONTROL_PERIOD_US,
            supervisor_us: 250,
            overrun_tolerance_us: 1_000,
        }
    }
}

impl TaskPeriods {
    /// Overrun tolerance as a duration.
    #[must_use]
    pub fn overrun_tolerance(&self) -> Duration {
        Duration::from_micros(u64::from(self.overrun_tolerance_us))
    }

    /// Validate the periods.
    ///
    /// # Errors
    ///
    /// Returns an error if any period is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_non_zero("periods.feedback_us", self.feedback_us)?;
        ensure_non_zero("periods.motorcontrol_us", self.motorcontrol_us)?;
        ensure_non_zero("periods.motion_us", self.motion_us)?;
        ensure_non_zero("periods.supervisor_us", self.supervisor_us)?;
        Ok(())
    }
}

/// Configuration of a complete drive.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Position sensor.
    pub feedback: PositionFeedbackConfig,
    /// Commutation and torque loop.
    pub motorcontrol: MotorcontrolConfig,
    /// Position and velocity loops.
    pub motion: MotionControlConfig,
    /// Fault supervision and protection limits.
    pub watchdog: WatchdogConfig,
    /// Task timing.
    pub periods: TaskPeriods,
}

impl DriveConfig {
    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> DriveConfigBuilder {
        DriveConfigBuilder::default()
    }

    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and a validation
    /// error for an inconsistent configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`DriveConfig::from_json_str`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let config = Self::from_json_str(&json)?;
        debug!(path = %path.display(), "Loaded drive configuration");
        Ok(config)
    }

    /// Serialize as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate every section and their consistency.
    ///
    /// Motion control works in sensor ticks, so its resolution must match the
    /// sensor's, and its controllers are discretized for the motion period.
    ///
    /// # Errors
    ///
    /// Returns the first invalid section, or
    /// [`ConfigError::OutOfRange`] naming the inconsistent field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.feedback.validate()?;
        self.motorcontrol.validate()?;
        self.motion.validate()?;
        self.watchdog.validate()?;
        self.periods.validate()?;

        let ticks = self.feedback.ticks_per_turn();
        if self.motion.ticks_per_turn != ticks {
            return Err(ConfigError::out_of_range(
                "motion.ticks_per_turn",
                self.motion.ticks_per_turn,
                ticks,
                ticks,
            ));
        }
        if self.motion.control_period_us != self.periods.motion_us {
            return Err(ConfigError::out_of_range(
                "motion.control_period_us",
                self.motion.control_period_us,
                self.periods.motion_us,
                self.periods.motion_us,
            ));
        }
        Ok(())
    }
}

/// Builder for `DriveConfig`.
///
/// Sets derived fields so the sections stay consistent: the motion
/// resolution follows the sensor and the motion period follows the task
/// period.
#[derive(Debug, Default)]
pub struct DriveConfigBuilder {
    config: DriveConfig,
}

impl DriveConfigBuilder {
    /// Set the position sensor.
    #[must_use]
    pub fn feedback(mut self, feedback: PositionFeedbackConfig) -> Self {
        self.config.feedback = feedback;
        self
    }

    /// Set the motorcontrol section.
    #[must_use]
    pub fn motorcontrol(mut self, motorcontrol: MotorcontrolConfig) -> Self {
        self.config.motorcontrol = motorcontrol;
        self
    }

    /// Set the motion control section.
    #[must_use]
    pub fn motion(mut self, motion: MotionControlConfig) -> Self {
        self.config.motion = motion;
        self
    }

    /// Set the watchdog section.
    #[must_use]
    pub fn watchdog(mut self, watchdog: WatchdogConfig) -> Self {
        self.config.watchdog = watchdog;
        self
    }

    /// Set the task periods.
    #[must_use]
    pub fn periods(mut self, periods: TaskPeriods) -> Self {
        self.config.periods = periods;
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(mut self) -> Result<DriveConfig, ConfigError> {
        let config = &mut self.config;
        config.motion.ticks_per_turn = config.feedback.ticks_per_turn();
        let period = config.periods.motion_us;
        config.motion.control_period_us = period;
        config.motion.position_pid.sample_period_us = period;
        config.motion.velocity_pid.sample_period_us = period;
        config.motion.nonlinear.sample_period_us = period;
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use servoloop_feedback::SensorType;

    #[test]
    fn test_default_is_consistent() {
        assert_eq!(DriveConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_partial_document_takes_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let config = DriveConfig::from_json_str(r#"{ "periods": { "supervisor_us": 500 } }"#)?;
        assert_eq!(config.periods.supervisor_us, 500);
        assert_eq!(config.periods.motion_us, MOTION_CONTROL_PERIOD_US);
        assert_eq!(config.motorcontrol, MotorcontrolConfig::default());
        Ok(())
    }

    #[test]
    fn test_resolution_mismatch_is_rejected() {
        let json = r#"{ "feedback": { "sensor_type": "qei", "resolution": 4000 } }"#;
        let err = DriveConfig::from_json_str(json);
        assert!(matches!(
            err,
            Err(ConfigError::OutOfRange {
                field: "motion.ticks_per_turn",
                ..
            })
        ));
    }

    #[test]
    fn test_builder_derives_motion_fields() -> Result<(), ConfigError> {
        let feedback = PositionFeedbackConfig {
            sensor_type: SensorType::Qei,
            resolution: 4_000,
            ..PositionFeedbackConfig::default()
        };
        let config = DriveConfig::builder()
            .feedback(feedback)
            .periods(TaskPeriods {
                motion_us: 2_000,
                ..TaskPeriods::default()
            })
            .build()?;
        assert_eq!(config.motion.ticks_per_turn, 4_000);
        assert_eq!(config.motion.control_period_us, 2_000);
        assert_eq!(config.motion.velocity_pid.sample_period_us, 2_000);
        Ok(())
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            DriveConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_zero_period_is_rejected() {
        let config = DriveConfig {
            periods: TaskPeriods {
                supervisor_us: 0,
                ..TaskPeriods::default()
            },
            ..DriveConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::zero("periods.supervisor_us")));
    }
}
