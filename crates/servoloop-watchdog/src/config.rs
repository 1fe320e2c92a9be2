//! Configuration types for the watchdog.

use serde::{Deserialize, Serialize};
use servoloop_errors::ConfigError;
use servoloop_errors::config::ensure_non_zero;

/// Electrical protection limits checked every commutation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionLimits {
    /// Absolute phase current above which the phase trips, in mA.
    pub max_phase_current_ma: i32,
    /// DC bus voltage below which the drive trips, in mV.
    pub min_dc_voltage_mv: u32,
    /// DC bus voltage above which the drive trips, in mV.
    pub max_dc_voltage_mv: u32,
}

impl Default for ProtectionLimits {
    fn default() -> Self {
        Self {
            max_phase_current_ma: 10_000,
            min_dc_voltage_mv: 10_000,
            max_dc_voltage_mv: 60_000,
        }
    }
}

/// Watchdog configuration.
///
/// # Real-Time Safety
///
/// Contains only primitive types and is copied into the watchdog at
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Maximum time between two commutation heartbeats, in microseconds.
    pub heartbeat_timeout_us: u32,

    /// Number of consecutive unavailable sensor cycles tolerated before
    /// latching [`servoloop_errors::FaultCode::SensorUnavailable`].
    pub sensor_timeout_cycles: u32,

    /// Electrical protection limits.
    pub protection: ProtectionLimits,
}

impl WatchdogConfig {
    /// Create a configuration with the given heartbeat timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if `heartbeat_timeout_us` is zero.
    pub fn new(heartbeat_timeout_us: u32) -> Result<Self, ConfigError> {
        let config = Self {
            heartbeat_timeout_us,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> WatchdogConfigBuilder {
        WatchdogConfigBuilder::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for zero timeouts, a non-positive current limit or an
    /// inverted voltage window.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_non_zero("heartbeat_timeout_us", self.heartbeat_timeout_us)?;
        ensure_non_zero("sensor_timeout_cycles", self.sensor_timeout_cycles)?;
        if self.protection.max_phase_current_ma <= 0 {
            return Err(ConfigError::out_of_range(
                "max_phase_current_ma",
                self.protection.max_phase_current_ma,
                1,
                i32::MAX,
            ));
        }
        if self.protection.min_dc_voltage_mv >= self.protection.max_dc_voltage_mv {
            return Err(ConfigError::inverted("min_dc_voltage_mv", "max_dc_voltage_mv"));
        }
        Ok(())
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_us: 1_000,
            sensor_timeout_cycles: 10,
            protection: ProtectionLimits::default(),
        }
    }
}

/// Builder for `WatchdogConfig`.
#[derive(Debug, Default)]
pub struct WatchdogConfigBuilder {
    config: WatchdogConfig,
}

impl WatchdogConfigBuilder {
    /// Set the heartbeat timeout in microseconds.
    #[must_use]
    pub fn heartbeat_timeout_us(mut self, us: u32) -> Self {
        self.config.heartbeat_timeout_us = us;
        self
    }

    /// Set the number of tolerated unavailable sensor cycles.
    #[must_use]
    pub fn sensor_timeout_cycles(mut self, cycles: u32) -> Self {
        self.config.sensor_timeout_cycles = cycles;
        self
    }

    /// Set the phase over-current limit in mA.
    #[must_use]
    pub fn max_phase_current_ma(mut self, ma: i32) -> Self {
        self.config.protection.max_phase_current_ma = ma;
        self
    }

    /// Set the DC bus voltage window in mV.
    #[must_use]
    pub fn dc_voltage_window_mv(mut self, min: u32, max: u32) -> Self {
        self.config.protection.min_dc_voltage_mv = min;
        self.config.protection.max_dc_voltage_mv = max;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<WatchdogConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
