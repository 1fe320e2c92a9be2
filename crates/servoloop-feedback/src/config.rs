//! Position feedback configuration.

use serde::{Deserialize, Serialize};
use servoloop_errors::ConfigError;
use servoloop_errors::config::ensure_non_zero;

use crate::reading::ELECTRICAL_RESOLUTION;

/// Kind of position sensor attached to a feedback slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    /// Three digital Hall sensors, six sectors per electrical turn.
    #[default]
    Hall,
    /// Incremental quadrature encoder, four counts per line.
    Qei,
    /// Synchronous-serial absolute encoder (BiSS-C).
    Biss,
}

/// Counting direction of a sensor relative to the motor shaft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Sensor counts up when the shaft turns in the positive direction.
    #[default]
    Normal,
    /// Sensor counts down when the shaft turns in the positive direction.
    Inverted,
}

impl Polarity {
    /// `1` or `-1`.
    #[must_use]
    pub fn sign(self) -> i32 {
        match self {
            Polarity::Normal => 1,
            Polarity::Inverted => -1,
        }
    }

    /// Apply the polarity to a signed value.
    #[must_use]
    pub fn apply(self, value: i32) -> i32 {
        match self {
            Polarity::Normal => value,
            Polarity::Inverted => value.wrapping_neg(),
        }
    }

    /// Apply the polarity to a floating point value.
    #[must_use]
    pub fn apply_f64(self, value: f64) -> f64 {
        match self {
            Polarity::Normal => value,
            Polarity::Inverted => -value,
        }
    }
}

/// Hall sensor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HallConfig {
    /// Pin codes (`0bCBA`) of the six sectors in positive rotation order.
    pub sector_order: [u8; 6],
    /// Longest accepted time between two transitions, in microseconds.
    /// Slower rotation reads as standstill.
    pub max_transition_period_us: u32,
}

impl Default for HallConfig {
    fn default() -> Self {
        Self {
            sector_order: [4, 6, 2, 3, 1, 5],
            max_transition_period_us: 1_000_000 / 6,
        }
    }
}

/// Quadrature encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QeiConfig {
    /// Whether an index pulse is wired and used to resynchronize the count.
    pub index: bool,
}

/// BiSS frame geometry and timing.
///
/// Field lengths include filling bits; resolutions are the number of
/// significant bits, left-aligned in the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BissConfig {
    /// Length of the multiturn field in bits.
    pub multiturn_length: u8,
    /// Significant bits of the multiturn field.
    pub multiturn_resolution: u8,
    /// Length of the singleturn field in bits.
    pub singleturn_length: u8,
    /// Significant bits of the singleturn field.
    pub singleturn_resolution: u8,
    /// Length of the status field in bits.
    pub status_length: u8,
    /// CRC polynomial in reversed representation, `0` for no CRC.
    pub crc_poly: u32,
    /// Clock ticks to wait for the acknowledge before giving up.
    pub timeout_ticks: u32,
    /// Clock ticks to wait for the start bit after the acknowledge.
    pub busy_ticks: u32,
}

impl BissConfig {
    /// Number of payload bits between start bit and CRC.
    #[must_use]
    pub fn payload_length(&self) -> u32 {
        u32::from(self.multiturn_length)
            + u32::from(self.singleturn_length)
            + u32::from(self.status_length)
    }

    /// Singleturn ticks per mechanical turn.
    #[must_use]
    pub fn singleturn_ticks(&self) -> u32 {
        1u32.checked_shl(u32::from(self.singleturn_resolution))
            .unwrap_or(0)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ensure_non_zero("biss.singleturn_resolution", self.singleturn_resolution)?;
        ensure_non_zero("biss.timeout_ticks", self.timeout_ticks)?;
        ensure_non_zero("biss.busy_ticks", self.busy_ticks)?;
        if self.multiturn_resolution > self.multiturn_length {
            return Err(ConfigError::inverted(
                "biss.multiturn_resolution",
                "biss.multiturn_length",
            ));
        }
        if self.singleturn_resolution > self.singleturn_length {
            return Err(ConfigError::inverted(
                "biss.singleturn_resolution",
                "biss.singleturn_length",
            ));
        }
        if self.singleturn_resolution > 30 {
            return Err(ConfigError::out_of_range(
                "biss.singleturn_resolution",
                self.singleturn_resolution,
                1,
                30,
            ));
        }
        if self.multiturn_resolution > 31 {
            return Err(ConfigError::out_of_range(
                "biss.multiturn_resolution",
                self.multiturn_resolution,
                0,
                31,
            ));
        }
        let payload = self.payload_length();
        if payload > 64 {
            return Err(ConfigError::out_of_range("biss.payload_length", payload, 1, 64));
        }
        Ok(())
    }
}

impl Default for BissConfig {
    fn default() -> Self {
        Self {
            multiturn_length: 10,
            multiturn_resolution: 10,
            singleturn_length: 18,
            singleturn_resolution: 18,
            status_length: 2,
            crc_poly: 0b11_0000,
            timeout_ticks: 20 * 100,
            busy_ticks: 30,
        }
    }
}

/// Configuration of one position feedback slot.
///
/// Replaced as a whole by `set_config`; never modified during a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionFeedbackConfig {
    /// Attached sensor.
    pub sensor_type: SensorType,
    /// Direction of position and velocity.
    pub polarity: Polarity,
    /// Motor pole pairs.
    pub pole_pairs: u32,
    /// Quadrature counts per mechanical turn (lines x 4).
    ///
    /// Hall and BiSS sensors derive their resolution, see
    /// [`PositionFeedbackConfig::ticks_per_turn`].
    pub resolution: u32,
    /// Offset added to the electrical angle, in `0..ELECTRICAL_RESOLUTION`.
    pub offset: u32,
    /// Period of the position-difference velocity estimate, in microseconds.
    pub velocity_compute_period_us: u32,
    /// Multiturn count magnitude at which the count restarts from zero.
    pub max_ticks: i32,
    /// Hall sensor settings.
    pub hall: HallConfig,
    /// Quadrature encoder settings.
    pub qei: QeiConfig,
    /// BiSS encoder settings.
    pub biss: BissConfig,
}

impl Default for PositionFeedbackConfig {
    fn default() -> Self {
        Self {
            sensor_type: SensorType::Hall,
            polarity: Polarity::Normal,
            pole_pairs: 4,
            resolution: 4_000,
            offset: 0,
            velocity_compute_period_us: 1_000,
            max_ticks: 0x7fff_ffff,
            hall: HallConfig::default(),
            qei: QeiConfig::default(),
            biss: BissConfig::default(),
        }
    }
}

impl PositionFeedbackConfig {
    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> PositionFeedbackConfigBuilder {
        PositionFeedbackConfigBuilder::default()
    }

    /// Mechanical ticks per turn of the selected sensor.
    ///
    /// Hall sensors count electrical angle, so one mechanical turn is
    /// `ELECTRICAL_RESOLUTION * pole_pairs` ticks.
    #[must_use]
    pub fn ticks_per_turn(&self) -> u32 {
        match self.sensor_type {
            SensorType::Hall => ELECTRICAL_RESOLUTION.saturating_mul(self.pole_pairs),
            SensorType::Qei => self.resolution,
            SensorType::Biss => self.biss.singleturn_ticks(),
        }
    }

    /// Validate the configuration.
    ///
    /// Only values that would make decoding impossible are rejected.
    ///
    /// # Errors
    ///
    /// Returns an error for zero resolution, pole pairs or periods, an offset
    /// outside the electrical range, or an impossible BiSS frame layout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_non_zero("pole_pairs", self.pole_pairs)?;
        ensure_non_zero("velocity_compute_period_us", self.velocity_compute_period_us)?;
        if self.max_ticks <= 0 {
            return Err(ConfigError::out_of_range("max_ticks", self.max_ticks, 1, i32::MAX));
        }
        if self.offset >= ELECTRICAL_RESOLUTION {
            return Err(ConfigError::out_of_range(
                "offset",
                self.offset,
                0,
                ELECTRICAL_RESOLUTION - 1,
            ));
        }
        match self.sensor_type {
            SensorType::Hall => {
                ensure_non_zero(
                    "hall.max_transition_period_us",
                    self.hall.max_transition_period_us,
                )?;
                let mut seen = [false; 8];
                for &code in &self.hall.sector_order {
                    let slot = seen.get_mut(usize::from(code));
                    match slot {
                        Some(slot) if (1..=6).contains(&code) && !*slot => *slot = true,
                        _ => {
                            return Err(ConfigError::out_of_range(
                                "hall.sector_order",
                                code,
                                1,
                                6,
                            ));
                        }
                    }
                }
            }
            SensorType::Qei => {
                ensure_non_zero("resolution", self.resolution)?;
                if self.resolution > i32::MAX as u32 / 2 {
                    return Err(ConfigError::out_of_range(
                        "resolution",
                        self.resolution,
                        1,
                        i32::MAX as u32 / 2,
                    ));
                }
            }
            SensorType::Biss => self.biss.validate()?,
        }
        Ok(())
    }
}

/// Builder for `PositionFeedbackConfig`.
#[derive(Debug, Default)]
pub struct PositionFeedbackConfigBuilder {
    config: PositionFeedbackConfig,
}

impl PositionFeedbackConfigBuilder {
    /// Select the sensor type.
    #[must_use]
    pub fn sensor_type(mut self, sensor_type: SensorType) -> Self {
        self.config.sensor_type = sensor_type;
        self
    }

    /// Set the polarity.
    #[must_use]
    pub fn polarity(mut self, polarity: Polarity) -> Self {
        self.config.polarity = polarity;
        self
    }

    /// Set the motor pole pairs.
    #[must_use]
    pub fn pole_pairs(mut self, pole_pairs: u32) -> Self {
        self.config.pole_pairs = pole_pairs;
        self
    }

    /// Set the quadrature counts per turn.
    #[must_use]
    pub fn resolution(mut self, resolution: u32) -> Self {
        self.config.resolution = resolution;
        self
    }

    /// Set the electrical angle offset.
    #[must_use]
    pub fn offset(mut self, offset: u32) -> Self {
        self.config.offset = offset;
        self
    }

    /// Set the velocity compute period.
    #[must_use]
    pub fn velocity_compute_period_us(mut self, us: u32) -> Self {
        self.config.velocity_compute_period_us = us;
        self
    }

    /// Set the multiturn count bound.
    #[must_use]
    pub fn max_ticks(mut self, max_ticks: i32) -> Self {
        self.config.max_ticks = max_ticks;
        self
    }

    /// Set the Hall sensor settings.
    #[must_use]
    pub fn hall(mut self, hall: HallConfig) -> Self {
        self.config.hall = hall;
        self
    }

    /// Enable or disable the quadrature index pulse.
    #[must_use]
    pub fn qei_index(mut self, index: bool) -> Self {
        self.config.qei.index = index;
        self
    }

    /// Set the BiSS settings.
    #[must_use]
    pub fn biss(mut self, biss: BissConfig) -> Self {
        self.config.biss = biss;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<PositionFeedbackConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(PositionFeedbackConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_ticks_per_turn_per_sensor() -> Result<(), ConfigError> {
        let hall = PositionFeedbackConfig::builder().pole_pairs(5).build()?;
        assert_eq!(hall.ticks_per_turn(), 5 * 4096);

        let qei = PositionFeedbackConfig::builder()
            .sensor_type(SensorType::Qei)
            .resolution(8_000)
            .build()?;
        assert_eq!(qei.ticks_per_turn(), 8_000);

        let biss = PositionFeedbackConfig::builder()
            .sensor_type(SensorType::Biss)
            .build()?;
        assert_eq!(biss.ticks_per_turn(), 1 << 18);
        Ok(())
    }

    #[test]
    fn test_zero_pole_pairs_rejected() {
        let result = PositionFeedbackConfig::builder().pole_pairs(0).build();
        assert_eq!(result, Err(ConfigError::zero("pole_pairs")));
    }

    #[test]
    fn test_duplicate_hall_sector_rejected() {
        let hall = HallConfig {
            sector_order: [4, 6, 2, 3, 1, 4],
            ..HallConfig::default()
        };
        let result = PositionFeedbackConfig::builder().hall(hall).build();
        assert!(matches!(result, Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn test_biss_resolution_longer_than_field_rejected() {
        let biss = BissConfig {
            singleturn_length: 12,
            singleturn_resolution: 13,
            ..BissConfig::default()
        };
        let result = PositionFeedbackConfig::builder()
            .sensor_type(SensorType::Biss)
            .biss(biss)
            .build();
        assert_eq!(
            result,
            Err(ConfigError::inverted(
                "biss.singleturn_resolution",
                "biss.singleturn_length"
            ))
        );
    }

    #[test]
    fn test_polarity() {
        assert_eq!(Polarity::Normal.apply(10), 10);
        assert_eq!(Polarity::Inverted.apply(10), -10);
        assert_eq!(Polarity::Inverted.sign(), -1);
    }

    #[test]
    fn test_serde_defaults_missing_fields() -> Result<(), Box<dyn std::error::Error>> {
        let config: PositionFeedbackConfig =
            serde_json::from_str(r#"{ "sensor_type": "qei", "resolution": 2048 }"#)?;
        assert_eq!(config.sensor_type, SensorType::Qei);
        assert_eq!(config.resolution, 2048);
        assert_eq!(config.pole_pairs, 4);
        Ok(())
    }
}
