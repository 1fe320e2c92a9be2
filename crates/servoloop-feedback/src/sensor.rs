//! Runtime-selected sensor decoder.

use servoloop_errors::DecodeStatus;

use crate::biss::{BissDecoder, BissFrame};
use crate::config::{Polarity, PositionFeedbackConfig, SensorType};
use crate::hall::HallDecoder;
use crate::multiturn::MultiturnTracker;
use crate::qei::{QeiDecoder, QuadratureSample};
use crate::reading::{ELECTRICAL_RESOLUTION, SensorReading, VelocityEstimator};

/// Access to the raw sensor signals of one feedback slot.
///
/// Only the method matching the configured sensor is called.
pub trait SensorPort: Send {
    /// Hall pin levels as `0bCBA`.
    fn hall_pins(&mut self) -> u8 {
        0
    }

    /// Quadrature pin levels.
    fn quadrature(&mut self) -> QuadratureSample {
        QuadratureSample::default()
    }

    /// Generate one serial clock pulse and sample the data line, which idles
    /// high.
    fn serial_clock(&mut self) -> bool {
        true
    }
}

impl<P: SensorPort + ?Sized> SensorPort for Box<P> {
    fn hall_pins(&mut self) -> u8 {
        (**self).hall_pins()
    }

    fn quadrature(&mut self) -> QuadratureSample {
        (**self).quadrature()
    }

    fn serial_clock(&mut self) -> bool {
        (**self).serial_clock()
    }
}

/// Decode state of the configured sensor type.
#[derive(Debug, Clone)]
pub enum SensorKind {
    /// Hall sensors.
    Hall(HallDecoder),
    /// Quadrature encoder.
    Qei(QeiDecoder),
    /// BiSS absolute encoder.
    Biss(BissDecoder),
}

/// Position before polarity and angle offset are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RealPosition {
    /// Absolute multiturn count.
    pub count: i32,
    /// Position within one turn.
    pub singleturn: u32,
    /// Electrical angle without offset.
    pub angle: u32,
    /// Decode status of the last attempt.
    pub status: DecodeStatus,
}

/// Sensor diagnostics that are not part of the published reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorDiagnostics {
    /// Count error found at the last quadrature index pulse.
    pub index_drift: Option<i32>,
    /// Last valid BiSS frame, including the encoder's own multiturn field.
    pub biss_frame: Option<BissFrame>,
}

struct Sample {
    angle: u32,
    singleturn: u32,
    velocity: Option<i32>,
}

/// Decoder for one feedback slot, selected once from the configuration.
///
/// Each poll yields a [`SensorReading`]. A failed decode republishes the
/// previous values with the new status.
#[derive(Debug, Clone)]
pub struct SensorDecoder {
    kind: SensorKind,
    polarity: Polarity,
    offset: u32,
    pole_pairs: u32,
    ticks_per_turn: u32,
    tracker: MultiturnTracker,
    velocity: VelocityEstimator,
    reading: SensorReading,
    real: RealPosition,
}

impl SensorDecoder {
    /// Build the decoder selected by `config`.
    #[must_use]
    pub fn new(config: &PositionFeedbackConfig) -> Self {
        let kind = match config.sensor_type {
            SensorType::Hall => SensorKind::Hall(HallDecoder::new(config.hall, config.pole_pairs)),
            SensorType::Qei => SensorKind::Qei(QeiDecoder::new(config.resolution, config.qei.index)),
            SensorType::Biss => SensorKind::Biss(BissDecoder::new(config.biss)),
        };
        let ticks_per_turn = config.ticks_per_turn().max(1);
        Self {
            kind,
            polarity: config.polarity,
            offset: config.offset % ELECTRICAL_RESOLUTION,
            pole_pairs: config.pole_pairs.max(1),
            ticks_per_turn,
            tracker: MultiturnTracker::new(ticks_per_turn, config.max_ticks),
            velocity: VelocityEstimator::new(config.velocity_compute_period_us, ticks_per_turn),
            reading: SensorReading::default(),
            real: RealPosition::default(),
        }
    }

    /// Sensor-specific decode state.
    #[must_use]
    pub fn kind(&self) -> &SensorKind {
        &self.kind
    }

    /// Ticks per mechanical turn.
    #[must_use]
    pub fn ticks_per_turn(&self) -> u32 {
        self.ticks_per_turn
    }

    /// Latest reading.
    #[must_use]
    pub fn reading(&self) -> SensorReading {
        self.reading
    }

    /// Latest position without polarity and offset.
    #[must_use]
    pub fn real_position(&self) -> RealPosition {
        self.real
    }

    /// Electrical angle offset.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Sensor diagnostics.
    #[must_use]
    pub fn diagnostics(&self) -> SensorDiagnostics {
        match &self.kind {
            SensorKind::Qei(qei) => SensorDiagnostics {
                index_drift: qei.index_drift(),
                biss_frame: None,
            },
            SensorKind::Biss(biss) => SensorDiagnostics {
                index_drift: None,
                biss_frame: biss.last_frame(),
            },
            SensorKind::Hall(_) => SensorDiagnostics::default(),
        }
    }

    /// Sample the sensor once and update the reading.
    pub fn poll<P: SensorPort + ?Sized>(&mut self, port: &mut P, now_us: u64) -> SensorReading {
        let pole_pairs = self.pole_pairs;
        let ticks_per_turn = self.ticks_per_turn;
        let previous = self.real;
        let sample = match &mut self.kind {
            SensorKind::Hall(hall) => hall.update(port.hall_pins(), now_us).map(|s| Sample {
                angle: s.angle,
                singleturn: hall_singleturn(previous, s.angle, pole_pairs),
                velocity: Some(s.velocity),
            }),
            SensorKind::Qei(qei) => qei.update(port.quadrature()).map(|singleturn| Sample {
                angle: electrical_angle(singleturn, ticks_per_turn, pole_pairs),
                singleturn,
                velocity: None,
            }),
            SensorKind::Biss(biss) => biss.read_frame(|| port.serial_clock()).map(|frame| {
                let singleturn = frame.singleturn % ticks_per_turn;
                Sample {
                    angle: electrical_angle(singleturn, ticks_per_turn, pole_pairs),
                    singleturn,
                    velocity: None,
                }
            }),
        };

        match sample {
            Ok(sample) => self.accept(sample, now_us),
            Err(status) => {
                self.reading = self.reading.held(status, now_us);
                self.real.status = status;
            }
        }
        self.reading
    }

    /// Rebase the multiturn count so that the current position reads `count`.
    pub fn set_position(&mut self, count: i32) {
        self.tracker.set_count(self.polarity.apply(count));
        self.real.count = self.tracker.count();
        self.reading.count = count;
    }

    /// Choose the angle offset so that the current electrical angle reads
    /// `angle`. Returns the new offset.
    pub fn set_angle(&mut self, angle: u32) -> u32 {
        let angle = angle % ELECTRICAL_RESOLUTION;
        self.offset = (angle + ELECTRICAL_RESOLUTION - self.real.angle) % ELECTRICAL_RESOLUTION;
        self.reading.angle = angle;
        self.offset
    }

    fn accept(&mut self, sample: Sample, now_us: u64) {
        let count = self.tracker.update(sample.singleturn);
        let estimate = self.velocity.update(self.tracker.travel(), now_us);
        let velocity = sample.velocity.unwrap_or(estimate);

        self.real = RealPosition {
            count,
            singleturn: sample.singleturn,
            angle: sample.angle,
            status: DecodeStatus::NoError,
        };
        let singleturn = match self.polarity {
            Polarity::Normal => sample.singleturn,
            Polarity::Inverted => (self.ticks_per_turn - sample.singleturn) % self.ticks_per_turn,
        };
        self.reading = SensorReading {
            angle: (sample.angle + self.offset) % ELECTRICAL_RESOLUTION,
            singleturn,
            count: self.polarity.apply(count),
            velocity: self.polarity.apply(velocity),
            status: DecodeStatus::NoError,
            timestamp_us: now_us,
        };
    }
}

/// Mechanical singleturn position of a Hall sensor, in electrical ticks
/// across all pole pairs, following the electrical turn from `previous`.
fn hall_singleturn(previous: RealPosition, angle: u32, pole_pairs: u32) -> u32 {
    let quarter = ELECTRICAL_RESOLUTION / 4;
    let electrical_turn = i64::from(previous.singleturn / ELECTRICAL_RESOLUTION);
    let turn = if previous.angle > 3 * quarter && angle < quarter {
        electrical_turn + 1
    } else if previous.angle < quarter && angle > 3 * quarter {
        electrical_turn - 1
    } else {
        electrical_turn
    };
    let turn = u32::try_from(turn.rem_euclid(i64::from(pole_pairs))).unwrap_or(0);
    turn * ELECTRICAL_RESOLUTION + angle
}

/// Electrical angle of a singleturn position.
#[must_use]
pub fn electrical_angle(singleturn: u32, ticks_per_turn: u32, pole_pairs: u32) -> u32 {
    let scaled = u64::from(singleturn) * u64::from(pole_pairs) * u64::from(ELECTRICAL_RESOLUTION)
        / u64::from(ticks_per_turn.max(1));
    u32::try_from(scaled % u64::from(ELECTRICAL_RESOLUTION)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biss::{BissLine, encode_frame};
    use crate::config::BissConfig;
    use servoloop_errors::ConfigError;

    #[derive(Default)]
    struct QeiPort {
        phase: u8,
    }

    impl SensorPort for QeiPort {
        fn quadrature(&mut self) -> QuadratureSample {
            QuadratureSample::from_phase(self.phase, false)
        }
    }

    struct HallPort {
        pins: u8,
    }

    impl SensorPort for HallPort {
        fn hall_pins(&mut self) -> u8 {
            self.pins
        }
    }

    struct BissPort {
        line: BissLine,
    }

    impl SensorPort for BissPort {
        fn serial_clock(&mut self) -> bool {
            self.line.clock()
        }
    }

    #[test]
    fn test_electrical_angle_scales_with_pole_pairs() {
        assert_eq!(electrical_angle(0, 4_000, 4), 0);
        assert_eq!(electrical_angle(500, 4_000, 4), 2_048);
        assert_eq!(electrical_angle(1_000, 4_000, 4), 0);
    }

    #[test]
    fn test_qei_counts_and_estimates_velocity() -> Result<(), ConfigError> {
        let config = PositionFeedbackConfig::builder()
            .sensor_type(SensorType::Qei)
            .resolution(4_000)
            .velocity_compute_period_us(1_000)
            .build()?;
        let mut decoder = SensorDecoder::new(&config);
        let mut port = QeiPort::default();
        decoder.poll(&mut port, 0);
        // Four counts per millisecond: one turn per second
        for step in 1..=8u64 {
            port.phase = (port.phase + 1) % 4;
            decoder.poll(&mut port, step * 250);
        }
        let reading = decoder.reading();
        assert_eq!(reading.count, 8);
        assert_eq!(reading.velocity, 60);
        Ok(())
    }

    #[test]
    fn test_inverted_polarity_negates_position() -> Result<(), ConfigError> {
        let config = PositionFeedbackConfig::builder()
            .sensor_type(SensorType::Qei)
            .polarity(Polarity::Inverted)
            .build()?;
        let mut decoder = SensorDecoder::new(&config);
        let mut port = QeiPort::default();
        decoder.poll(&mut port, 0);
        port.phase = 1;
        let reading = decoder.poll(&mut port, 10);
        assert_eq!(reading.count, -1);
        assert_eq!(reading.singleturn, config.resolution - 1);
        assert_eq!(decoder.real_position().count, 1);
        Ok(())
    }

    #[test]
    fn test_hall_skipped_sector_holds_last_reading() -> Result<(), ConfigError> {
        let config = PositionFeedbackConfig::builder()
            .sensor_type(SensorType::Hall)
            .build()?;
        let order = config.hall.sector_order;
        let sector = |index: usize| order.get(index).copied().unwrap_or(0);
        let mut decoder = SensorDecoder::new(&config);
        let mut port = HallPort { pins: sector(0) };
        decoder.poll(&mut port, 0);
        for step in 1..3u64 {
            port.pins = sector(step as usize);
            decoder.poll(&mut port, step * 1_000);
        }
        let good = decoder.reading();
        assert_eq!(good.status, DecodeStatus::NoError);

        // Sector 2 straight to sector 4
        port.pins = sector(4);
        let held = decoder.poll(&mut port, 3_000);
        assert_eq!(held.status, DecodeStatus::HallSequence);
        assert_eq!(held.count, good.count);
        assert_eq!(held.singleturn, good.singleturn);
        assert_eq!(held.angle, good.angle);
        assert_eq!(held.timestamp_us, 3_000);
        assert_eq!(decoder.real_position().status, DecodeStatus::HallSequence);
        Ok(())
    }

    #[test]
    fn test_biss_crc_error_holds_last_reading() -> Result<(), ConfigError> {
        let biss = BissConfig {
            timeout_ticks: 10,
            ..BissConfig::default()
        };
        let config = PositionFeedbackConfig::builder()
            .sensor_type(SensorType::Biss)
            .biss(biss)
            .build()?;
        let frame = |singleturn| BissFrame {
            multiturn: 0,
            singleturn,
            status: 0b11,
        };
        // idle, ack, busy, start, then payload and CRC
        let mut bits = vec![true, false, false, true];
        bits.extend(encode_frame(&biss, &frame(1 << 16)));
        let mut corrupted = encode_frame(&biss, &frame(1 << 17));
        if let Some(bit) = corrupted.get_mut(3) {
            *bit = !*bit;
        }
        bits.extend([true, false, false, true]);
        bits.extend(corrupted);
        let mut port = BissPort {
            line: BissLine::from_bits(bits),
        };

        let mut decoder = SensorDecoder::new(&config);
        let good = decoder.poll(&mut port, 100);
        assert_eq!(good.status, DecodeStatus::NoError);
        assert_eq!(good.singleturn, 1 << 16);

        let held = decoder.poll(&mut port, 200);
        assert_eq!(held.status, DecodeStatus::CrcError);
        assert_eq!(held.count, good.count);
        assert_eq!(held.singleturn, good.singleturn);
        assert_eq!(held.angle, good.angle);
        assert_eq!(decoder.diagnostics().biss_frame, Some(frame(1 << 16)));
        Ok(())
    }

    #[test]
    fn test_biss_failure_holds_last_reading() -> Result<(), ConfigError> {
        let biss = BissConfig {
            timeout_ticks: 10,
            ..BissConfig::default()
        };
        let config = PositionFeedbackConfig::builder()
            .sensor_type(SensorType::Biss)
            .biss(biss)
            .build()?;
        let frame = BissFrame {
            multiturn: 0,
            singleturn: 1 << 17,
            status: 0b11,
        };
        let mut port = BissPort {
            line: BissLine::with_frame(&biss, &frame, 1, 1),
        };
        let mut decoder = SensorDecoder::new(&config);
        let good = decoder.poll(&mut port, 100);
        assert_eq!(good.status, DecodeStatus::NoError);
        assert_eq!(good.singleturn, 1 << 17);

        let held = decoder.poll(&mut port, 200);
        assert_eq!(held.status, DecodeStatus::NoAck);
        assert_eq!(held.singleturn, good.singleturn);
        assert_eq!(held.timestamp_us, 200);
        Ok(())
    }

    #[test]
    fn test_set_position_and_angle() -> Result<(), ConfigError> {
        let config = PositionFeedbackConfig::builder()
            .sensor_type(SensorType::Qei)
            .build()?;
        let mut decoder = SensorDecoder::new(&config);
        let mut port = QeiPort::default();
        decoder.poll(&mut port, 0);

        decoder.set_position(1_000);
        port.phase = 1;
        assert_eq!(decoder.poll(&mut port, 10).count, 1_001);

        let offset = decoder.set_angle(100);
        assert_eq!(decoder.offset(), offset);
        assert_eq!(decoder.poll(&mut port, 20).angle, 100);
        Ok(())
    }
}
