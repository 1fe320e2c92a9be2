//! Hall sensor decoding.
//!
//! Three Hall sensors split each electrical turn into six sectors. The
//! decoder tracks sector transitions, derives the direction from the cyclic
//! order of consecutive sectors and the velocity from a 3-tap moving average
//! of the transition periods. Between transitions the electrical angle is
//! interpolated from the last sector boundary at the filtered speed.

use servoloop_errors::DecodeStatus;

use crate::config::HallConfig;
use crate::reading::{ELECTRICAL_RESOLUTION, MICROS_PER_MINUTE};

/// Number of periods averaged for the velocity estimate.
pub const HALL_FILTER_ORDER: usize = 3;

const SECTORS: u32 = 6;
const SECTOR_SPAN: u32 = ELECTRICAL_RESOLUTION / SECTORS;

/// Electrical angle of the start of sector `index` (modulo six).
#[must_use]
pub fn sector_landmark(index: usize) -> u32 {
    let index = u32::try_from(index % 6).unwrap_or(0);
    index * ELECTRICAL_RESOLUTION / SECTORS
}

/// Decoded Hall sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HallSample {
    /// Electrical angle in `0..ELECTRICAL_RESOLUTION`.
    pub angle: u32,
    /// Shaft velocity in rpm.
    pub velocity: i32,
    /// Sector index in positive rotation order.
    pub sector: usize,
}

/// Hall sector state machine.
#[derive(Debug, Clone)]
pub struct HallDecoder {
    config: HallConfig,
    pole_pairs: u32,
    sector: Option<usize>,
    direction: i32,
    boundary: u32,
    angle: u32,
    last_transition_us: u64,
    periods: [u64; HALL_FILTER_ORDER],
    filled: usize,
    newest: usize,
    velocity: i32,
}

impl HallDecoder {
    /// Create a decoder for a motor with `pole_pairs` pole pairs.
    #[must_use]
    pub fn new(config: HallConfig, pole_pairs: u32) -> Self {
        Self {
            config,
            pole_pairs: pole_pairs.max(1),
            sector: None,
            direction: 0,
            boundary: 0,
            angle: 0,
            last_transition_us: 0,
            periods: [0; HALL_FILTER_ORDER],
            filled: 0,
            newest: HALL_FILTER_ORDER - 1,
            velocity: 0,
        }
    }

    /// Process one sample of the Hall pins (`0bCBA`).
    ///
    /// # Errors
    ///
    /// Returns [`DecodeStatus::InvalidHallState`] for pin codes outside the
    /// configured sector table and [`DecodeStatus::HallSequence`] when a
    /// transition skips a sector. The decoder resynchronizes on the new
    /// sector in the latter case.
    pub fn update(&mut self, pins: u8, now_us: u64) -> Result<HallSample, DecodeStatus> {
        let index = self
            .config
            .sector_order
            .iter()
            .position(|&code| code == pins & 0b111)
            .ok_or(DecodeStatus::InvalidHallState)?;

        match self.sector {
            None => self.enter_unknown(index, now_us),
            Some(previous) if previous == index => {
                let elapsed = now_us.saturating_sub(self.last_transition_us);
                if elapsed > u64::from(self.config.max_transition_period_us) {
                    self.velocity = 0;
                    self.clear_filter();
                }
                self.angle = self.interpolate(elapsed);
            }
            Some(previous) => {
                let direction = match (index + 6 - previous) % 6 {
                    1 => 1,
                    5 => -1,
                    _ => {
                        self.enter_unknown(index, now_us);
                        return Err(DecodeStatus::HallSequence);
                    }
                };
                let period = now_us.saturating_sub(self.last_transition_us);
                self.last_transition_us = now_us;
                self.sector = Some(index);

                if direction == self.direction
                    && period <= u64::from(self.config.max_transition_period_us)
                {
                    self.push_period(period);
                } else {
                    self.clear_filter();
                }
                self.direction = direction;
                self.boundary = if direction > 0 {
                    sector_landmark(index)
                } else {
                    sector_landmark(index + 1)
                };
                self.angle = self.boundary;
                self.velocity = self.filtered_velocity();
            }
        }

        Ok(HallSample {
            angle: self.angle,
            velocity: self.velocity,
            sector: index,
        })
    }

    /// Current velocity estimate, in rpm.
    #[must_use]
    pub fn velocity(&self) -> i32 {
        self.velocity
    }

    /// Average of the buffered transition periods.
    #[must_use]
    pub fn filtered_period_us(&self) -> Option<u64> {
        let filled = self.periods.get(..self.filled)?;
        if filled.is_empty() {
            return None;
        }
        let sum: u64 = filled.iter().sum();
        Some(sum / filled.len() as u64)
    }

    fn enter_unknown(&mut self, index: usize, now_us: u64) {
        self.sector = Some(index);
        self.last_transition_us = now_us;
        self.direction = 0;
        self.velocity = 0;
        self.clear_filter();
        // Position within the sector is unknown until the first transition.
        self.boundary = sector_landmark(index) + SECTOR_SPAN / 2;
        self.angle = self.boundary;
    }

    fn push_period(&mut self, period: u64) {
        self.newest = (self.newest + 1) % HALL_FILTER_ORDER;
        if let Some(slot) = self.periods.get_mut(self.newest) {
            *slot = period;
        }
        self.filled = (self.filled + 1).min(HALL_FILTER_ORDER);
    }

    fn clear_filter(&mut self) {
        self.filled = 0;
        self.newest = HALL_FILTER_ORDER - 1;
    }

    fn filtered_velocity(&self) -> i32 {
        let Some(period) = self.filtered_period_us().filter(|&p| p > 0) else {
            return 0;
        };
        let electrical_turn_us = period * u64::from(SECTORS) * u64::from(self.pole_pairs);
        let rpm = MICROS_PER_MINUTE / i64::try_from(electrical_turn_us).unwrap_or(i64::MAX);
        self.direction * i32::try_from(rpm).unwrap_or(i32::MAX)
    }

    fn interpolate(&self, elapsed: u64) -> u32 {
        let Some(period) = self.filtered_period_us().filter(|&p| p > 0) else {
            return self.angle;
        };
        let advance = (elapsed.min(period) * u64::from(SECTOR_SPAN) / period)
            .min(u64::from(SECTOR_SPAN - 1));
        let advance = u32::try_from(advance).unwrap_or(0);
        match self.direction {
            1 => (self.boundary + advance) % ELECTRICAL_RESOLUTION,
            -1 => (self.boundary + ELECTRICAL_RESOLUTION - advance) % ELECTRICAL_RESOLUTION,
            _ => self.angle,
        }
    }
}
