//! Quadrature encoder decoding.

use serde::{Deserialize, Serialize};
use servoloop_errors::DecodeStatus;

/// One sample of the quadrature input pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuadratureSample {
    /// Channel A level.
    pub a: bool,
    /// Channel B level.
    pub b: bool,
    /// Index pulse level.
    pub index: bool,
}

impl QuadratureSample {
    /// Gray-code phase of the A/B pair, `0..4` in positive rotation order.
    #[must_use]
    pub fn phase(self) -> u8 {
        match (self.a, self.b) {
            (false, false) => 0,
            (true, false) => 1,
            (true, true) => 2,
            (false, true) => 3,
        }
    }

    /// Sample with the given phase and index level.
    #[must_use]
    pub fn from_phase(phase: u8, index: bool) -> Self {
        let (a, b) = match phase % 4 {
            0 => (false, false),
            1 => (true, false),
            2 => (true, true),
            _ => (false, true),
        };
        Self { a, b, index }
    }
}

/// Edge counter for an incremental encoder, four counts per line.
///
/// The singleturn position stays in `0..resolution`. With the index enabled
/// the position is reset to zero on every rising index edge and the error
/// found at that moment is kept as the index drift.
#[derive(Debug, Clone)]
pub struct QeiDecoder {
    resolution: u32,
    use_index: bool,
    phase: Option<u8>,
    position: u32,
    index_level: bool,
    index_drift: Option<i32>,
}

impl QeiDecoder {
    /// Create a decoder for `resolution` counts per turn.
    #[must_use]
    pub fn new(resolution: u32, use_index: bool) -> Self {
        Self {
            resolution: resolution.max(1),
            use_index,
            phase: None,
            position: 0,
            index_level: false,
            index_drift: None,
        }
    }

    /// Process one sample of the encoder pins.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeStatus::QuadratureGlitch`] when both channels changed
    /// since the previous sample; the count is left unchanged.
    pub fn update(&mut self, sample: QuadratureSample) -> Result<u32, DecodeStatus> {
        let phase = sample.phase();
        let previous = self.phase.replace(phase);
        if let Some(previous) = previous {
            match (phase + 4 - previous) % 4 {
                0 => {}
                1 => self.position = (self.position + 1) % self.resolution,
                3 => self.position = (self.position + self.resolution - 1) % self.resolution,
                _ => return Err(DecodeStatus::QuadratureGlitch),
            }
        }

        if self.use_index && sample.index && !self.index_level {
            let position = i64::from(self.position);
            let resolution = i64::from(self.resolution);
            let drift = if position > resolution / 2 {
                position - resolution
            } else {
                position
            };
            self.index_drift = i32::try_from(drift).ok();
            self.position = 0;
        }
        self.index_level = sample.index;
        Ok(self.position)
    }

    /// Singleturn position in counts.
    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Count error found at the most recent index pulse, if one was seen.
    #[must_use]
    pub fn index_drift(&self) -> Option<i32> {
        self.index_drift
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(decoder: &mut QeiDecoder, phases: impl IntoIterator<Item = u8>) -> Result<u32, DecodeStatus> {
        let mut position = decoder.position();
        for phase in phases {
            position = decoder.update(QuadratureSample::from_phase(phase, false))?;
        }
        Ok(position)
    }

    #[test]
    fn test_four_counts_per_cycle() -> Result<(), DecodeStatus> {
        let mut qei = QeiDecoder::new(1_000, false);
        assert_eq!(feed(&mut qei, [0, 1, 2, 3, 0])?, 4);
        Ok(())
    }

    #[test]
    fn test_reverse_wraps_below_zero() -> Result<(), DecodeStatus> {
        let mut qei = QeiDecoder::new(1_000, false);
        assert_eq!(feed(&mut qei, [0, 3, 2])?, 998);
        Ok(())
    }

    #[test]
    fn test_double_change_is_glitch() -> Result<(), DecodeStatus> {
        let mut qei = QeiDecoder::new(1_000, false);
        feed(&mut qei, [0, 1])?;
        assert_eq!(
            qei.update(QuadratureSample::from_phase(3, false)),
            Err(DecodeStatus::QuadratureGlitch)
        );
        assert_eq!(qei.position(), 1);
        Ok(())
    }

    #[test]
    fn test_index_resyncs_and_records_drift() -> Result<(), DecodeStatus> {
        let mut qei = QeiDecoder::new(1_000, true);
        feed(&mut qei, (0..=5u8).map(|step| step % 4))?;
        assert_eq!(qei.position(), 5);
        assert_eq!(qei.update(QuadratureSample::from_phase(1, true))?, 0);
        assert_eq!(qei.index_drift(), Some(5));

        // Held index level does not resync again
        assert_eq!(qei.update(QuadratureSample::from_phase(2, true))?, 1);
        Ok(())
    }

    #[test]
    fn test_index_ignored_when_disabled() -> Result<(), DecodeStatus> {
        let mut qei = QeiDecoder::new(1_000, false);
        feed(&mut qei, [0, 1, 2])?;
        assert_eq!(qei.update(QuadratureSample::from_phase(2, true))?, 2);
        assert_eq!(qei.index_drift(), None);
        Ok(())
    }
}
