//! BiSS-C absolute encoder frames.
//!
//! The master clocks the data line of the encoder. An idle encoder holds the
//! line high; it answers a clock train by pulling the line low (acknowledge),
//! keeps it low while busy, then raises it for the start bit. The payload
//! that follows is shifted out MSB first:
//!
//! ```text
//! ack | busy.. | start | multiturn | singleturn | status | crc
//! ```
//!
//! Each position field may carry filling bits below its significant bits.
//! The CRC covers the payload and is sent inverted, MSB first.

use std::collections::VecDeque;

use servoloop_errors::DecodeStatus;

use crate::config::BissConfig;
use crate::crc::ReversedCrc;

/// Fields of one BiSS frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BissFrame {
    /// Multiturn counter, filling bits removed.
    pub multiturn: u32,
    /// Singleturn position, filling bits removed.
    pub singleturn: u32,
    /// Raw status bits (error and warning, active low).
    pub status: u8,
}

fn mask(bits: u32) -> u64 {
    1u64.checked_shl(bits)
        .map_or(u64::MAX, |bit| bit.wrapping_sub(1))
}

fn filling(length: u8, resolution: u8) -> u32 {
    u32::from(length.saturating_sub(resolution))
}

/// Reader for BiSS frames with a fixed geometry.
#[derive(Debug, Clone)]
pub struct BissDecoder {
    config: BissConfig,
    last_frame: Option<BissFrame>,
}

impl BissDecoder {
    /// Create a reader for the given frame geometry.
    #[must_use]
    pub fn new(config: BissConfig) -> Self {
        Self {
            config,
            last_frame: None,
        }
    }

    /// Frame geometry.
    #[must_use]
    pub fn config(&self) -> &BissConfig {
        &self.config
    }

    /// Most recent frame that passed the CRC check.
    #[must_use]
    pub fn last_frame(&self) -> Option<BissFrame> {
        self.last_frame
    }

    /// Read one frame. `clock` generates one clock pulse and returns the
    /// sampled data line.
    ///
    /// # Errors
    ///
    /// - [`DecodeStatus::NoAck`] if the line stays high for `timeout_ticks`
    /// - [`DecodeStatus::NoStartBit`] if no start bit follows the acknowledge
    ///   within `busy_ticks`
    /// - [`DecodeStatus::CrcError`] if the received CRC does not match
    pub fn read_frame(&mut self, mut clock: impl FnMut() -> bool) -> Result<BissFrame, DecodeStatus> {
        let mut waited = 0u32;
        while clock() {
            waited = waited.saturating_add(1);
            if waited >= self.config.timeout_ticks {
                return Err(DecodeStatus::NoAck);
            }
        }
        waited = 0;
        while !clock() {
            waited = waited.saturating_add(1);
            if waited >= self.config.busy_ticks {
                return Err(DecodeStatus::NoStartBit);
            }
        }

        let mut crc = ReversedCrc::new(self.config.crc_poly);
        let mut payload = 0u64;
        for _ in 0..self.config.payload_length() {
            let bit = clock();
            crc.push(bit);
            payload = (payload << 1) | u64::from(bit);
        }
        let mut received = 0u32;
        for _ in 0..crc.width() {
            received = (received << 1) | u32::from(clock());
        }
        if received != crc.transmitted() {
            return Err(DecodeStatus::CrcError);
        }

        let frame = self.unpack(payload);
        self.last_frame = Some(frame);
        Ok(frame)
    }

    fn unpack(&self, payload: u64) -> BissFrame {
        let c = &self.config;
        let status_bits = u32::from(c.status_length);
        let singleturn_bits = u32::from(c.singleturn_length);
        let multiturn_bits = u32::from(c.multiturn_length);

        let status = payload & mask(status_bits);
        let singleturn_field = payload.checked_shr(status_bits).unwrap_or(0) & mask(singleturn_bits);
        let multiturn_field = payload
            .checked_shr(status_bits + singleturn_bits)
            .unwrap_or(0)
            & mask(multiturn_bits);

        let singleturn = singleturn_field
            .checked_shr(filling(c.singleturn_length, c.singleturn_resolution))
            .unwrap_or(0);
        let multiturn = multiturn_field
            .checked_shr(filling(c.multiturn_length, c.multiturn_resolution))
            .unwrap_or(0);

        BissFrame {
            multiturn: u32::try_from(multiturn).unwrap_or(u32::MAX),
            singleturn: u32::try_from(singleturn).unwrap_or(u32::MAX),
            status: u8::try_from(status & 0xff).unwrap_or(0),
        }
    }
}

/// Encode the payload and CRC bits of a frame, as the encoder sends them
/// after the start bit.
#[must_use]
pub fn encode_frame(config: &BissConfig, frame: &BissFrame) -> Vec<bool> {
    let fields = [
        (
            u64::from(frame.multiturn) << filling(config.multiturn_length, config.multiturn_resolution),
            u32::from(config.multiturn_length),
        ),
        (
            u64::from(frame.singleturn)
                << filling(config.singleturn_length, config.singleturn_resolution),
            u32::from(config.singleturn_length),
        ),
        (u64::from(frame.status), u32::from(config.status_length)),
    ];

    let mut crc = ReversedCrc::new(config.crc_poly);
    let mut bits = Vec::with_capacity(config.payload_length() as usize + crc.width() as usize);
    for (value, length) in fields {
        let value = value & mask(length);
        for shift in (0..length).rev() {
            let bit = (value >> shift) & 1 == 1;
            crc.push(bit);
            bits.push(bit);
        }
    }
    let transmitted = crc.transmitted();
    for shift in (0..crc.width()).rev() {
        bits.push((transmitted >> shift) & 1 == 1);
    }
    bits
}

/// Data line of a simulated BiSS encoder.
///
/// Replays a prepared bit sequence, one bit per clock pulse, and idles high
/// once it is exhausted.
#[derive(Debug, Clone, Default)]
pub struct BissLine {
    bits: VecDeque<bool>,
}

impl BissLine {
    /// Line replaying `bits` verbatim.
    #[must_use]
    pub fn from_bits(bits: impl IntoIterator<Item = bool>) -> Self {
        Self {
            bits: bits.into_iter().collect(),
        }
    }

    /// Line answering with a complete frame after `idle` high bits, with
    /// `busy` low bits between acknowledge and start bit.
    #[must_use]
    pub fn with_frame(config: &BissConfig, frame: &BissFrame, idle: usize, busy: usize) -> Self {
        let mut line = Self::default();
        line.queue_frame(config, frame, idle, busy);
        line
    }

    /// Append a frame to the replay queue.
    pub fn queue_frame(&mut self, config: &BissConfig, frame: &BissFrame, idle: usize, busy: usize) {
        self.bits.extend(std::iter::repeat_n(true, idle));
        self.bits.push_back(false);
        self.bits.extend(std::iter::repeat_n(false, busy));
        self.bits.push_back(true);
        self.bits.extend(encode_frame(config, frame));
    }

    /// Bits not yet clocked out.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.bits.len()
    }

    /// Generate one clock pulse and sample the data line.
    pub fn clock(&mut self) -> bool {
        self.bits.pop_front().unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> BissConfig {
        BissConfig {
            multiturn_length: 13,
            multiturn_resolution: 12,
            singleturn_length: 13,
            singleturn_resolution: 13,
            status_length: 2,
            crc_poly: 0b11_0000,
            timeout_ticks: 100,
            busy_ticks: 30,
        }
    }

    #[test]
    fn test_roundtrip_with_filling_bits() -> Result<(), DecodeStatus> {
        let config = geometry();
        let frame = BissFrame {
            multiturn: 0xabc,
            singleturn: 0x1234,
            status: 0b11,
        };
        let mut line = BissLine::with_frame(&config, &frame, 5, 3);
        let mut decoder = BissDecoder::new(config);
        assert_eq!(decoder.read_frame(|| line.clock())?, frame);
        assert_eq!(decoder.last_frame(), Some(frame));
        assert_eq!(line.pending(), 0);
        Ok(())
    }

    #[test]
    fn test_silent_encoder_is_no_ack() {
        let mut line = BissLine::default();
        let mut decoder = BissDecoder::new(geometry());
        assert_eq!(decoder.read_frame(|| line.clock()), Err(DecodeStatus::NoAck));
    }

    #[test]
    fn test_stuck_low_line_is_no_start_bit() {
        let mut line = BissLine::from_bits(std::iter::repeat_n(false, 200));
        let mut decoder = BissDecoder::new(geometry());
        assert_eq!(
            decoder.read_frame(|| line.clock()),
            Err(DecodeStatus::NoStartBit)
        );
    }

    #[test]
    fn test_corrupted_payload_is_crc_error() {
        let config = geometry();
        let frame = BissFrame {
            multiturn: 7,
            singleturn: 4_000,
            status: 0b11,
        };
        let mut bits = vec![false, true];
        bits.extend(encode_frame(&config, &frame));
        if let Some(bit) = bits.get_mut(10) {
            *bit = !*bit;
        }
        let mut line = BissLine::from_bits(bits);
        let mut decoder = BissDecoder::new(config);
        assert_eq!(decoder.read_frame(|| line.clock()), Err(DecodeStatus::CrcError));
        assert_eq!(decoder.last_frame(), None);
    }

    #[test]
    fn test_frame_without_crc() -> Result<(), DecodeStatus> {
        let config = BissConfig {
            crc_poly: 0,
            ..geometry()
        };
        let frame = BissFrame {
            multiturn: 1,
            singleturn: 2,
            status: 0,
        };
        assert_eq!(encode_frame(&config, &frame).len(), 28);
        let mut line = BissLine::with_frame(&config, &frame, 0, 0);
        let mut decoder = BissDecoder::new(config);
        assert_eq!(decoder.read_frame(|| line.clock())?, frame);
        Ok(())
    }
}
