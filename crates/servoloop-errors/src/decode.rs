//! Sensor decode status.
//!
//! Decode errors are not faults: the sensor layer discards the sample, keeps
//! publishing the last valid reading and reports the status for diagnostics.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Result of the most recent decode attempt of a position sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum DecodeStatus {
    /// Sample decoded and published
    #[default]
    NoError = 0,
    /// Serial frame CRC did not match the transmitted CRC
    CrcError = 1,
    /// Serial sensor never pulled the data line low for acknowledge
    NoAck = 2,
    /// Serial sensor acknowledged but never sent the start bit
    NoStartBit = 3,
    /// Hall sector code skipped a sector
    HallSequence = 4,
    /// Hall pins read an impossible code (0 or 7)
    InvalidHallState = 5,
    /// Both quadrature channels changed between two samples
    QuadratureGlitch = 6,
}

impl DecodeStatus {
    /// `true` if the sample was decoded successfully.
    pub fn is_ok(self) -> bool {
        self == DecodeStatus::NoError
    }

    /// `true` if the sensor did not answer at all this cycle.
    ///
    /// A sensor that keeps reporting this is considered unavailable.
    pub fn is_unavailable(self) -> bool {
        matches!(self, DecodeStatus::NoAck | DecodeStatus::NoStartBit)
    }

    /// Get the numeric status code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Create a status from its numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DecodeStatus::NoError),
            1 => Some(DecodeStatus::CrcError),
            2 => Some(DecodeStatus::NoAck),
            3 => Some(DecodeStatus::NoStartBit),
            4 => Some(DecodeStatus::HallSequence),
            5 => Some(DecodeStatus::InvalidHallState),
            6 => Some(DecodeStatus::QuadratureGlitch),
            _ => None,
        }
    }
}

impl fmt::Display for DecodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeStatus::NoError => write!(f, "No error"),
            DecodeStatus::CrcError => write!(f, "CRC mismatch"),
            DecodeStatus::NoAck => write!(f, "No acknowledge from sensor"),
            DecodeStatus::NoStartBit => write!(f, "No start bit from sensor"),
            DecodeStatus::HallSequence => write!(f, "Out-of-sequence Hall transition"),
            DecodeStatus::InvalidHallState => write!(f, "Invalid Hall state"),
            DecodeStatus::QuadratureGlitch => write!(f, "Quadrature glitch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for code in 0..=6u8 {
            let status = DecodeStatus::from_code(code);
            assert_eq!(status.map(DecodeStatus::code), Some(code));
        }
        assert_eq!(DecodeStatus::from_code(7), None);
    }

    #[test]
    fn test_unavailable_statuses() {
        assert!(DecodeStatus::NoAck.is_unavailable());
        assert!(DecodeStatus::NoStartBit.is_unavailable());
        assert!(!DecodeStatus::CrcError.is_unavailable());
        assert!(DecodeStatus::NoError.is_ok());
    }
}
