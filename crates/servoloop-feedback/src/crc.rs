//! Bitwise CRC with polynomials in reversed representation.
//!
//! BiSS encoders protect each frame with a short CRC (typically CRC-6,
//! `x^6 + x^1 + x^0`). The polynomial is given in reversed bit order with the
//! implicit top term dropped, e.g. `0b11_0000` for CRC-6. The width of the
//! register is the bit length of the polynomial.
//!
//! The transmitted CRC is the inverted register content, sent MSB first.

/// Incremental reversed-polynomial CRC register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReversedCrc {
    poly: u32,
    width: u32,
    register: u32,
}

impl ReversedCrc {
    /// Create a register for `poly`. A zero polynomial disables the CRC.
    #[must_use]
    pub fn new(poly: u32) -> Self {
        Self {
            poly,
            width: u32::BITS - poly.leading_zeros(),
            register: 0,
        }
    }

    /// Register width in bits, zero when disabled.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Shift one payload bit into the register.
    pub fn push(&mut self, bit: bool) {
        let feedback = (self.register & 1 == 1) ^ bit;
        self.register >>= 1;
        if feedback {
            self.register ^= self.poly;
        }
    }

    /// Shift the `len` least significant bits of `value` in, MSB first.
    pub fn push_bits(&mut self, value: u64, len: u32) {
        for shift in (0..len).rev() {
            self.push((value >> shift) & 1 == 1);
        }
    }

    /// The CRC value as it appears on the wire.
    #[must_use]
    pub fn transmitted(&self) -> u32 {
        !self.register & self.mask()
    }

    fn mask(&self) -> u32 {
        1u32.checked_shl(self.width)
            .map_or(u32::MAX, |bit| bit.wrapping_sub(1))
    }
}

/// CRC of the `len` least significant bits of `payload`, as transmitted.
#[must_use]
pub fn reversed_crc(payload: u64, len: u32, poly: u32) -> u32 {
    let mut crc = ReversedCrc::new(poly);
    crc.push_bits(payload, len);
    crc.transmitted()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRC6: u32 = 0b11_0000;

    #[test]
    fn test_width_follows_polynomial() {
        assert_eq!(ReversedCrc::new(CRC6).width(), 6);
        assert_eq!(ReversedCrc::new(0).width(), 0);
    }

    #[test]
    fn test_disabled_crc_is_zero() {
        assert_eq!(reversed_crc(0xdead_beef, 32, 0), 0);
    }

    #[test]
    fn test_crc_fits_width() {
        for payload in [0u64, 1, 0x3ff, 0x2_aaaa_5555, u64::MAX >> 24] {
            assert!(reversed_crc(payload, 40, CRC6) < 64);
        }
    }

    #[test]
    fn test_single_bit_flip_changes_crc() {
        let payload = 0x1_2345_6789u64;
        let reference = reversed_crc(payload, 40, CRC6);
        for bit in 0..40 {
            assert_ne!(reversed_crc(payload ^ (1 << bit), 40, CRC6), reference);
        }
    }

    #[test]
    fn test_incremental_matches_bulk() {
        let mut crc = ReversedCrc::new(CRC6);
        crc.push_bits(0b1011, 4);
        crc.push_bits(0b0110_0111, 8);
        assert_eq!(crc.transmitted(), reversed_crc(0b1011_0110_0111, 12, CRC6));
    }
}
