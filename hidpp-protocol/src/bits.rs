//! Bit-granular buffer used by the message codec.
//!
//! Bit-ordering contract: bits are numbered big-endian within each byte.
//! Bit 0 of a `BitVec` is the most significant bit of byte 0. Byte views
//! round the length up to a whole byte and pad with zero bits on the
//! right. This is the single contract used across the whole codec; the
//! HID report layer byte-reverses explicitly where the wire differs.

use crate::error::{ProtocolError, Result};

/// Endianness selector for integer interpretation.
///
/// HID++ payloads default to big-endian; HID report packing defaults to
/// little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// An ordered sequence of bits with arbitrary-length slicing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BitVec {
    bytes: Vec<u8>,
    len_bits: usize,
}

impl BitVec {
    /// Create a zeroed vector of `n_bits` bits.
    pub fn new(n_bits: usize) -> Self {
        Self {
            bytes: vec![0u8; n_bits.div_ceil(8)],
            len_bits: n_bits,
        }
    }

    /// Create from whole bytes; length is `bytes.len() * 8` bits.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            len_bits: bytes.len() * 8,
        }
    }

    /// Create a vector of exactly `width` bits holding `value`.
    pub fn from_uint(value: u64, width: usize) -> Result<Self> {
        if width < 64 && value >= 1u64 << width {
            return Err(ProtocolError::Overflow { value, width });
        }
        let mut bv = Self::new(width);
        for i in 0..width {
            let bit = (value >> (width - 1 - i)) & 1;
            if bit != 0 {
                bv.set_bit(i, true);
            }
        }
        Ok(bv)
    }

    /// Length in bits.
    pub fn len(&self) -> usize {
        self.len_bits
    }

    pub fn is_empty(&self) -> bool {
        self.len_bits == 0
    }

    /// Byte view, rounded up with zero padding on the right.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into the padded byte representation.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn check_range(&self, start: usize, end: usize) -> Result<()> {
        if start > end || end > self.len_bits {
            return Err(ProtocolError::OutOfRange {
                start,
                end,
                len: self.len_bits,
            });
        }
        Ok(())
    }

    /// Read a single bit.
    pub fn bit(&self, index: usize) -> Result<bool> {
        self.check_range(index, index + 1)?;
        Ok(self.bytes[index / 8] & (0x80 >> (index % 8)) != 0)
    }

    fn set_bit(&mut self, index: usize, value: bool) {
        let mask = 0x80 >> (index % 8);
        if value {
            self.bytes[index / 8] |= mask;
        } else {
            self.bytes[index / 8] &= !mask;
        }
    }

    /// Extract bits `start..end` into a new vector.
    pub fn get_slice(&self, start: usize, end: usize) -> Result<BitVec> {
        self.check_range(start, end)?;
        let mut out = BitVec::new(end - start);
        for (dst, src) in (start..end).enumerate() {
            if self.bytes[src / 8] & (0x80 >> (src % 8)) != 0 {
                out.set_bit(dst, true);
            }
        }
        Ok(out)
    }

    /// Overwrite bits `start..end` with `value`.
    ///
    /// `value` must fit in `end - start` bits, otherwise `Overflow`.
    pub fn set_slice(&mut self, start: usize, end: usize, value: u64) -> Result<()> {
        self.check_range(start, end)?;
        let width = end - start;
        if width < 64 && value >= 1u64 << width {
            return Err(ProtocolError::Overflow { value, width });
        }
        for i in 0..width {
            let bit = (value >> (width - 1 - i)) & 1;
            self.set_bit(start + i, bit != 0);
        }
        Ok(())
    }

    /// Copy the bits of `src` into position `start` onward.
    pub fn write_bits(&mut self, start: usize, src: &BitVec) -> Result<()> {
        self.check_range(start, start + src.len())?;
        for i in 0..src.len() {
            // bounds verified above
            let b = src.bit(i)?;
            self.set_bit(start + i, b);
        }
        Ok(())
    }

    /// Interpret the whole vector as an unsigned integer (at most 64 bits).
    pub fn as_uint(&self, endian: Endian) -> Result<u64> {
        if self.len_bits > 64 {
            return Err(ProtocolError::Overflow {
                value: 0,
                width: self.len_bits,
            });
        }
        let bytes = match endian {
            Endian::Big => self.bytes.clone(),
            Endian::Little => {
                let mut b = self.bytes.clone();
                b.reverse();
                b
            }
        };
        // In the big-endian view the value occupies the leading len_bits
        // of the padded buffer; shift the right padding away.
        let pad = bytes.len() * 8 - self.len_bits;
        let mut acc: u64 = 0;
        for b in bytes {
            acc = (acc << 8) | b as u64;
        }
        Ok(acc >> pad)
    }

    /// Interpret as a signed integer (two's complement over `len()` bits).
    pub fn as_int(&self, endian: Endian) -> Result<i64> {
        let raw = self.as_uint(endian)?;
        let width = self.len_bits;
        if width == 0 || width == 64 {
            return Ok(raw as i64);
        }
        if raw & (1u64 << (width - 1)) != 0 {
            Ok((raw | (!0u64 << width)) as i64)
        } else {
            Ok(raw as i64)
        }
    }

    /// Reverse the bit order of the entire vector in place.
    pub fn reverse_in_place(&mut self) {
        let n = self.len_bits;
        for i in 0..n / 2 {
            let j = n - 1 - i;
            let (a, b) = (
                self.bytes[i / 8] & (0x80 >> (i % 8)) != 0,
                self.bytes[j / 8] & (0x80 >> (j % 8)) != 0,
            );
            self.set_bit(i, b);
            self.set_bit(j, a);
        }
    }

    /// Append another vector, growing this one.
    pub fn extend(&mut self, other: &BitVec) {
        let start = self.len_bits;
        self.len_bits += other.len();
        self.bytes.resize(self.len_bits.div_ceil(8), 0);
        for i in 0..other.len() {
            let b = other.bytes[i / 8] & (0x80 >> (i % 8)) != 0;
            self.set_bit(start + i, b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_roundtrip() {
        let bv = BitVec::from_bytes(&[0xA5, 0x0F]);
        let hi = bv.get_slice(0, 4).unwrap();
        assert_eq!(hi.as_uint(Endian::Big).unwrap(), 0xA);
        let mid = bv.get_slice(4, 12).unwrap();
        assert_eq!(mid.as_uint(Endian::Big).unwrap(), 0x50);
    }

    #[test]
    fn set_slice_and_overflow() {
        let mut bv = BitVec::new(8);
        bv.set_slice(0, 4, 0xF).unwrap();
        assert_eq!(bv.as_bytes(), &[0xF0]);
        let err = bv.set_slice(4, 8, 0x10).unwrap_err();
        assert!(matches!(err, ProtocolError::Overflow { .. }));
    }

    #[test]
    fn out_of_range_slice() {
        let bv = BitVec::new(8);
        assert!(matches!(
            bv.get_slice(4, 12),
            Err(ProtocolError::OutOfRange { .. })
        ));
    }

    #[test]
    fn signed_interpretation() {
        let bv = BitVec::from_uint(0b1110, 4).unwrap();
        assert_eq!(bv.as_int(Endian::Big).unwrap(), -2);
        let bv = BitVec::from_uint(0b0110, 4).unwrap();
        assert_eq!(bv.as_int(Endian::Big).unwrap(), 6);
    }

    #[test]
    fn little_endian_uint() {
        let bv = BitVec::from_bytes(&[0x34, 0x12]);
        assert_eq!(bv.as_uint(Endian::Little).unwrap(), 0x1234);
        assert_eq!(bv.as_uint(Endian::Big).unwrap(), 0x3412);
    }

    #[test]
    fn reverse() {
        let mut bv = BitVec::from_uint(0b1011, 4).unwrap();
        bv.reverse_in_place();
        assert_eq!(bv.as_uint(Endian::Big).unwrap(), 0b1101);
    }

    #[test]
    fn non_byte_aligned_padding() {
        let bv = BitVec::from_uint(0b101, 3).unwrap();
        // padded with zero bits on the right
        assert_eq!(bv.as_bytes(), &[0b1010_0000]);
        assert_eq!(bv.as_uint(Endian::Big).unwrap(), 0b101);
    }

    #[test]
    fn extend_concatenates() {
        let mut a = BitVec::from_uint(0b10, 2).unwrap();
        let b = BitVec::from_uint(0b0110, 4).unwrap();
        a.extend(&b);
        assert_eq!(a.len(), 6);
        assert_eq!(a.as_uint(Endian::Big).unwrap(), 0b100110);
    }
}
