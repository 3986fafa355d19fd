//! Raw byte buffer with hex round-trips and padding helpers.
//!
//! `HexBuf` is the value carrier for message fields: feature payloads are
//! built and compared as hex strings in test logs, so parse/format must be
//! exact and lossless.

use std::fmt;
use std::ops::Deref;

use crate::error::{ProtocolError, Result};

/// Byte buffer with hex parse/format, padding and big-endian arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct HexBuf(Vec<u8>);

impl HexBuf {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse from a hex string, e.g. `"10FF02"`. Whitespace is rejected.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() % 2 != 0 {
            return Err(ProtocolError::InvalidHex(format!(
                "odd length {}",
                s.len()
            )));
        }
        let mut out = Vec::with_capacity(s.len() / 2);
        let bytes = s.as_bytes();
        for pair in bytes.chunks_exact(2) {
            let hi = hex_val(pair[0])?;
            let lo = hex_val(pair[1])?;
            out.push((hi << 4) | lo);
        }
        Ok(Self(out))
    }

    /// Build from an unsigned value as exactly `width` big-endian bytes.
    pub fn from_uint(value: u64, width: usize) -> Result<Self> {
        if width < 8 && value >= 1u64 << (width * 8) {
            return Err(ProtocolError::Overflow {
                value,
                width: width * 8,
            });
        }
        let mut out = vec![0u8; width];
        for i in 0..width.min(8) {
            out[width - 1 - i] = (value >> (i * 8)) as u8;
        }
        Ok(Self(out))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Interpret as a big-endian unsigned integer. At most 8 bytes.
    pub fn as_uint(&self) -> Result<u64> {
        if self.0.len() > 8 {
            return Err(ProtocolError::Overflow {
                value: 0,
                width: self.0.len() * 8,
            });
        }
        Ok(self.0.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    /// Zero-pad on the left to `width` bytes. No-op if already longer.
    pub fn pad_left(&self, width: usize) -> HexBuf {
        if self.0.len() >= width {
            return self.clone();
        }
        let mut out = vec![0u8; width - self.0.len()];
        out.extend_from_slice(&self.0);
        Self(out)
    }

    /// Zero-pad on the right to `width` bytes. No-op if already longer.
    pub fn pad_right(&self, width: usize) -> HexBuf {
        let mut out = self.0.clone();
        if out.len() < width {
            out.resize(width, 0);
        }
        Self(out)
    }

    /// Big-endian addition keeping the wider operand's byte length.
    /// Carry out of the top byte grows the buffer.
    pub fn checked_add(&self, other: &HexBuf) -> HexBuf {
        let width = self.0.len().max(other.0.len());
        let a = self.pad_left(width);
        let b = other.pad_left(width);
        let mut out = vec![0u8; width];
        let mut carry = 0u16;
        for i in (0..width).rev() {
            let sum = a.0[i] as u16 + b.0[i] as u16 + carry;
            out[i] = sum as u8;
            carry = sum >> 8;
        }
        if carry != 0 {
            out.insert(0, carry as u8);
        }
        Self(out)
    }

    /// Big-endian subtraction; underflow wraps modulo 2^(8*len), matching
    /// fixed-width register arithmetic.
    pub fn wrapping_sub(&self, other: &HexBuf) -> HexBuf {
        let width = self.0.len().max(other.0.len());
        let a = self.pad_left(width);
        let b = other.pad_left(width);
        let mut out = vec![0u8; width];
        let mut borrow = 0i16;
        for i in (0..width).rev() {
            let diff = a.0[i] as i16 - b.0[i] as i16 - borrow;
            if diff < 0 {
                out[i] = (diff + 256) as u8;
                borrow = 1;
            } else {
                out[i] = diff as u8;
                borrow = 0;
            }
        }
        Self(out)
    }
}

fn hex_val(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(ProtocolError::InvalidHex(format!(
            "invalid digit '{}'",
            c as char
        ))),
    }
}

impl fmt::Display for HexBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

impl Deref for HexBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for HexBuf {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl From<&[u8]> for HexBuf {
    fn from(v: &[u8]) -> Self {
        Self(v.to_vec())
    }
}

impl From<u8> for HexBuf {
    fn from(v: u8) -> Self {
        Self(vec![v])
    }
}

impl From<u16> for HexBuf {
    fn from(v: u16) -> Self {
        Self(v.to_be_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let buf = HexBuf::from_hex("10FF02").unwrap();
        assert_eq!(buf.as_slice(), &[0x10, 0xFF, 0x02]);
        assert_eq!(buf.to_string(), "10FF02");
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(HexBuf::from_hex("1").is_err());
        assert!(HexBuf::from_hex("GG").is_err());
    }

    #[test]
    fn padding() {
        let buf = HexBuf::from(0x12u8);
        assert_eq!(buf.pad_left(3).as_slice(), &[0, 0, 0x12]);
        assert_eq!(buf.pad_right(3).as_slice(), &[0x12, 0, 0]);
        assert_eq!(buf.pad_left(1).as_slice(), &[0x12]);
    }

    #[test]
    fn arithmetic() {
        let a = HexBuf::from(0x00FFu16);
        let b = HexBuf::from(0x0001u16);
        assert_eq!(a.checked_add(&b).as_slice(), &[0x01, 0x00]);
        assert_eq!(a.wrapping_sub(&b).as_slice(), &[0x00, 0xFE]);
        // carry growth
        let c = HexBuf::from(0xFFu8).checked_add(&HexBuf::from(0x01u8));
        assert_eq!(c.as_slice(), &[0x01, 0x00]);
        // wrap on underflow
        let d = HexBuf::from(0x00u8).wrapping_sub(&HexBuf::from(0x01u8));
        assert_eq!(d.as_slice(), &[0xFF]);
    }

    #[test]
    fn uint_conversions() {
        let buf = HexBuf::from_uint(0x1234, 3).unwrap();
        assert_eq!(buf.as_slice(), &[0x00, 0x12, 0x34]);
        assert_eq!(buf.as_uint().unwrap(), 0x1234);
        assert!(HexBuf::from_uint(0x100, 1).is_err());
    }
}
