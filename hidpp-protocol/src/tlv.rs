//! Tag-length-value triplets.
//!
//! Three encodings coexist in device NVS blobs and configuration
//! payloads:
//!
//! - *compact*: tag and length share one byte (tag high nibble, length
//!   low nibble, length < 16)
//! - *simple*: 1-byte tag, 1-byte length
//! - *BER*: multi-byte tag when the low 5 bits of the first byte are
//!   0x1F (base-128 continuation), multi-byte length when the first
//!   length byte has the high bit set (byte count in the low 7 bits,
//!   1..=4 bytes)

use crate::error::{ProtocolError, Result};

/// TLV encoding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvMode {
    Compact,
    Simple,
    Ber,
}

/// A decoded TLV triplet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub tag: u16,
    pub value: Vec<u8>,
}

impl Tlv {
    pub fn new(tag: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// Encode in the given mode.
    pub fn encode(&self, mode: TlvMode) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.value.len() + 4);
        match mode {
            TlvMode::Compact => {
                if self.tag > 0x0F {
                    return Err(ProtocolError::InvalidTlv("compact tag exceeds 4 bits"));
                }
                if self.value.len() >= 16 {
                    return Err(ProtocolError::InvalidTlv("compact length exceeds 15"));
                }
                out.push(((self.tag as u8) << 4) | self.value.len() as u8);
            }
            TlvMode::Simple => {
                if self.tag > 0xFF {
                    return Err(ProtocolError::InvalidTlv("simple tag exceeds one byte"));
                }
                if self.value.len() > 0xFF {
                    return Err(ProtocolError::InvalidTlv("simple length exceeds one byte"));
                }
                out.push(self.tag as u8);
                out.push(self.value.len() as u8);
            }
            TlvMode::Ber => {
                encode_ber_tag(self.tag, &mut out);
                encode_ber_len(self.value.len(), &mut out)?;
            }
        }
        out.extend_from_slice(&self.value);
        Ok(out)
    }

    /// Parse one triplet from the front of `data`, returning the triplet
    /// and the number of bytes consumed.
    pub fn parse(mode: TlvMode, data: &[u8]) -> Result<(Tlv, usize)> {
        match mode {
            TlvMode::Compact => {
                let head = *data.first().ok_or(ProtocolError::InvalidTlv("empty input"))?;
                let tag = (head >> 4) as u16;
                let len = (head & 0x0F) as usize;
                let value = data
                    .get(1..1 + len)
                    .ok_or(ProtocolError::InvalidTlv("truncated compact value"))?;
                Ok((Tlv::new(tag, value), 1 + len))
            }
            TlvMode::Simple => {
                if data.len() < 2 {
                    return Err(ProtocolError::InvalidTlv("truncated simple header"));
                }
                let tag = data[0] as u16;
                let len = data[1] as usize;
                let value = data
                    .get(2..2 + len)
                    .ok_or(ProtocolError::InvalidTlv("truncated simple value"))?;
                Ok((Tlv::new(tag, value), 2 + len))
            }
            TlvMode::Ber => {
                let (tag, tag_len) = parse_ber_tag(data)?;
                let (len, len_len) = parse_ber_len(&data[tag_len..])?;
                let start = tag_len + len_len;
                let value = data
                    .get(start..start + len)
                    .ok_or(ProtocolError::InvalidTlv("truncated BER value"))?;
                Ok((Tlv::new(tag, value), start + len))
            }
        }
    }
}

fn encode_ber_tag(tag: u16, out: &mut Vec<u8>) {
    if tag < 0x1F {
        out.push(tag as u8);
        return;
    }
    out.push(0x1F);
    // base-128 groups, most significant first, continuation bit on all
    // but the last; a u16 spans at most three groups
    let mut started = false;
    for shift in [14u32, 7] {
        let group = ((tag >> shift) & 0x7F) as u8;
        if started || group != 0 {
            out.push(0x80 | group);
            started = true;
        }
    }
    out.push(tag as u8 & 0x7F);
}

fn parse_ber_tag(data: &[u8]) -> Result<(u16, usize)> {
    let first = *data.first().ok_or(ProtocolError::InvalidTlv("empty input"))?;
    if first & 0x1F != 0x1F {
        return Ok(((first & 0x1F) as u16, 1));
    }
    let mut tag: u32 = 0;
    let mut consumed = 1;
    loop {
        let b = *data
            .get(consumed)
            .ok_or(ProtocolError::InvalidTlv("truncated BER tag"))?;
        consumed += 1;
        tag = (tag << 7) | (b & 0x7F) as u32;
        if tag > u16::MAX as u32 {
            return Err(ProtocolError::InvalidTlv("BER tag exceeds 16 bits"));
        }
        if b & 0x80 == 0 {
            return Ok((tag as u16, consumed));
        }
    }
}

fn encode_ber_len(len: usize, out: &mut Vec<u8>) -> Result<()> {
    if len < 0x80 {
        out.push(len as u8);
        return Ok(());
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    let n = bytes.len() - skip;
    if n > 4 {
        return Err(ProtocolError::InvalidTlv("BER length exceeds 4 bytes"));
    }
    out.push(0x80 | n as u8);
    out.extend_from_slice(&bytes[skip..]);
    Ok(())
}

fn parse_ber_len(data: &[u8]) -> Result<(usize, usize)> {
    let first = *data
        .first()
        .ok_or(ProtocolError::InvalidTlv("truncated BER length"))?;
    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }
    let n = (first & 0x7F) as usize;
    if !(1..=4).contains(&n) {
        return Err(ProtocolError::InvalidTlv("BER length byte count out of range"));
    }
    let bytes = data
        .get(1..1 + n)
        .ok_or(ProtocolError::InvalidTlv("truncated BER length bytes"))?;
    let len = bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
    Ok((len, 1 + n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_roundtrip() {
        let t = Tlv::new(0x5, vec![1, 2, 3]);
        let enc = t.encode(TlvMode::Compact).unwrap();
        assert_eq!(enc[0], 0x53);
        let (dec, used) = Tlv::parse(TlvMode::Compact, &enc).unwrap();
        assert_eq!(dec, t);
        assert_eq!(used, enc.len());
    }

    #[test]
    fn simple_roundtrip() {
        let t = Tlv::new(0xA7, vec![0xDE, 0xAD]);
        let enc = t.encode(TlvMode::Simple).unwrap();
        let (dec, used) = Tlv::parse(TlvMode::Simple, &enc).unwrap();
        assert_eq!(dec, t);
        assert_eq!(used, 4);
    }

    #[test]
    fn ber_long_tag_and_length() {
        for tag in [0x1F, 0x80, 0x1234, 0x4000, 0xFFFF] {
            let t = Tlv::new(tag, vec![0u8; 300]);
            let enc = t.encode(TlvMode::Ber).unwrap();
            // multi-byte tag marker and 2-byte length
            assert_eq!(enc[0], 0x1F);
            let (dec, used) = Tlv::parse(TlvMode::Ber, &enc).unwrap();
            assert_eq!(dec, t, "tag 0x{tag:04X}");
            assert_eq!(used, enc.len());
        }
    }

    #[test]
    fn ber_tag_continuation_bytes() {
        let enc = Tlv::new(0x4000, vec![]).encode(TlvMode::Ber).unwrap();
        assert_eq!(enc, vec![0x1F, 0x81, 0x80, 0x00, 0x00]);
        let enc = Tlv::new(0xFFFF, vec![]).encode(TlvMode::Ber).unwrap();
        assert_eq!(enc, vec![0x1F, 0x83, 0xFF, 0x7F, 0x00]);
    }

    #[test]
    fn ber_short_forms() {
        let t = Tlv::new(0x07, vec![9]);
        let enc = t.encode(TlvMode::Ber).unwrap();
        assert_eq!(enc, vec![0x07, 0x01, 0x09]);
        let (dec, _) = Tlv::parse(TlvMode::Ber, &enc).unwrap();
        assert_eq!(dec, t);
    }

    #[test]
    fn truncation_is_invalid() {
        let t = Tlv::new(0x10, vec![1, 2, 3, 4]);
        let enc = t.encode(TlvMode::Simple).unwrap();
        for cut in 0..enc.len() {
            assert!(matches!(
                Tlv::parse(TlvMode::Simple, &enc[..cut]),
                Err(ProtocolError::InvalidTlv(_))
            ));
        }
    }

    #[test]
    fn compact_rejects_wide_fields() {
        assert!(Tlv::new(0x10, vec![]).encode(TlvMode::Compact).is_err());
        assert!(Tlv::new(0x1, vec![0; 16]).encode(TlvMode::Compact).is_err());
    }
}
