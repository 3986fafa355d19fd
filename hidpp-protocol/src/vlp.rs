//! Very-long packet fragmentation engine.
//!
//! A VLP transfer carries one logical payload (up to the device's
//! declared transfer buffer size) across contiguous frames. Each frame
//! repeats the feature addressing and adds a 16-bit sequence number plus
//! ack/last flags. The first frame has a larger header on the wire, so
//! it carries slightly less payload than the following ones.
//!
//! In acknowledged mode the device answers every frame by echoing its
//! sequence number and the sender must not emit frame `n+1` before the
//! ack for `n` arrived; unacknowledged transfers get a single response
//! after the last frame.

use tracing::debug;

use crate::error::{ProtocolError, Result};

/// Payload capacity of the opening frame.
pub const FIRST_FRAME_PAYLOAD: usize = 4075;
/// Payload capacity of every subsequent frame.
pub const NEXT_FRAME_PAYLOAD: usize = 4090;

/// Report id tagging extended VLP frames on the wire.
pub const VLP_REPORT_ID: u8 = 0x12;

const FRAME_HEADER_LEN: usize = 7;

const FLAG_ACK: u8 = 0x01;
const FLAG_LAST: u8 = 0x02;

/// One frame of a VLP transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlpFrame {
    pub seqn: u16,
    pub ack: bool,
    pub last: bool,
    pub feature_index: u8,
    pub function_index: u8,
    pub software_id: u8,
    pub payload: Vec<u8>,
}

impl VlpFrame {
    pub fn encode(&self, device_index: u8) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAME_HEADER_LEN + self.payload.len());
        out.push(VLP_REPORT_ID);
        out.push(device_index);
        out.push(self.feature_index);
        out.push((self.function_index << 4) | (self.software_id & 0x0F));
        out.extend_from_slice(&self.seqn.to_be_bytes());
        let mut flags = 0u8;
        if self.ack {
            flags |= FLAG_ACK;
        }
        if self.last {
            flags |= FLAG_LAST;
        }
        out.push(flags);
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < FRAME_HEADER_LEN {
            return Err(ProtocolError::InvalidReport(
                "frame shorter than VLP header".into(),
            ));
        }
        if data[0] != VLP_REPORT_ID {
            return Err(ProtocolError::InvalidReport(format!(
                "not a VLP report id: 0x{:02X}",
                data[0]
            )));
        }
        let flags = data[6];
        Ok(Self {
            seqn: u16::from_be_bytes([data[4], data[5]]),
            ack: flags & FLAG_ACK != 0,
            last: flags & FLAG_LAST != 0,
            feature_index: data[2],
            function_index: data[3] >> 4,
            software_id: data[3] & 0x0F,
            payload: data[FRAME_HEADER_LEN..].to_vec(),
        })
    }

    /// Build the per-frame acknowledgement the device side sends back.
    pub fn ack_frame(&self) -> VlpFrame {
        VlpFrame {
            seqn: self.seqn,
            ack: true,
            last: self.last,
            feature_index: self.feature_index,
            function_index: self.function_index,
            software_id: self.software_id,
            payload: Vec::new(),
        }
    }
}

/// Splits one logical payload into frames.
#[derive(Debug, Clone)]
pub struct Fragmenter {
    pub feature_index: u8,
    pub function_index: u8,
    pub software_id: u8,
    pub ack: bool,
    /// Device-declared transfer buffer capacity.
    pub transfer_buffer_size: usize,
}

impl Fragmenter {
    /// Lazily yield the transfer's frames.
    ///
    /// When the payload exceeds the transfer buffer, the frame that
    /// crosses the threshold is still produced; the error surfaces on
    /// the following pull, matching the flow-control point where a real
    /// device reports the overflow.
    pub fn frames<'a>(&'a self, payload: &'a [u8]) -> FrameIter<'a> {
        FrameIter {
            frag: self,
            payload,
            offset: 0,
            seqn: 0,
            overflowed: false,
        }
    }

    /// Eagerly fragment, failing if the payload does not fit.
    pub fn fragment(&self, payload: &[u8]) -> Result<Vec<VlpFrame>> {
        self.frames(payload).collect()
    }
}

pub struct FrameIter<'a> {
    frag: &'a Fragmenter,
    payload: &'a [u8],
    offset: usize,
    seqn: u16,
    overflowed: bool,
}

impl Iterator for FrameIter<'_> {
    type Item = Result<VlpFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.overflowed {
            return Some(Err(ProtocolError::OutOfMemory {
                size: self.payload.len(),
                limit: self.frag.transfer_buffer_size,
            }));
        }
        if self.offset >= self.payload.len() && self.seqn > 0 {
            return None;
        }
        let cap = if self.seqn == 0 {
            FIRST_FRAME_PAYLOAD
        } else {
            NEXT_FRAME_PAYLOAD
        };
        let end = (self.offset + cap).min(self.payload.len());
        let chunk = &self.payload[self.offset..end];
        let last = end == self.payload.len();
        if end > self.frag.transfer_buffer_size {
            // emit the crossing frame, then fail
            self.overflowed = true;
        }
        let frame = VlpFrame {
            seqn: self.seqn,
            ack: self.frag.ack,
            last: last && !self.overflowed,
            feature_index: self.frag.feature_index,
            function_index: self.frag.function_index,
            software_id: self.frag.software_id,
            payload: chunk.to_vec(),
        };
        debug!(
            seqn = self.seqn,
            len = chunk.len(),
            last = frame.last,
            "vlp frame out"
        );
        self.offset = end;
        self.seqn = self.seqn.wrapping_add(1);
        Some(Ok(frame))
    }
}

/// Rebuilds a logical payload from inbound frames.
#[derive(Debug)]
pub struct Reassembler {
    expected_seqn: u16,
    buffer: Vec<u8>,
    limit: usize,
    expected_total: Option<usize>,
    done: bool,
}

impl Reassembler {
    pub fn new(transfer_buffer_size: usize) -> Self {
        Self {
            expected_seqn: 0,
            buffer: Vec::new(),
            limit: transfer_buffer_size,
            expected_total: None,
            done: false,
        }
    }

    /// Total size announced out-of-band (e.g. an image size field); the
    /// reassembled length must match it exactly.
    pub fn with_expected_total(mut self, total: usize) -> Self {
        self.expected_total = Some(total);
        self
    }

    /// Feed the next frame. Returns the complete payload once the frame
    /// flagged `last` has been absorbed.
    pub fn push(&mut self, frame: &VlpFrame) -> Result<Option<Vec<u8>>> {
        if self.done {
            return Err(ProtocolError::SequenceError {
                expected: self.expected_seqn,
                got: frame.seqn,
            });
        }
        if frame.seqn != self.expected_seqn {
            return Err(ProtocolError::SequenceError {
                expected: self.expected_seqn,
                got: frame.seqn,
            });
        }
        #[cfg(feature = "strict-vlp-ack")]
        if frame.ack && frame.payload.is_empty() && !(frame.last && frame.seqn == 0) {
            return Err(ProtocolError::InvalidReport(
                "empty acknowledged frame inside a transfer".into(),
            ));
        }
        if self.buffer.len() + frame.payload.len() > self.limit {
            return Err(ProtocolError::OutOfMemory {
                size: self.buffer.len() + frame.payload.len(),
                limit: self.limit,
            });
        }
        self.buffer.extend_from_slice(&frame.payload);
        self.expected_seqn = self.expected_seqn.wrapping_add(1);
        if !frame.last {
            return Ok(None);
        }
        self.done = true;
        if let Some(total) = self.expected_total {
            if self.buffer.len() != total {
                return Err(ProtocolError::InvalidArgument(format!(
                    "declared transfer size {total} but received {}",
                    self.buffer.len()
                )));
            }
        }
        Ok(Some(std::mem::take(&mut self.buffer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragmenter(ack: bool, limit: usize) -> Fragmenter {
        Fragmenter {
            feature_index: 0x0B,
            function_index: 2,
            software_id: 0x0D,
            ack,
            transfer_buffer_size: limit,
        }
    }

    #[test]
    fn single_frame_transfer() {
        let frames = fragmenter(false, 16384).fragment(&[0xAB; 100]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].seqn, 0);
        assert!(frames[0].last);
        assert!(!frames[0].ack);
    }

    #[test]
    fn frame_sizing_first_vs_next() {
        let payload = vec![0u8; FIRST_FRAME_PAYLOAD + NEXT_FRAME_PAYLOAD + 10];
        let frames = fragmenter(true, 1 << 20).fragment(&payload).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload.len(), FIRST_FRAME_PAYLOAD);
        assert_eq!(frames[1].payload.len(), NEXT_FRAME_PAYLOAD);
        assert_eq!(frames[2].payload.len(), 10);
        assert_eq!(frames.iter().map(|f| f.seqn).collect::<Vec<_>>(), [0, 1, 2]);
        assert!(frames.iter().all(|f| f.ack));
        assert!(frames[2].last && !frames[0].last && !frames[1].last);
    }

    #[test]
    fn overflow_surfaces_after_crossing_frame() {
        let payload = vec![0u8; FIRST_FRAME_PAYLOAD + 100];
        let frag = fragmenter(false, 4000);
        let mut iter = frag.frames(&payload);
        // the crossing frame is still emitted
        let first = iter.next().unwrap().unwrap();
        assert_eq!(first.payload.len(), FIRST_FRAME_PAYLOAD);
        assert!(!first.last);
        let err = iter.next().unwrap().unwrap_err();
        assert!(matches!(err, ProtocolError::OutOfMemory { limit: 4000, .. }));
    }

    #[test]
    fn encode_parse_roundtrip() {
        let frame = VlpFrame {
            seqn: 0x0102,
            ack: true,
            last: true,
            feature_index: 0x0B,
            function_index: 2,
            software_id: 0x0D,
            payload: vec![1, 2, 3],
        };
        let wire = frame.encode(0x01);
        assert_eq!(&wire[..7], &[0x12, 0x01, 0x0B, 0x2D, 0x01, 0x02, 0x03]);
        assert_eq!(VlpFrame::parse(&wire).unwrap(), frame);
    }

    #[test]
    fn reassembly_in_order() {
        let frag = fragmenter(false, 1 << 20);
        let payload = vec![7u8; FIRST_FRAME_PAYLOAD + 500];
        let frames = frag.fragment(&payload).unwrap();
        let mut asm = Reassembler::new(1 << 20);
        assert_eq!(asm.push(&frames[0]).unwrap(), None);
        assert_eq!(asm.push(&frames[1]).unwrap(), Some(payload));
    }

    #[test]
    fn sequence_gaps_and_duplicates_fail() {
        let frag = fragmenter(false, 1 << 20);
        let frames = frag
            .fragment(&vec![0u8; FIRST_FRAME_PAYLOAD + NEXT_FRAME_PAYLOAD + 1])
            .unwrap();
        let mut asm = Reassembler::new(1 << 20);
        asm.push(&frames[0]).unwrap();
        // skip frame 1
        let err = asm.push(&frames[2]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::SequenceError {
                expected: 1,
                got: 2
            }
        );
        // duplicate frame 0
        let mut asm = Reassembler::new(1 << 20);
        asm.push(&frames[0]).unwrap();
        let err = asm.push(&frames[0]).unwrap_err();
        assert!(matches!(err, ProtocolError::SequenceError { .. }));
    }

    #[test]
    fn declared_total_mismatch() {
        let frag = fragmenter(false, 1 << 20);
        let frames = frag.fragment(&[9u8; 64]).unwrap();
        let mut asm = Reassembler::new(1 << 20).with_expected_total(65);
        let err = asm.push(&frames[0]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidArgument(_)));
    }

    #[test]
    fn receiver_side_buffer_limit() {
        let frag = fragmenter(false, 1 << 20);
        let frames = frag.fragment(&vec![0u8; 5000]).unwrap();
        let mut asm = Reassembler::new(4096);
        asm.push(&frames[0]).unwrap();
        let err = asm.push(&frames[1]).unwrap_err();
        assert!(matches!(err, ProtocolError::OutOfMemory { .. }));
    }

    #[test]
    fn ack_frame_echoes_seqn() {
        let frag = fragmenter(true, 1 << 20);
        let frames = frag.fragment(&[1u8; 10]).unwrap();
        let ack = frames[0].ack_frame();
        assert_eq!(ack.seqn, 0);
        assert!(ack.payload.is_empty());
        assert!(ack.ack);
    }
}
