//! USB HID report descriptor parser and report codec.
//!
//! Covers the item subset needed to decode device-sent raw reports:
//! Global (usage page, logical/physical ranges, unit, report size/id/
//! count, push/pop), Local (usage, usage min/max), Main (input, output,
//! feature, collection, end collection). Long items are skipped.
//!
//! The parse result is an immutable [`Collection`] tree whose leaves are
//! [`Report`] items. Packing converts caller values from the physical
//! range to the logical range and writes little-endian fields; unpacking
//! byte-reverses multi-byte fields into the big-endian internal view,
//! sign-extends when the logical minimum is negative, and scales back.

use std::collections::BTreeSet;

use tracing::debug;

use crate::bits::BitVec;
use crate::error::{ProtocolError, Result};

/// Report direction/kind of a main item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReportType {
    Input,
    Output,
    Feature,
}

/// A usage qualified by its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub page: u16,
    pub id: u16,
}

/// Main item flag bits (first data byte of Input/Output/Feature).
pub mod flags {
    pub const CONSTANT: u32 = 0x01;
    pub const VARIABLE: u32 = 0x02;
    pub const RELATIVE: u32 = 0x04;
    pub const NULL_STATE: u32 = 0x40;
}

/// A packed group of `count` fields of `size_bits` each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub report_type: ReportType,
    pub report_id: u8,
    pub size_bits: u8,
    pub count: u16,
    pub usages: Vec<Usage>,
    pub logical_range: (i32, i32),
    pub physical_range: (i32, i32),
    pub unit: u32,
    pub unit_exponent: i32,
    pub flags: u32,
}

impl Report {
    pub fn is_array(&self) -> bool {
        self.flags & flags::VARIABLE == 0
    }

    pub fn has_null_state(&self) -> bool {
        self.flags & flags::NULL_STATE != 0
    }

    fn is_signed(&self) -> bool {
        self.logical_range.0 < 0
    }

    /// Physical range defaults to the logical range when unset.
    fn effective_physical(&self) -> (i32, i32) {
        if self.physical_range == (0, 0) {
            self.logical_range
        } else {
            self.physical_range
        }
    }

    fn scale_to_logical(&self, value: i64) -> i64 {
        let (pmin, pmax) = self.effective_physical();
        let (lmin, lmax) = self.logical_range;
        if (pmin, pmax) == (lmin, lmax) || pmin == pmax {
            return value;
        }
        (value - pmin as i64) * (lmax as i64 - lmin as i64) / (pmax as i64 - pmin as i64)
            + lmin as i64
    }

    fn scale_to_physical(&self, value: i64) -> i64 {
        let (pmin, pmax) = self.effective_physical();
        let (lmin, lmax) = self.logical_range;
        if (pmin, pmax) == (lmin, lmax) || lmin == lmax {
            return value;
        }
        (value - lmin as i64) * (pmax as i64 - pmin as i64) / (lmax as i64 - lmin as i64)
            + pmin as i64
    }

    /// Pack `count` caller values into wire bits.
    ///
    /// Values outside the physical range pass through unscaled when the
    /// null-state flag is set; otherwise packing fails.
    pub fn pack(&self, values: &[i64]) -> Result<BitVec> {
        if values.len() != self.count as usize {
            return Err(ProtocolError::InvalidArgument(format!(
                "expected {} values, got {}",
                self.count,
                values.len()
            )));
        }
        let size = self.size_bits as usize;
        let mut out = BitVec::new(0);
        for &value in values {
            let (pmin, pmax) = self.effective_physical();
            let in_range = value >= pmin as i64 && value <= pmax as i64;
            let logical = if in_range {
                self.scale_to_logical(value)
            } else if self.has_null_state() {
                value
            } else {
                return Err(ProtocolError::ValueOutOfRange {
                    value,
                    min: pmin as i64,
                    max: pmax as i64,
                });
            };
            let raw = (logical as u64) & mask(size);
            let mut field = BitVec::from_uint(raw, size)?;
            if size > 8 {
                field = byte_reverse(&field, size)?;
            }
            out.extend(&field);
        }
        Ok(out)
    }

    /// Unpack wire bits starting at `offset`, returning the physical
    /// values and the new offset.
    pub fn unpack(&self, bits: &BitVec, offset: usize) -> Result<(Vec<i64>, usize)> {
        let size = self.size_bits as usize;
        let mut values = Vec::with_capacity(self.count as usize);
        let mut pos = offset;
        for _ in 0..self.count {
            let mut field = bits.get_slice(pos, pos + size)?;
            pos += size;
            if size > 8 {
                field = byte_reverse(&field, size)?;
            }
            let raw = field.as_uint(crate::bits::Endian::Big)?;
            let logical = if self.is_signed() {
                sign_extend(raw, size)
            } else {
                raw as i64
            };
            let (lmin, lmax) = self.logical_range;
            let in_range = logical >= lmin as i64 && logical <= lmax as i64;
            let value = if in_range {
                self.scale_to_physical(logical)
            } else if self.has_null_state() {
                logical
            } else {
                return Err(ProtocolError::ValueOutOfRange {
                    value: logical,
                    min: lmin as i64,
                    max: lmax as i64,
                });
            };
            values.push(value);
        }
        Ok((values, pos))
    }

    pub fn bit_len(&self) -> usize {
        self.size_bits as usize * self.count as usize
    }
}

fn mask(bits: usize) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn sign_extend(raw: u64, bits: usize) -> i64 {
    if bits == 0 || bits >= 64 {
        return raw as i64;
    }
    let sign = 1u64 << (bits - 1);
    if raw & sign != 0 {
        (raw | !mask(bits)) as i64
    } else {
        raw as i64
    }
}

/// Swap the byte order of a multi-byte field.
fn byte_reverse(field: &BitVec, size: usize) -> Result<BitVec> {
    let mut bytes = field.as_bytes().to_vec();
    bytes.reverse();
    let bv = BitVec::from_bytes(&bytes);
    // keep only the field's own bits after reversal
    bv.get_slice(bv.len() - size, bv.len())
}

/// Grouping node of the descriptor tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    /// 0 physical, 1 application, 2 logical, vendor values above 0x80.
    pub kind: u8,
    pub usage: Option<Usage>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Collection(Collection),
    Report(Report),
}

/// A parsed device: the collection tree plus the report-id map.
#[derive(Debug, Clone)]
pub struct HidDevice {
    pub root: Collection,
    report_ids: BTreeSet<u8>,
}

impl HidDevice {
    /// Parse a raw report descriptor.
    pub fn parse(descriptor: &[u8]) -> Result<Self> {
        Parser::default().run(descriptor)
    }

    /// True when the device never declared a report id; raw reports are
    /// then unprefixed.
    pub fn uses_report_ids(&self) -> bool {
        !(self.report_ids.len() == 1 && self.report_ids.contains(&0))
    }

    fn reports_of(&self, report_id: u8, report_type: ReportType) -> Vec<&Report> {
        let mut out = Vec::new();
        collect_reports(&self.root, report_id, report_type, &mut out);
        out
    }

    /// Pack one report group into raw bytes, prefixing the report id
    /// when the device uses ids. `values` is the concatenation of each
    /// leaf's value list in tree order.
    pub fn serialize(
        &self,
        report_id: u8,
        report_type: ReportType,
        values: &[i64],
    ) -> Result<Vec<u8>> {
        let reports = self.reports_of(report_id, report_type);
        if reports.is_empty() {
            return Err(ProtocolError::InvalidReport(format!(
                "no {report_type:?} report with id {report_id}"
            )));
        }
        let mut bits = BitVec::new(0);
        let mut consumed = 0;
        for report in &reports {
            let n = report.count as usize;
            let slice = values.get(consumed..consumed + n).ok_or_else(|| {
                ProtocolError::InvalidArgument(format!(
                    "value list shorter than report group ({} fields)",
                    consumed + n
                ))
            })?;
            bits.extend(&report.pack(slice)?);
            consumed += n;
        }
        if consumed != values.len() {
            return Err(ProtocolError::InvalidArgument(format!(
                "value list has {} extra entries",
                values.len() - consumed
            )));
        }
        let mut out = Vec::new();
        if self.uses_report_ids() {
            out.push(report_id);
        }
        out.extend_from_slice(bits.as_bytes());
        Ok(out)
    }

    /// Decode a raw report. The leading report-id byte is stripped when
    /// the device uses ids. Returns the id and the physical values of
    /// every leaf in tree order.
    pub fn deserialize(&self, data: &[u8], report_type: ReportType) -> Result<(u8, Vec<i64>)> {
        let (report_id, body) = if self.uses_report_ids() {
            let id = *data.first().ok_or_else(|| {
                ProtocolError::InvalidReport("empty report".into())
            })?;
            (id, &data[1..])
        } else {
            (0, data)
        };
        let reports = self.reports_of(report_id, report_type);
        if reports.is_empty() {
            return Err(ProtocolError::InvalidReport(format!(
                "no {report_type:?} report with id {report_id}"
            )));
        }
        let bits = BitVec::from_bytes(body);
        let mut values = Vec::new();
        let mut offset = 0;
        for report in &reports {
            let (vals, next) = report.unpack(&bits, offset)?;
            values.extend(vals);
            offset = next;
        }
        Ok((report_id, values))
    }
}

fn collect_reports<'a>(
    node: &'a Collection,
    report_id: u8,
    report_type: ReportType,
    out: &mut Vec<&'a Report>,
) {
    for child in &node.children {
        match child {
            Node::Report(r) if r.report_id == report_id && r.report_type == report_type => {
                out.push(r)
            }
            Node::Collection(c) => collect_reports(c, report_id, report_type, out),
            Node::Report(_) => {}
        }
    }
}

// ====================================================================
// item-level parser
// ====================================================================

#[derive(Debug, Clone, Default)]
struct GlobalState {
    usage_page: u16,
    logical_min: i32,
    logical_max: i32,
    physical_min: i32,
    physical_max: i32,
    unit: u32,
    unit_exponent: i32,
    report_size: u8,
    report_id: u8,
    report_count: u16,
}

#[derive(Debug, Default)]
struct LocalState {
    usages: Vec<Usage>,
    usage_min: Option<u32>,
    usage_max: Option<u32>,
}

#[derive(Debug, Default)]
struct Parser {
    global: GlobalState,
    global_stack: Vec<GlobalState>,
    local: LocalState,
}

impl Parser {
    fn run(mut self, descriptor: &[u8]) -> Result<HidDevice> {
        let mut stack: Vec<Collection> = vec![Collection {
            kind: 0,
            usage: None,
            children: Vec::new(),
        }];
        let mut report_ids = BTreeSet::new();
        let mut offset = 0;

        while offset < descriptor.len() {
            let prefix = descriptor[offset];
            offset += 1;
            if prefix == 0xFE {
                // long item: [0xFE][data_len][tag][data...]
                let data_len = *descriptor.get(offset).ok_or(ProtocolError::InvalidReport(
                    "truncated long item".into(),
                ))? as usize;
                offset += 2 + data_len;
                continue;
            }
            let size = match prefix & 0x03 {
                3 => 4,
                n => n as usize,
            };
            let data = descriptor.get(offset..offset + size).ok_or_else(|| {
                ProtocolError::InvalidReport(format!("truncated item at offset {offset}"))
            })?;
            offset += size;
            let unsigned = data
                .iter()
                .rev()
                .fold(0u32, |acc, &b| (acc << 8) | b as u32);
            let signed = sign_extend(unsigned as u64, size.max(1) * 8) as i32;
            let item_type = (prefix >> 2) & 0x03;
            let tag = prefix >> 4;

            match item_type {
                // Main
                0 => match tag {
                    0x8 | 0x9 | 0xB => {
                        let report_type = match tag {
                            0x8 => ReportType::Input,
                            0x9 => ReportType::Output,
                            _ => ReportType::Feature,
                        };
                        let report = self.main_item(report_type, unsigned);
                        report_ids.insert(report.report_id);
                        let parent = stack.last_mut().ok_or(ProtocolError::InvalidReport(
                            "main item outside any collection".into(),
                        ))?;
                        parent.children.push(Node::Report(report));
                        self.local = LocalState::default();
                    }
                    0xA => {
                        let usage = self.local.usages.first().copied();
                        stack.push(Collection {
                            kind: unsigned as u8,
                            usage,
                            children: Vec::new(),
                        });
                        self.local = LocalState::default();
                    }
                    0xC => {
                        let done = stack.pop().ok_or(ProtocolError::InvalidReport(
                            "unbalanced end-collection".into(),
                        ))?;
                        let parent = stack.last_mut().ok_or(ProtocolError::InvalidReport(
                            "end-collection closed the root".into(),
                        ))?;
                        parent.children.push(Node::Collection(done));
                        self.local = LocalState::default();
                    }
                    _ => {
                        self.local = LocalState::default();
                    }
                },
                // Global
                1 => match tag {
                    0x0 => self.global.usage_page = unsigned as u16,
                    0x1 => self.global.logical_min = signed,
                    0x2 => self.global.logical_max = signed,
                    0x3 => self.global.physical_min = signed,
                    0x4 => self.global.physical_max = signed,
                    0x5 => self.global.unit_exponent = signed,
                    0x6 => self.global.unit = unsigned,
                    0x7 => self.global.report_size = unsigned as u8,
                    0x8 => self.global.report_id = unsigned as u8,
                    0x9 => self.global.report_count = unsigned as u16,
                    0xA => self.global_stack.push(self.global.clone()),
                    0xB => {
                        self.global = self.global_stack.pop().ok_or(
                            ProtocolError::InvalidReport("pop without matching push".into()),
                        )?
                    }
                    _ => {}
                },
                // Local
                2 => match tag {
                    0x0 => {
                        // extended usage carries its own page in the high word
                        let (page, id) = if size == 4 {
                            ((unsigned >> 16) as u16, unsigned as u16)
                        } else {
                            (self.global.usage_page, unsigned as u16)
                        };
                        self.local.usages.push(Usage { page, id });
                    }
                    0x1 => self.local.usage_min = Some(unsigned),
                    0x2 => self.local.usage_max = Some(unsigned),
                    _ => {}
                },
                _ => {
                    debug!(prefix, "skipping reserved item");
                }
            }
        }

        if stack.len() != 1 {
            return Err(ProtocolError::InvalidReport(
                "unterminated collection".into(),
            ));
        }
        let root = stack.pop().ok_or(ProtocolError::InvalidReport(
            "descriptor produced no tree".into(),
        ))?;
        Ok(HidDevice { root, report_ids })
    }

    fn main_item(&mut self, report_type: ReportType, item_flags: u32) -> Report {
        let mut usages = std::mem::take(&mut self.local.usages);
        if let (Some(min), Some(max)) = (self.local.usage_min, self.local.usage_max) {
            for id in min..=max {
                usages.push(Usage {
                    page: self.global.usage_page,
                    id: id as u16,
                });
            }
        }
        Report {
            report_type,
            report_id: self.global.report_id,
            size_bits: self.global.report_size,
            count: self.global.report_count,
            usages,
            logical_range: (self.global.logical_min, self.global.logical_max),
            physical_range: (self.global.physical_min, self.global.physical_max),
            unit: self.global.unit,
            unit_exponent: self.global.unit_exponent,
            flags: item_flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Boot keyboard fragment: modifier byte (8x1 bit) + 6-key array.
    const BOOT_KEYBOARD: &[u8] = &[
        0x05, 0x01, // usage page (generic desktop)
        0x09, 0x06, // usage (keyboard)
        0xA1, 0x01, // collection (application)
        0x85, 0x01, //   report id 1
        0x05, 0x07, //   usage page (key codes)
        0x19, 0xE0, //   usage min
        0x29, 0xE7, //   usage max
        0x15, 0x00, //   logical min 0
        0x25, 0x01, //   logical max 1
        0x75, 0x01, //   report size 1
        0x95, 0x08, //   report count 8
        0x81, 0x02, //   input (data, variable)
        0x19, 0x00, //   usage min
        0x29, 0x65, //   usage max
        0x15, 0x00, //   logical min 0
        0x25, 0x65, //   logical max 101
        0x75, 0x08, //   report size 8
        0x95, 0x06, //   report count 6
        0x81, 0x40, //   input (array, null state)
        0xC0, // end collection
    ];

    #[test]
    fn parses_boot_keyboard_tree() {
        let dev = HidDevice::parse(BOOT_KEYBOARD).unwrap();
        assert!(dev.uses_report_ids());
        let reports = dev.reports_of(1, ReportType::Input);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].count, 8);
        assert_eq!(reports[0].size_bits, 1);
        assert_eq!(reports[1].usages.len(), 0x66);
        assert!(reports[1].is_array());
        assert!(reports[1].has_null_state());
    }

    #[test]
    fn report_id_stripped_on_deserialize() {
        let dev = HidDevice::parse(BOOT_KEYBOARD).unwrap();
        let raw = [0x01, 0b0000_0010, 0x04, 0x05, 0x00, 0x00, 0x00, 0x00];
        let (id, values) = dev.deserialize(&raw, ReportType::Input).unwrap();
        assert_eq!(id, 1);
        assert_eq!(values.len(), 14);
        // bit 0 of the field maps to the byte's most significant bit
        assert_eq!(values[6], 1);
        assert_eq!(&values[8..10], &[0x04, 0x05]);
    }

    #[test]
    fn serialize_roundtrip() {
        let dev = HidDevice::parse(BOOT_KEYBOARD).unwrap();
        let values: Vec<i64> = vec![0, 1, 0, 0, 0, 0, 0, 0, 0x04, 0x05, 0, 0, 0, 0];
        let raw = dev.serialize(1, ReportType::Input, &values).unwrap();
        let (_, decoded) = dev.deserialize(&raw, ReportType::Input).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn null_state_passes_out_of_range_values() {
        let dev = HidDevice::parse(BOOT_KEYBOARD).unwrap();
        // 0xAA is above logical max 101 but the array has null state
        let raw = [0x01, 0x00, 0xAA, 0x00, 0x00, 0x00, 0x00, 0x00];
        let (_, values) = dev.deserialize(&raw, ReportType::Input).unwrap();
        assert_eq!(values[8], 0xAA);
    }

    #[test]
    fn out_of_range_without_null_state_fails() {
        let dev = HidDevice::parse(BOOT_KEYBOARD).unwrap();
        // modifier field (variable, no null state) only accepts 0..=1
        let mut values: Vec<i64> = vec![0; 14];
        values[0] = 2;
        assert!(matches!(
            dev.serialize(1, ReportType::Input, &values),
            Err(ProtocolError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn signed_multibyte_fields() {
        // relative mouse axes: two 16-bit signed values, little-endian
        let desc = [
            0x05, 0x01, // usage page
            0x09, 0x02, // usage (mouse)
            0xA1, 0x01, // collection
            0x16, 0x00, 0x80, //   logical min -32768
            0x26, 0xFF, 0x7F, //   logical max 32767
            0x75, 0x10, //   size 16
            0x95, 0x02, //   count 2
            0x81, 0x06, //   input (data, variable, relative)
            0xC0,
        ];
        let dev = HidDevice::parse(&desc).unwrap();
        assert!(!dev.uses_report_ids());
        let raw = dev.serialize(0, ReportType::Input, &[-5, 300]).unwrap();
        let (_, values) = dev.deserialize(&raw, ReportType::Input).unwrap();
        assert_eq!(values, vec![-5, 300]);
    }

    #[test]
    fn physical_scaling() {
        // one byte scaled to 0..=100 percent
        let desc = [
            0x05, 0x01, 0x09, 0x00, 0xA1, 0x01, // collection
            0x15, 0x00, // logical min 0
            0x25, 0x33, // logical max 51
            0x35, 0x00, // physical min 0
            0x45, 0x64, // physical max 100
            0x75, 0x08, 0x95, 0x01, // 1 byte
            0x81, 0x02, // input
            0xC0,
        ];
        let dev = HidDevice::parse(&desc).unwrap();
        let raw = dev.serialize(0, ReportType::Input, &[100]).unwrap();
        assert_eq!(raw, vec![0x33]);
        let (_, values) = dev.deserialize(&raw, ReportType::Input).unwrap();
        assert_eq!(values, vec![100]);
    }

    #[test]
    fn push_pop_restores_globals() {
        let desc = [
            0x05, 0x01, 0x09, 0x00, 0xA1, 0x01, // collection
            0x15, 0x00, 0x25, 0x01, 0x75, 0x01, 0x95, 0x04, // 4 bits
            0xA4, // push
            0x25, 0x7F, 0x75, 0x08, 0x95, 0x01, // override
            0x81, 0x02, // input with overridden globals
            0xB4, // pop
            0x81, 0x02, // input with restored globals
            0xC0,
        ];
        let dev = HidDevice::parse(&desc).unwrap();
        let reports = dev.reports_of(0, ReportType::Input);
        assert_eq!(reports[0].size_bits, 8);
        assert_eq!(reports[1].size_bits, 1);
        assert_eq!(reports[1].count, 4);
    }
}
