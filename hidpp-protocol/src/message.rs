//! HID++ report framing: report ids, the common header, schema-driven
//! message instances and the HID++ 2.0 error report.
//!
//! Wire layouts:
//!
//! ```text
//! short     [0x10][device_index][feature_index][fn<<4 | sw_id][p0][p1][p2]
//! long      [0x11][device_index][feature_index][fn<<4 | sw_id][p0..p15]
//! very long [0x12][device_index][feature_index][fn<<4 | sw_id][p0..p59]
//! error     [rid ][device_index][0xFF][fn<<4 | sw_id][feature_index][code][..]
//! ```

use std::collections::BTreeMap;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::bits::BitVec;
use crate::error::{ProtocolError, Result};
use crate::field::{FieldValue, Schema};
use crate::hex::HexBuf;

/// Device index addressing the transceiver (the receiver itself).
pub const TRANSCEIVER_DEVICE_INDEX: u8 = 0xFF;

/// Feature-index byte value tagging an error report.
pub const ERROR_TAG: u8 = 0xFF;

/// Report id, selecting one of the three fixed report sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportId {
    Short,
    Long,
    VeryLong,
}

impl ReportId {
    pub const fn value(self) -> u8 {
        match self {
            ReportId::Short => 0x10,
            ReportId::Long => 0x11,
            ReportId::VeryLong => 0x12,
        }
    }

    /// Total report size in bytes, header included.
    pub const fn size(self) -> usize {
        match self {
            ReportId::Short => 7,
            ReportId::Long => 20,
            ReportId::VeryLong => 64,
        }
    }

    /// Payload capacity after the 4-byte header.
    pub const fn payload_size(self) -> usize {
        self.size() - 4
    }

    pub fn from_value(v: u8) -> Option<Self> {
        match v {
            0x10 => Some(ReportId::Short),
            0x11 => Some(ReportId::Long),
            0x12 => Some(ReportId::VeryLong),
            _ => None,
        }
    }
}

/// Message direction/kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Request,
    Response,
    Event,
}

/// The 4-byte header common to every HID++ report.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct RawHeader {
    pub report_id: u8,
    pub device_index: u8,
    pub feature_index: u8,
    pub func_swid: u8,
}

/// Decoded header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub report_id: ReportId,
    pub device_index: u8,
    pub feature_index: u8,
    pub function_index: u8,
    pub software_id: u8,
}

impl Header {
    pub fn new(
        report_id: ReportId,
        device_index: u8,
        feature_index: u8,
        function_index: u8,
        software_id: u8,
    ) -> Self {
        Self {
            report_id,
            device_index,
            feature_index,
            function_index: function_index & 0x0F,
            software_id: software_id & 0x0F,
        }
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        [
            self.report_id.value(),
            self.device_index,
            self.feature_index,
            (self.function_index << 4) | self.software_id,
        ]
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let raw = RawHeader::read_from_bytes(data.get(..4).ok_or_else(|| {
            ProtocolError::InvalidReport("report shorter than header".into())
        })?)
        .map_err(|_| ProtocolError::InvalidReport("unreadable header".into()))?;
        let report_id = ReportId::from_value(raw.report_id).ok_or_else(|| {
            ProtocolError::InvalidReport(format!("unknown report id 0x{:02X}", raw.report_id))
        })?;
        Ok(Self {
            report_id,
            device_index: raw.device_index,
            feature_index: raw.feature_index,
            function_index: raw.func_swid >> 4,
            software_id: raw.func_swid & 0x0F,
        })
    }
}

/// An instance of a schema with per-field values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    schema: Schema,
    values: BTreeMap<u8, BitVec>,
}

impl Message {
    pub fn new(header: Header, schema: Schema) -> Self {
        Self {
            header,
            schema,
            values: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Assign a field value by name (or alias). Checks and conversions
    /// run here, on assignment.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<()> {
        let desc = self
            .schema
            .field_by_name(name)
            .ok_or_else(|| ProtocolError::InvalidValue {
                field: name.to_string(),
                reason: "no such field".into(),
            })?;
        let value = value.into();
        desc.validate(&value)?;
        let bits = desc.to_bits(&value)?;
        self.values.insert(desc.fid, bits);
        Ok(())
    }

    /// Raw bits of a field, if assigned.
    pub fn get(&self, name: &str) -> Option<&BitVec> {
        let desc = self.schema.field_by_name(name)?;
        self.values.get(&desc.fid)
    }

    /// Field value as big-endian unsigned integer.
    pub fn get_uint(&self, name: &str) -> Result<u64> {
        self.get(name)
            .ok_or_else(|| ProtocolError::InvalidValue {
                field: name.to_string(),
                reason: "field not set".into(),
            })?
            .as_uint(crate::bits::Endian::Big)
    }

    /// Field value as bytes (padded byte view).
    pub fn get_bytes(&self, name: &str) -> Result<HexBuf> {
        Ok(HexBuf::new(
            self.get(name)
                .ok_or_else(|| ProtocolError::InvalidValue {
                    field: name.to_string(),
                    reason: "field not set".into(),
                })?
                .as_bytes()
                .to_vec(),
        ))
    }

    /// Serialize to a full report of the declared size.
    ///
    /// Fields are concatenated in declaration order; unset fields fall
    /// back to their default, or zero unless marked optional-absent.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut payload = BitVec::new(0);
        for desc in self.schema.fields() {
            if let Some(bits) = self.values.get(&desc.fid) {
                payload.extend(bits);
            } else if let Some(default) = &desc.default {
                payload.extend(&desc.to_bits(&FieldValue::Bytes(default.clone()))?);
            } else if let Some(width) = desc.bit_length {
                if !desc.optional {
                    payload.extend(&BitVec::new(width as usize));
                }
            }
            // unset variable-length field contributes nothing
        }
        let capacity = self.header.report_id.payload_size() * 8;
        if payload.len() > capacity {
            return Err(ProtocolError::InvalidReport(format!(
                "payload of {} bits exceeds report capacity of {} bits",
                payload.len(),
                capacity
            )));
        }
        let mut out = self.header.to_bytes().to_vec();
        let mut body = payload.into_bytes();
        body.resize(self.header.report_id.payload_size(), 0);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parse a full report against a schema, validating the total length.
    pub fn parse(schema: Schema, data: &[u8]) -> Result<Message> {
        let header = Header::parse(data)?;
        if data.len() != header.report_id.size() {
            return Err(ProtocolError::InvalidReport(format!(
                "report id 0x{:02X} requires {} bytes, got {}",
                header.report_id.value(),
                header.report_id.size(),
                data.len()
            )));
        }
        let body = BitVec::from_bytes(&data[4..]);
        let mut values = BTreeMap::new();
        let mut cursor = 0usize;
        for desc in schema.fields() {
            match desc.bit_length {
                Some(width) => {
                    let width = width as usize;
                    if cursor + width > body.len() {
                        return Err(ProtocolError::InvalidReport(format!(
                            "field '{}' overruns report body",
                            desc.name
                        )));
                    }
                    values.insert(desc.fid, body.get_slice(cursor, cursor + width)?);
                    cursor += width;
                }
                None => {
                    values.insert(desc.fid, body.get_slice(cursor, body.len())?);
                    cursor = body.len();
                }
            }
        }
        Ok(Message {
            header,
            schema,
            values,
        })
    }
}

/// HID++ 2.0 device error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Hidpp2ErrorCode {
    NoError = 0,
    Unknown = 1,
    InvalidArgument = 2,
    OutOfRange = 3,
    HwError = 4,
    LogitechInternal = 5,
    InvalidFeatureIndex = 6,
    InvalidFunctionId = 7,
    Busy = 8,
    Unsupported = 9,
    NotAllowed = 11,
    OutOfMemory = 13,
}

impl Hidpp2ErrorCode {
    pub fn from_value(v: u8) -> Option<Self> {
        use Hidpp2ErrorCode::*;
        match v {
            0 => Some(NoError),
            1 => Some(Unknown),
            2 => Some(InvalidArgument),
            3 => Some(OutOfRange),
            4 => Some(HwError),
            5 => Some(LogitechInternal),
            6 => Some(InvalidFeatureIndex),
            7 => Some(InvalidFunctionId),
            8 => Some(Busy),
            9 => Some(Unsupported),
            11 => Some(NotAllowed),
            13 => Some(OutOfMemory),
            _ => None,
        }
    }
}

/// A decoded HID++ 2.0 error report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorReport {
    pub device_index: u8,
    /// Feature index of the offending request (byte 4 of the report).
    pub feature_index: u8,
    pub function_index: u8,
    pub software_id: u8,
    pub error_code: Hidpp2ErrorCode,
}

impl ErrorReport {
    /// Whether `data` carries the error tag in the feature-index byte.
    pub fn is_error_report(data: &[u8]) -> bool {
        data.len() >= 6
            && ReportId::from_value(data[0]).is_some()
            && data[2] == ERROR_TAG
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if !Self::is_error_report(data) {
            return Err(ProtocolError::InvalidReport("not an error report".into()));
        }
        let code = Hidpp2ErrorCode::from_value(data[5]).ok_or_else(|| {
            ProtocolError::InvalidReport(format!("unknown error code {}", data[5]))
        })?;
        Ok(Self {
            device_index: data[1],
            feature_index: data[4],
            function_index: data[3] >> 4,
            software_id: data[3] & 0x0F,
            error_code: code,
        })
    }

    /// Build the wire form, zero-padded to the report size.
    pub fn serialize(&self, report_id: ReportId) -> Vec<u8> {
        let mut out = vec![0u8; report_id.size()];
        out[0] = report_id.value();
        out[1] = self.device_index;
        out[2] = ERROR_TAG;
        out[3] = (self.function_index << 4) | self.software_id;
        out[4] = self.feature_index;
        out[5] = self.error_code as u8;
        out
    }
}

/// HID++ 1.0 sub-id values (byte 2 of a short report) that the receiver
/// emits on behalf of paired devices. These are receiver notifications
/// even when the device-index byte names a paired device, and always
/// route to the transceiver queue.
pub mod subid {
    pub const DEVICE_DISCONNECTION: u8 = 0x40;
    pub const DEVICE_CONNECTION: u8 = 0x41;
    pub const DEVICE_DISCOVERY: u8 = 0x49;
    pub const PAIRING_STATUS: u8 = 0x4B;
    pub const ERROR_MESSAGE: u8 = 0x8F;

    /// Sub-ids that must be forced to the transceiver queue.
    pub fn is_receiver_notification(sub_id: u8) -> bool {
        matches!(
            sub_id,
            DEVICE_DISCONNECTION | DEVICE_CONNECTION | DEVICE_DISCOVERY | PAIRING_STATUS
                | ERROR_MESSAGE
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Check, FieldDesc};

    fn name_chunk_schema() -> Schema {
        Schema::new(vec![FieldDesc::new(0xFA, "device_name", "DeviceName", 128)
            .with_checks(vec![Check::HexList(16)])])
        .unwrap()
    }

    #[test]
    fn header_roundtrip() {
        let h = Header::new(ReportId::Short, 0x01, 0x05, 0x1, 0xD);
        let bytes = h.to_bytes();
        assert_eq!(bytes, [0x10, 0x01, 0x05, 0x1D]);
        assert_eq!(Header::parse(&bytes).unwrap(), h);
    }

    #[test]
    fn serialize_pads_to_report_size() {
        let h = Header::new(ReportId::Long, 0x01, 0x07, 0x2, 0x3);
        let mut msg = Message::new(h, name_chunk_schema());
        msg.set("device_name", &b"MX KEYS MINI\0\0\0\0"[..]).unwrap();
        let bytes = msg.serialize().unwrap();
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[..4], &[0x11, 0x01, 0x07, 0x23]);
        assert_eq!(&bytes[4..16], b"MX KEYS MINI");
    }

    #[test]
    fn parse_serialize_identity() {
        let h = Header::new(ReportId::Long, 0x02, 0x09, 0x0, 0x4);
        let mut msg = Message::new(h, name_chunk_schema());
        msg.set("device_name", &[0xABu8; 16][..]).unwrap();
        let bytes = msg.serialize().unwrap();
        let parsed = Message::parse(name_chunk_schema(), &bytes).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn parse_rejects_wrong_length() {
        let h = Header::new(ReportId::Long, 0x02, 0x09, 0x0, 0x4);
        let msg = Message::new(h, name_chunk_schema());
        let mut bytes = msg.serialize().unwrap();
        bytes.pop();
        assert!(Message::parse(name_chunk_schema(), &bytes).is_err());
    }

    #[test]
    fn wrong_value_length_fails_check() {
        let h = Header::new(ReportId::Long, 0x02, 0x09, 0x0, 0x4);
        let mut msg = Message::new(h, name_chunk_schema());
        let err = msg.set("device_name", &[0u8; 3][..]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidValue { .. }));
    }

    #[test]
    fn error_report_roundtrip() {
        let err = ErrorReport {
            device_index: 0x01,
            feature_index: 0x08,
            function_index: 0x2,
            software_id: 0x3,
            error_code: Hidpp2ErrorCode::NotAllowed,
        };
        let bytes = err.serialize(ReportId::Long);
        assert!(ErrorReport::is_error_report(&bytes));
        assert_eq!(ErrorReport::parse(&bytes).unwrap(), err);
    }

    #[test]
    fn receiver_subids() {
        assert!(subid::is_receiver_notification(0x41));
        assert!(subid::is_receiver_notification(0x8F));
        assert!(!subid::is_receiver_notification(0x00));
        assert!(!subid::is_receiver_notification(0x10));
    }
}
