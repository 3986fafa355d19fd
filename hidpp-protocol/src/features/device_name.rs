//! Feature 0x0005: DeviceTypeAndName.
//!
//! The marketing name is read in 16-byte windows; the full string is the
//! concatenation of successive reads, trimmed to the declared length.

use crate::error::{ProtocolError, Result};
use crate::message::ReportId;
use crate::registry::{Feature, FunctionSpec, VersionTable};

use super::{payload_field, FeatureRequest, FeatureResponse};

pub const FEATURE_ID: u16 = 0x0005;

pub fn feature() -> Feature {
    Feature {
        id: FEATURE_ID,
        name: "DeviceTypeAndName",
        versions: vec![VersionTable {
            version: 0,
            functions: vec![
                FunctionSpec {
                    function_index: 0,
                    name: "getDeviceNameCount",
                    request_report: ReportId::Short,
                    response_report: ReportId::Long,
                },
                FunctionSpec {
                    function_index: 1,
                    name: "getDeviceName",
                    request_report: ReportId::Short,
                    response_report: ReportId::Long,
                },
                FunctionSpec {
                    function_index: 2,
                    name: "getDeviceType",
                    request_report: ReportId::Short,
                    response_report: ReportId::Long,
                },
            ],
            events: vec![],
            max_function_index: 2,
        }],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceType {
    Keyboard = 0,
    RemoteControl = 1,
    Numpad = 2,
    Mouse = 3,
    Trackpad = 4,
    Trackball = 5,
    Presenter = 6,
    Receiver = 7,
    Headset = 8,
    Webcam = 9,
    SteeringWheel = 10,
    Joystick = 11,
    Gamepad = 12,
    Dock = 13,
    Speaker = 14,
    Microphone = 15,
    IlluminationLight = 16,
    ProgrammableController = 17,
    CarSimPedals = 18,
    Adapter = 19,
}

impl DeviceType {
    pub fn from_value(v: u8) -> Result<Self> {
        use DeviceType::*;
        Ok(match v {
            0 => Keyboard,
            1 => RemoteControl,
            2 => Numpad,
            3 => Mouse,
            4 => Trackpad,
            5 => Trackball,
            6 => Presenter,
            7 => Receiver,
            8 => Headset,
            9 => Webcam,
            10 => SteeringWheel,
            11 => Joystick,
            12 => Gamepad,
            13 => Dock,
            14 => Speaker,
            15 => Microphone,
            16 => IlluminationLight,
            17 => ProgrammableController,
            18 => CarSimPedals,
            19 => Adapter,
            _ => {
                return Err(ProtocolError::InvalidValue {
                    field: "device_type".into(),
                    reason: format!("unknown value {v}"),
                })
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetDeviceNameCount;

impl FeatureRequest for GetDeviceNameCount {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 0;
    const REPORT_ID: ReportId = ReportId::Short;

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetDeviceNameCountResponse {
    pub length: u8,
}

impl FeatureResponse for GetDeviceNameCountResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 0;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            length: payload_field(payload, 0)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetDeviceName {
    pub char_index: u8,
}

impl FeatureRequest for GetDeviceName {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 1;
    const REPORT_ID: ReportId = ReportId::Short;

    fn payload(&self) -> Vec<u8> {
        vec![self.char_index]
    }
}

/// One 16-byte window of the name, NUL padded past the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDeviceNameResponse {
    pub chunk: [u8; 16],
}

impl GetDeviceNameResponse {
    /// Chunk contents up to the first NUL, as UTF-8.
    pub fn as_str(&self) -> Result<&str> {
        let end = self.chunk.iter().position(|&b| b == 0).unwrap_or(16);
        std::str::from_utf8(&self.chunk[..end]).map_err(|_| ProtocolError::InvalidValue {
            field: "device_name".into(),
            reason: "not valid UTF-8".into(),
        })
    }
}

impl FeatureResponse for GetDeviceNameResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 1;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        let mut chunk = [0u8; 16];
        let n = payload.len().min(16);
        chunk[..n].copy_from_slice(&payload[..n]);
        Ok(Self { chunk })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetDeviceType;

impl FeatureRequest for GetDeviceType {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 2;
    const REPORT_ID: ReportId = ReportId::Short;

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetDeviceTypeResponse {
    pub device_type: DeviceType,
}

impl FeatureResponse for GetDeviceTypeResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 2;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            device_type: DeviceType::from_value(payload_field(payload, 0)?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_chunk_trims_at_nul() {
        let mut data = vec![0x11, 0x01, 0x03, 0x1D];
        data.extend_from_slice(b"MX KEYS S\0\0\0\0\0\0\0");
        let rsp = GetDeviceNameResponse::parse(&data).unwrap();
        assert_eq!(rsp.as_str().unwrap(), "MX KEYS S");
    }

    #[test]
    fn device_type_values() {
        assert_eq!(DeviceType::from_value(0).unwrap(), DeviceType::Keyboard);
        assert_eq!(DeviceType::from_value(12).unwrap(), DeviceType::Gamepad);
        assert!(DeviceType::from_value(20).is_err());
    }

    #[test]
    fn char_index_in_request() {
        let report = GetDeviceName { char_index: 16 }.build(0x01, 0x03, 0x0A).unwrap();
        assert_eq!(report[4], 16);
    }
}
