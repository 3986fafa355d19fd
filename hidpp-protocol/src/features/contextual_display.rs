//! Feature 0x19A1: ContextualDisplay.
//!
//! First VLP-only feature: image uploads exceed the 64-byte report and
//! travel fragmented through the very-long packet layer. Request
//! payloads here are the reassembled transfer contents; framing is done
//! by [`crate::vlp`].

use crate::error::{ProtocolError, Result};
use crate::message::ReportId;
use crate::registry::{Feature, FunctionSpec, VersionTable};

use super::{payload_field, payload_u16, FeatureRequest, FeatureResponse};

pub const FEATURE_ID: u16 = 0x19A1;

pub fn feature() -> Feature {
    let vlp = |function_index, name| FunctionSpec {
        function_index,
        name,
        request_report: ReportId::VeryLong,
        response_report: ReportId::VeryLong,
    };
    Feature {
        id: FEATURE_ID,
        name: "ContextualDisplay",
        versions: vec![VersionTable {
            version: 0,
            functions: vec![
                vlp(0, "getCapabilities"),
                vlp(1, "getDisplayInfo"),
                vlp(2, "setImage"),
                vlp(3, "getSupportedDeviceStates"),
                vlp(4, "setDeviceState"),
                vlp(5, "getDeviceState"),
                vlp(6, "setConfig"),
                vlp(7, "getConfig"),
            ],
            events: vec![],
            max_function_index: 7,
        }],
    }
}

/// setImage outcome codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ImageResultCode {
    DisplayUpdated = 0x00,
    /// Image stored but the target screen is not currently visible.
    BufferedNotVisible = 0x01,
    UnsupportedImageResolution = 0x80,
    UnsupportedImageFormat = 0x81,
    JpegParserError = 0x82,
    EmptyBuffer = 0x83,
    UnsupportedDeviceState = 0x84,
}

impl ImageResultCode {
    pub fn from_value(v: u8) -> Result<Self> {
        use ImageResultCode::*;
        Ok(match v {
            0x00 => DisplayUpdated,
            0x01 => BufferedNotVisible,
            0x80 => UnsupportedImageResolution,
            0x81 => UnsupportedImageFormat,
            0x82 => JpegParserError,
            0x83 => EmptyBuffer,
            0x84 => UnsupportedDeviceState,
            _ => {
                return Err(ProtocolError::InvalidValue {
                    field: "result_code".into(),
                    reason: format!("unknown value 0x{v:02X}"),
                })
            }
        })
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::DisplayUpdated | Self::BufferedNotVisible)
    }
}

/// Image pixel encodings advertised by getCapabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ImageFormat {
    Rgb565 = 0,
    Rgb888 = 1,
    Jpeg = 2,
}

// ====================================================================
// getCapabilities / getDisplayInfo
// ====================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetCapabilities;

impl FeatureRequest for GetCapabilities {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 0;
    const REPORT_ID: ReportId = ReportId::VeryLong;

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetCapabilitiesResponse {
    pub device_screen_count: u8,
    pub max_image_size: u32,
    pub max_image_fps: u8,
    /// Capability bits: deferrable update, supported pixel formats.
    pub capabilities: u8,
}

impl FeatureResponse for GetCapabilitiesResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 0;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        let max_image_size = u32::from_be_bytes([
            payload_field(payload, 1)?,
            payload_field(payload, 2)?,
            payload_field(payload, 3)?,
            payload_field(payload, 4)?,
        ]);
        Ok(Self {
            device_screen_count: payload_field(payload, 0)?,
            max_image_size,
            max_image_fps: payload_field(payload, 5)?,
            capabilities: payload_field(payload, 6)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetDisplayInfo {
    pub display_index: u8,
}

impl FeatureRequest for GetDisplayInfo {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 1;
    const REPORT_ID: ReportId = ReportId::VeryLong;

    fn payload(&self) -> Vec<u8> {
        vec![self.display_index]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetDisplayInfoResponse {
    pub display_shape: u8,
    pub display_dimension: u16,
    pub horizontal_resolution: u16,
    pub vertical_resolution: u16,
    pub button_count: u8,
    pub visible_area_count: u8,
}

impl FeatureResponse for GetDisplayInfoResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 1;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            display_shape: payload_field(payload, 0)?,
            display_dimension: payload_u16(payload, 1)?,
            horizontal_resolution: payload_u16(payload, 3)?,
            vertical_resolution: payload_u16(payload, 5)?,
            button_count: payload_field(payload, 7)?,
            visible_area_count: payload_field(payload, 8)?,
        })
    }
}

// ====================================================================
// setImage
// ====================================================================

/// One image destined for a rectangle of one screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub format: ImageFormat,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub data: Vec<u8>,
}

/// Full setImage transfer payload; fragmented by the VLP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetImage {
    pub display_index: u8,
    /// Render immediately; when false the image stays buffered until the
    /// next non-deferred update.
    pub update_screen: bool,
    pub images: Vec<ImageDescriptor>,
}

impl FeatureRequest for SetImage {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 2;
    const REPORT_ID: ReportId = ReportId::VeryLong;

    fn payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.display_index);
        out.push(u8::from(self.update_screen));
        out.push(self.images.len() as u8);
        for img in &self.images {
            out.push(img.format as u8);
            out.extend_from_slice(&img.x.to_be_bytes());
            out.extend_from_slice(&img.y.to_be_bytes());
            out.extend_from_slice(&img.width.to_be_bytes());
            out.extend_from_slice(&img.height.to_be_bytes());
            out.extend_from_slice(&(img.data.len() as u32).to_be_bytes());
            out.extend_from_slice(&img.data);
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetImageResponse {
    pub result_code: ImageResultCode,
    /// Images accepted out of the transfer.
    pub count: u8,
}

impl FeatureResponse for SetImageResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 2;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            result_code: ImageResultCode::from_value(payload_field(payload, 0)?)?,
            count: payload_field(payload, 1)?,
        })
    }
}

// ====================================================================
// device state / config
// ====================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetSupportedDeviceStates;

impl FeatureRequest for GetSupportedDeviceStates {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 3;
    const REPORT_ID: ReportId = ReportId::VeryLong;

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// Bitmask of selectable firmware UI states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetSupportedDeviceStatesResponse {
    pub states: u8,
}

impl FeatureResponse for GetSupportedDeviceStatesResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 3;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            states: payload_field(payload, 0)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetDeviceState {
    pub state: u8,
}

impl FeatureRequest for SetDeviceState {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 4;
    const REPORT_ID: ReportId = ReportId::VeryLong;

    fn payload(&self) -> Vec<u8> {
        vec![self.state]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStateResponse {
    pub state: u8,
}

impl FeatureResponse for DeviceStateResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 4;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            state: payload_field(payload, 0)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetDeviceState;

impl FeatureRequest for GetDeviceState {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 5;
    const REPORT_ID: ReportId = ReportId::VeryLong;

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetDeviceStateResponse {
    pub state: u8,
}

impl FeatureResponse for GetDeviceStateResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 5;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            state: payload_field(payload, 0)?,
        })
    }
}

/// Config bit 0: deferrable display updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetConfig {
    pub config: u8,
}

impl FeatureRequest for SetConfig {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 6;
    const REPORT_ID: ReportId = ReportId::VeryLong;

    fn payload(&self) -> Vec<u8> {
        vec![self.config]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetConfigResponse {
    pub config: u8,
}

impl FeatureResponse for SetConfigResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 6;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            config: payload_field(payload, 0)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetConfig;

impl FeatureRequest for GetConfig {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 7;
    const REPORT_ID: ReportId = ReportId::VeryLong;

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetConfigResponse {
    pub config: u8,
}

impl FeatureResponse for GetConfigResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 7;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            config: payload_field(payload, 0)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_image_payload_layout() {
        let req = SetImage {
            display_index: 0,
            update_screen: true,
            images: vec![ImageDescriptor {
                format: ImageFormat::Jpeg,
                x: 10,
                y: 20,
                width: 100,
                height: 50,
                data: vec![0xFF, 0xD8, 0xFF, 0xD9],
            }],
        };
        let payload = req.payload();
        assert_eq!(&payload[..3], &[0, 1, 1]);
        assert_eq!(payload[3], ImageFormat::Jpeg as u8);
        assert_eq!(&payload[4..6], &10u16.to_be_bytes());
        assert_eq!(&payload[12..16], &4u32.to_be_bytes());
        assert_eq!(&payload[16..], &[0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[test]
    fn result_codes() {
        assert!(ImageResultCode::from_value(0x01).unwrap().is_success());
        assert!(!ImageResultCode::from_value(0x82).unwrap().is_success());
        assert!(ImageResultCode::from_value(0x7F).is_err());
    }

    #[test]
    fn set_image_response_fields() {
        let mut data = vec![0x12, 0x01, 0x0B, 0x2D, 0x00, 0x03];
        data.resize(64, 0);
        let rsp = SetImageResponse::parse(&data).unwrap();
        assert_eq!(rsp.result_code, ImageResultCode::DisplayUpdated);
        assert_eq!(rsp.count, 3);
    }

    #[test]
    fn capabilities_decode() {
        let mut data = vec![0x12, 0x01, 0x0B, 0x0D];
        data.push(2); // screens
        data.extend_from_slice(&32768u32.to_be_bytes());
        data.push(30); // fps
        data.push(0x07);
        data.resize(64, 0);
        let rsp = GetCapabilitiesResponse::parse(&data).unwrap();
        assert_eq!(rsp.device_screen_count, 2);
        assert_eq!(rsp.max_image_size, 32768);
        assert_eq!(rsp.max_image_fps, 30);
    }
}
