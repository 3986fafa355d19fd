//! Feature 0x1E02: ManageDeactivatableFeaturesAuth.
//!
//! Gates the manufacturing, compliance and Gothard feature groups behind
//! the authentication of feature 0x1602. Bitmaps use one bit per group;
//! the all-bit addresses every supported group at once.

use crate::error::{ProtocolError, Result};
use crate::message::ReportId;
use crate::registry::{Feature, FunctionSpec, VersionTable};

use super::{payload_field, payload_u16, FeatureRequest, FeatureResponse};

pub const FEATURE_ID: u16 = 0x1E02;

pub const BIT_MANUFACTURING: u8 = 0x01;
pub const BIT_COMPLIANCE: u8 = 0x02;
pub const BIT_GOTHARD: u8 = 0x04;
pub const BIT_ALL: u8 = 0x80;

const KNOWN_BITS: u8 = BIT_MANUFACTURING | BIT_COMPLIANCE | BIT_GOTHARD | BIT_ALL;

/// Reject bitmaps carrying reserved bits before they reach the wire.
fn check_bitmap(name: &'static str, bitmap: u8) -> Result<()> {
    if bitmap & !KNOWN_BITS != 0 {
        return Err(ProtocolError::InvalidArgument(format!(
            "{name} bitmap 0x{bitmap:02X} sets reserved bits"
        )));
    }
    Ok(())
}

pub fn feature() -> Feature {
    let short_req = |function_index, name| FunctionSpec {
        function_index,
        name,
        request_report: ReportId::Short,
        response_report: ReportId::Long,
    };
    Feature {
        id: FEATURE_ID,
        name: "ManageDeactivatableFeaturesAuth",
        versions: vec![VersionTable {
            version: 0,
            functions: vec![
                short_req(0, "getInfo"),
                short_req(1, "disableFeatures"),
                short_req(2, "enableFeatures"),
                short_req(3, "getReactInfo"),
            ],
            events: vec![],
            max_function_index: 3,
        }],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetInfo;

impl FeatureRequest for GetInfo {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 0;
    const REPORT_ID: ReportId = ReportId::Short;

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetInfoResponse {
    /// Groups this firmware implements.
    pub support_bitmap: u8,
    /// Groups enabled right now.
    pub state_bitmap: u8,
}

impl GetInfoResponse {
    pub fn supports(&self, bit: u8) -> bool {
        self.support_bitmap & bit != 0
    }

    pub fn is_enabled(&self, bit: u8) -> bool {
        self.state_bitmap & bit != 0
    }
}

impl FeatureResponse for GetInfoResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 0;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            support_bitmap: payload_field(payload, 0)?,
            state_bitmap: payload_field(payload, 1)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisableFeatures {
    pub bitmap: u8,
}

impl DisableFeatures {
    pub fn new(bitmap: u8) -> Result<Self> {
        check_bitmap("disable", bitmap)?;
        Ok(Self { bitmap })
    }
}

impl FeatureRequest for DisableFeatures {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 1;
    const REPORT_ID: ReportId = ReportId::Short;

    fn payload(&self) -> Vec<u8> {
        vec![self.bitmap]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisableFeaturesResponse;

impl FeatureResponse for DisableFeaturesResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 1;

    fn from_payload(_payload: &[u8]) -> Result<Self> {
        Ok(Self)
    }
}

/// Enabling requires an open authenticated session for each named group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnableFeatures {
    pub bitmap: u8,
}

impl EnableFeatures {
    pub fn new(bitmap: u8) -> Result<Self> {
        check_bitmap("enable", bitmap)?;
        Ok(Self { bitmap })
    }
}

impl FeatureRequest for EnableFeatures {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 2;
    const REPORT_ID: ReportId = ReportId::Short;

    fn payload(&self) -> Vec<u8> {
        vec![self.bitmap]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnableFeaturesResponse;

impl FeatureResponse for EnableFeaturesResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 2;

    fn from_payload(_payload: &[u8]) -> Result<Self> {
        Ok(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetReactInfo;

impl FeatureRequest for GetReactInfo {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 3;
    const REPORT_ID: ReportId = ReportId::Short;

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetReactInfoResponse {
    /// Feature id to authenticate against, 0x1602 on current firmware.
    pub auth_feature: u16,
}

impl FeatureResponse for GetReactInfoResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 3;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            auth_feature: payload_u16(payload, 0)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_bits_are_rejected() {
        assert!(EnableFeatures::new(BIT_MANUFACTURING | BIT_GOTHARD).is_ok());
        let err = EnableFeatures::new(0x08).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidArgument(_)));
        assert!(DisableFeatures::new(0x10).is_err());
        assert!(DisableFeatures::new(BIT_ALL).is_ok());
    }

    #[test]
    fn info_bitmaps() {
        let mut data = vec![0x11, 0x01, 0x0A, 0x0D];
        data.push(BIT_MANUFACTURING | BIT_COMPLIANCE);
        data.push(BIT_MANUFACTURING);
        data.resize(20, 0);
        let rsp = GetInfoResponse::parse(&data).unwrap();
        assert!(rsp.supports(BIT_COMPLIANCE));
        assert!(!rsp.supports(BIT_GOTHARD));
        assert!(rsp.is_enabled(BIT_MANUFACTURING));
        assert!(!rsp.is_enabled(BIT_COMPLIANCE));
    }

    #[test]
    fn react_info_names_the_auth_feature() {
        let mut data = vec![0x11, 0x01, 0x0A, 0x3D, 0x16, 0x02];
        data.resize(20, 0);
        let rsp = GetReactInfoResponse::parse(&data).unwrap();
        assert_eq!(rsp.auth_feature, 0x1602);
    }
}
