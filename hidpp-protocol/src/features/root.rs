//! Feature 0x0000: Root.
//!
//! Always at feature index 0. Resolves feature ids to runtime indices
//! and answers the protocol-version ping.

use crate::error::Result;
use crate::message::ReportId;
use crate::registry::{Feature, FunctionSpec, VersionTable};

use super::{payload_field, FeatureRequest, FeatureResponse};

pub const FEATURE_ID: u16 = 0x0000;

/// Feature flags echoed by getFeature.
pub const FLAG_OBSOLETE: u8 = 0x80;
pub const FLAG_HIDDEN: u8 = 0x40;
pub const FLAG_ENGINEERING: u8 = 0x20;

pub fn feature() -> Feature {
    let base = vec![
        FunctionSpec {
            function_index: 0,
            name: "getFeature",
            request_report: ReportId::Short,
            response_report: ReportId::Long,
        },
        FunctionSpec {
            function_index: 1,
            name: "getProtocolVersion",
            request_report: ReportId::Short,
            response_report: ReportId::Long,
        },
    ];
    Feature {
        id: FEATURE_ID,
        name: "Root",
        versions: vec![
            VersionTable {
                version: 0,
                functions: base,
                events: vec![],
                max_function_index: 1,
            },
            // v1 extends the getFeature response with a version byte;
            // v2 adds no wire change visible to the host.
            VersionTable {
                version: 1,
                functions: vec![],
                events: vec![],
                max_function_index: 1,
            },
            VersionTable {
                version: 2,
                functions: vec![],
                events: vec![],
                max_function_index: 1,
            },
        ],
    }
}

// ====================================================================
// getFeature
// ====================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetFeature {
    pub feature_id: u16,
}

impl FeatureRequest for GetFeature {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 0;
    const REPORT_ID: ReportId = ReportId::Short;

    fn payload(&self) -> Vec<u8> {
        self.feature_id.to_be_bytes().to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetFeatureResponse {
    /// 0 means the device does not implement the feature.
    pub feature_index: u8,
    pub flags: u8,
    pub version: u8,
}

impl GetFeatureResponse {
    pub fn is_obsolete(&self) -> bool {
        self.flags & FLAG_OBSOLETE != 0
    }

    pub fn is_hidden(&self) -> bool {
        self.flags & FLAG_HIDDEN != 0
    }

    pub fn is_engineering(&self) -> bool {
        self.flags & FLAG_ENGINEERING != 0
    }
}

impl FeatureResponse for GetFeatureResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 0;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            feature_index: payload_field(payload, 0)?,
            flags: payload_field(payload, 1)?,
            version: payload_field(payload, 2)?,
        })
    }
}

// ====================================================================
// getProtocolVersion
// ====================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetProtocolVersion {
    /// Arbitrary byte echoed back, used to pair request and response.
    pub ping_data: u8,
}

impl FeatureRequest for GetProtocolVersion {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 1;
    const REPORT_ID: ReportId = ReportId::Short;

    fn payload(&self) -> Vec<u8> {
        vec![0, 0, self.ping_data]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetProtocolVersionResponse {
    pub protocol_num: u8,
    pub target_sw: u8,
    pub ping_data: u8,
}

impl FeatureResponse for GetProtocolVersionResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 1;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            protocol_num: payload_field(payload, 0)?,
            target_sw: payload_field(payload, 1)?,
            ping_data: payload_field(payload, 2)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_feature_report_layout() {
        let req = GetFeature { feature_id: 0x1602 };
        let report = req.build(0x01, 0x00, 0x0D).unwrap();
        assert_eq!(report, vec![0x10, 0x01, 0x00, 0x0D, 0x16, 0x02, 0x00]);
    }

    #[test]
    fn get_feature_response_decodes_flags() {
        let mut data = vec![0x11, 0x01, 0x00, 0x0D];
        data.extend_from_slice(&[0x05, 0xC0, 0x02]);
        data.resize(20, 0);
        let rsp = GetFeatureResponse::parse(&data).unwrap();
        assert_eq!(rsp.feature_index, 5);
        assert!(rsp.is_obsolete());
        assert!(rsp.is_hidden());
        assert!(!rsp.is_engineering());
        assert_eq!(rsp.version, 2);
    }

    #[test]
    fn ping_roundtrip_layout() {
        let report = GetProtocolVersion { ping_data: 0xAA }
            .build(0xFF, 0x00, 0x01)
            .unwrap();
        assert_eq!(&report[..4], &[0x10, 0xFF, 0x00, 0x11]);
        assert_eq!(report[6], 0xAA);
    }

    #[test]
    fn wrong_function_index_is_rejected() {
        // response carries function index 0, parsed as getProtocolVersion
        let mut data = vec![0x11, 0x01, 0x00, 0x0D];
        data.resize(20, 0);
        assert!(GetProtocolVersionResponse::parse(&data).is_err());
    }
}
