//! Feature 0x0001: FeatureSet.
//!
//! Enumerates the device's feature table by index.

use crate::error::Result;
use crate::message::ReportId;
use crate::registry::{Feature, FunctionSpec, VersionTable};

use super::{payload_field, payload_u16, FeatureRequest, FeatureResponse};

pub const FEATURE_ID: u16 = 0x0001;

pub fn feature() -> Feature {
    Feature {
        id: FEATURE_ID,
        name: "FeatureSet",
        versions: vec![
            VersionTable {
                version: 0,
                functions: vec![
                    FunctionSpec {
                        function_index: 0,
                        name: "getCount",
                        request_report: ReportId::Short,
                        response_report: ReportId::Long,
                    },
                    FunctionSpec {
                        function_index: 1,
                        name: "getFeatureId",
                        request_report: ReportId::Short,
                        response_report: ReportId::Long,
                    },
                ],
                events: vec![],
                max_function_index: 1,
            },
            // v1 adds the feature version byte to getFeatureId
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetCount;

impl FeatureRequest for GetCount {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 0;
    const REPORT_ID: ReportId = ReportId::Short;

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// Count excludes the root feature at index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetCountResponse {
    pub count: u8,
}

impl FeatureResponse for GetCountResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 0;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            count: payload_field(payload, 0)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetFeatureId {
    pub feature_index: u8,
}

impl FeatureRequest for GetFeatureId {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 1;
    const REPORT_ID: ReportId = ReportId::Short;

    fn payload(&self) -> Vec<u8> {
        vec![self.feature_index]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetFeatureIdResponse {
    pub feature_id: u16,
    pub flags: u8,
    /// Only meaningful from version 1 on; zero on v0 devices.
    pub version: u8,
}

impl FeatureResponse for GetFeatureIdResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 1;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            feature_id: payload_u16(payload, 0)?,
            flags: payload_field(payload, 2)?,
            version: payload_field(payload, 3)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::root::{FLAG_ENGINEERING, FLAG_HIDDEN};

    #[test]
    fn enumeration_layout() {
        let report = GetFeatureId { feature_index: 3 }.build(0x02, 0x01, 0x0F).unwrap();
        assert_eq!(&report[..5], &[0x10, 0x02, 0x01, 0x1F, 0x03]);

        let mut data = vec![0x11, 0x02, 0x01, 0x1F];
        data.extend_from_slice(&[0x1E, 0x02, FLAG_HIDDEN | FLAG_ENGINEERING, 0x00]);
        data.resize(20, 0);
        let rsp = GetFeatureIdResponse::parse(&data).unwrap();
        assert_eq!(rsp.feature_id, 0x1E02);
        assert_eq!(rsp.flags, 0x60);
    }

    #[test]
    fn count_decodes() {
        let mut data = vec![0x11, 0x02, 0x01, 0x0F, 0x22];
        data.resize(20, 0);
        assert_eq!(GetCountResponse::parse(&data).unwrap().count, 0x22);
    }
}
