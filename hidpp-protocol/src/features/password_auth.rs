//! Feature 0x1602: PasswordAuthentication.
//!
//! Session-scoped authentication gating the deactivatable manufacturing
//! features. Account names and password halves travel as fixed 16-byte
//! fields, NUL padded.

use crate::error::{ProtocolError, Result};
use crate::message::ReportId;
use crate::registry::{Feature, FunctionSpec, VersionTable};

use super::{payload_field, FeatureRequest, FeatureResponse};

pub const FEATURE_ID: u16 = 0x1602;

/// startSession response capability bits.
pub const FLAG_CONSTANT_CREDENTIALS: u8 = 0x01;
pub const FLAG_FULL_AUTHENTICATION: u8 = 0x02;
pub const FLAG_LONG_PASSWORD: u8 = 0x04;

pub fn feature() -> Feature {
    let long = |function_index, name| FunctionSpec {
        function_index,
        name,
        request_report: ReportId::Long,
        response_report: ReportId::Long,
    };
    Feature {
        id: FEATURE_ID,
        name: "PasswordAuthentication",
        versions: vec![VersionTable {
            version: 0,
            functions: vec![
                long(0, "startSession"),
                long(1, "endSession"),
                long(2, "passwd0"),
                long(3, "passwd1"),
            ],
            events: vec![],
            max_function_index: 3,
        }],
    }
}

/// Pack an ASCII account name into its fixed wire field.
pub fn account_bytes(name: &str) -> Result<[u8; 16]> {
    let raw = name.as_bytes();
    if raw.len() > 16 {
        return Err(ProtocolError::InvalidValue {
            field: "account_name".into(),
            reason: format!("{} bytes exceed the 16-byte field", raw.len()),
        });
    }
    let mut out = [0u8; 16];
    out[..raw.len()].copy_from_slice(raw);
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartSession {
    pub account_name: [u8; 16],
}

impl StartSession {
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self {
            account_name: account_bytes(name)?,
        })
    }
}

impl FeatureRequest for StartSession {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 0;
    const REPORT_ID: ReportId = ReportId::Long;

    fn payload(&self) -> Vec<u8> {
        self.account_name.to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartSessionResponse {
    pub flags: u8,
}

impl StartSessionResponse {
    /// Password is 32 bytes, delivered via passwd0 then passwd1.
    pub fn long_password(&self) -> bool {
        self.flags & FLAG_LONG_PASSWORD != 0
    }

    pub fn full_authentication(&self) -> bool {
        self.flags & FLAG_FULL_AUTHENTICATION != 0
    }

    pub fn constant_credentials(&self) -> bool {
        self.flags & FLAG_CONSTANT_CREDENTIALS != 0
    }
}

impl FeatureResponse for StartSessionResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 0;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            flags: payload_field(payload, 0)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndSession {
    pub account_name: [u8; 16],
}

impl EndSession {
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self {
            account_name: account_bytes(name)?,
        })
    }
}

impl FeatureRequest for EndSession {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 1;
    const REPORT_ID: ReportId = ReportId::Long;

    fn payload(&self) -> Vec<u8> {
        self.account_name.to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndSessionResponse;

impl FeatureResponse for EndSessionResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 1;

    fn from_payload(_payload: &[u8]) -> Result<Self> {
        Ok(Self)
    }
}

/// First (or only) 16-byte password half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passwd0 {
    pub password: [u8; 16],
}

impl FeatureRequest for Passwd0 {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 2;
    const REPORT_ID: ReportId = ReportId::Long;

    fn payload(&self) -> Vec<u8> {
        self.password.to_vec()
    }
}

/// Second half, only when startSession announced a long password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passwd1 {
    pub password: [u8; 16],
}

impl FeatureRequest for Passwd1 {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 3;
    const REPORT_ID: ReportId = ReportId::Long;

    fn payload(&self) -> Vec<u8> {
        self.password.to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswdResponse {
    pub status: u8,
}

impl PasswdResponse {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

impl FeatureResponse for PasswdResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 2;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            status: payload_field(payload, 0)?,
        })
    }
}

/// Same payload shape as [`PasswdResponse`] but echoing function 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Passwd1Response {
    pub status: u8,
}

impl Passwd1Response {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

impl FeatureResponse for Passwd1Response {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 3;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            status: payload_field(payload, 0)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_name_is_nul_padded() {
        let req = StartSession::new("x1E02_Manuf").unwrap();
        let report = req.build(0x04, 0x08, 0x0C).unwrap();
        assert_eq!(report.len(), 20);
        assert_eq!(&report[4..15], b"x1E02_Manuf");
        assert_eq!(&report[15..20], &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn oversized_account_name_is_rejected() {
        assert!(StartSession::new("this_name_is_far_too_long").is_err());
    }

    #[test]
    fn start_session_flags() {
        let mut data = vec![0x11, 0x04, 0x08, 0x0C];
        data.push(FLAG_LONG_PASSWORD | FLAG_FULL_AUTHENTICATION);
        data.resize(20, 0);
        let rsp = StartSessionResponse::parse(&data).unwrap();
        assert!(rsp.long_password());
        assert!(rsp.full_authentication());
        assert!(!rsp.constant_credentials());
    }

    #[test]
    fn passwd_status() {
        let mut data = vec![0x11, 0x04, 0x08, 0x2C, 0x00];
        data.resize(20, 0);
        assert!(PasswdResponse::parse(&data).unwrap().is_success());
        data[3] = 0x3C;
        data[4] = 0x01;
        assert!(!Passwd1Response::parse(&data).unwrap().is_success());
    }
}
