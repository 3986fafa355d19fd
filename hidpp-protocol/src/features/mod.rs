//! Built-in feature implementations.
//!
//! Each module owns one feature id: its registry entry (version tables)
//! plus typed request/response structs for the functions the harness
//! drives. Requests know their own report shape and function index, so
//! callers only supply addressing.

use crate::error::{ProtocolError, Result};
use crate::message::{Header, ReportId};
use crate::registry::Feature;

pub mod battery_calibration;
pub mod contextual_display;
pub mod deactivatable_features;
pub mod device_name;
pub mod feature_set;
pub mod password_auth;
pub mod root;

/// A typed request for one feature function.
pub trait FeatureRequest {
    const FEATURE_ID: u16;
    const FUNCTION_INDEX: u8;
    const REPORT_ID: ReportId;

    /// Payload bytes after the 4-byte header. May be shorter than the
    /// report payload; the remainder is zero padding.
    fn payload(&self) -> Vec<u8>;

    /// Serialize a full report addressed to `device_index`, using the
    /// feature index resolved at runtime via the root feature.
    fn build(&self, device_index: u8, feature_index: u8, software_id: u8) -> Result<Vec<u8>> {
        let header = Header::new(
            Self::REPORT_ID,
            device_index,
            feature_index,
            Self::FUNCTION_INDEX,
            software_id,
        );
        let payload = self.payload();
        if payload.len() > Self::REPORT_ID.payload_size() {
            return Err(ProtocolError::InvalidReport(format!(
                "payload {} bytes exceeds {:?} capacity",
                payload.len(),
                Self::REPORT_ID
            )));
        }
        let mut out = vec![0u8; Self::REPORT_ID.size()];
        out[..4].copy_from_slice(&header.to_bytes());
        out[4..4 + payload.len()].copy_from_slice(&payload);
        Ok(out)
    }
}

/// A typed response for one feature function.
pub trait FeatureResponse: Sized {
    const FEATURE_ID: u16;
    const FUNCTION_INDEX: u8;

    /// Decode from the payload after the 4-byte header.
    fn from_payload(payload: &[u8]) -> Result<Self>;

    /// Decode a full report, checking the echoed function index.
    fn parse(data: &[u8]) -> Result<Self> {
        let header = Header::parse(data)?;
        if header.function_index != Self::FUNCTION_INDEX {
            return Err(ProtocolError::InvalidReport(format!(
                "function index {} does not match expected {}",
                header.function_index,
                Self::FUNCTION_INDEX
            )));
        }
        Self::from_payload(&data[4..])
    }
}

pub(crate) fn payload_field(payload: &[u8], index: usize) -> Result<u8> {
    payload.get(index).copied().ok_or_else(|| {
        ProtocolError::InvalidReport(format!("payload shorter than {} bytes", index + 1))
    })
}

pub(crate) fn payload_u16(payload: &[u8], index: usize) -> Result<u16> {
    let hi = payload_field(payload, index)?;
    let lo = payload_field(payload, index + 1)?;
    Ok(u16::from_be_bytes([hi, lo]))
}

/// Every built-in feature, for [`crate::registry::FeatureRegistry::builtin`].
pub fn all() -> Vec<Feature> {
    vec![
        root::feature(),
        feature_set::feature(),
        device_name::feature(),
        password_auth::feature(),
        battery_calibration::feature(),
        deactivatable_features::feature(),
        contextual_display::feature(),
    ]
}
