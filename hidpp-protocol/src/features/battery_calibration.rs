//! Feature 0x1861: BatteryLevelsCalibration.
//!
//! Manufacturing-line calibration of the battery gauge. Version 1 adds
//! battery source selection on multi-source hardware.

use crate::error::{ProtocolError, Result};
use crate::message::ReportId;
use crate::registry::{Feature, FunctionSpec, VersionTable};

use super::{payload_field, payload_u16, FeatureRequest, FeatureResponse};

pub const FEATURE_ID: u16 = 0x1861;

/// Wire capacity of the calibration point table.
pub const MAX_CALIBRATION_POINTS: usize = 7;

pub fn feature() -> Feature {
    let long_rsp = |function_index, name| FunctionSpec {
        function_index,
        name,
        request_report: ReportId::Short,
        response_report: ReportId::Long,
    };
    Feature {
        id: FEATURE_ID,
        name: "BatteryLevelsCalibration",
        versions: vec![
            VersionTable {
                version: 0,
                functions: vec![
                    long_rsp(0, "getBattCalibrationInfo"),
                    long_rsp(1, "measureBattery"),
                    FunctionSpec {
                        function_index: 2,
                        name: "storeCalibration",
                        request_report: ReportId::Long,
                        response_report: ReportId::Long,
                    },
                    long_rsp(3, "readCalibration"),
                    long_rsp(4, "cutOffControl"),
                ],
                events: vec![],
                max_function_index: 4,
            },
            VersionTable {
                version: 1,
                functions: vec![long_rsp(5, "setBatterySourceInfo")],
                events: vec![],
                max_function_index: 5,
            },
        ],
    }
}

/// Calibration point table shared by info/store/read payloads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CalibrationPoints {
    pub values: Vec<u16>,
}

impl CalibrationPoints {
    pub fn new(values: Vec<u16>) -> Result<Self> {
        if values.len() > MAX_CALIBRATION_POINTS {
            return Err(ProtocolError::InvalidValue {
                field: "calibration_points".into(),
                reason: format!(
                    "{} points exceed the table capacity of {MAX_CALIBRATION_POINTS}",
                    values.len()
                ),
            });
        }
        Ok(Self { values })
    }

    fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 2 * MAX_CALIBRATION_POINTS);
        out.push(self.values.len() as u8);
        for v in &self.values {
            out.extend_from_slice(&v.to_be_bytes());
        }
        out.resize(1 + 2 * MAX_CALIBRATION_POINTS, 0);
        out
    }

    fn from_wire(payload: &[u8]) -> Result<Self> {
        let count = payload_field(payload, 0)? as usize;
        if count > MAX_CALIBRATION_POINTS {
            return Err(ProtocolError::InvalidReport(format!(
                "calibration point count {count} exceeds {MAX_CALIBRATION_POINTS}"
            )));
        }
        let mut values = Vec::with_capacity(count);
        for i in 0..count {
            values.push(payload_u16(payload, 1 + 2 * i)?);
        }
        Ok(Self { values })
    }
}

// ====================================================================
// getBattCalibrationInfo / measureBattery
// ====================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetBattCalibrationInfo;

impl FeatureRequest for GetBattCalibrationInfo {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 0;
    const REPORT_ID: ReportId = ReportId::Short;

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// Required point count and the voltage each point must be taken at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBattCalibrationInfoResponse {
    pub points: CalibrationPoints,
}

impl FeatureResponse for GetBattCalibrationInfoResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 0;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            points: CalibrationPoints::from_wire(payload)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasureBattery;

impl FeatureRequest for MeasureBattery {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 1;
    const REPORT_ID: ReportId = ReportId::Short;

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasureBatteryResponse {
    /// Millivolts.
    pub voltage: u16,
}

impl FeatureResponse for MeasureBatteryResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 1;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            voltage: payload_u16(payload, 0)?,
        })
    }
}

// ====================================================================
// storeCalibration / readCalibration
// ====================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCalibration {
    pub points: CalibrationPoints,
}

impl FeatureRequest for StoreCalibration {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 2;
    const REPORT_ID: ReportId = ReportId::Long;

    fn payload(&self) -> Vec<u8> {
        self.points.to_wire()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCalibrationResponse {
    /// Device echoes the stored table.
    pub points: CalibrationPoints,
}

impl FeatureResponse for StoreCalibrationResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 2;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            points: CalibrationPoints::from_wire(payload)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCalibration;

impl FeatureRequest for ReadCalibration {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 3;
    const REPORT_ID: ReportId = ReportId::Short;

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCalibrationResponse {
    pub points: CalibrationPoints,
}

impl FeatureResponse for ReadCalibrationResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 3;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            points: CalibrationPoints::from_wire(payload)?,
        })
    }
}

// ====================================================================
// cutOffControl / setBatterySourceInfo
// ====================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutOffControl {
    pub change_state_requested: bool,
    pub desired_state: bool,
}

impl FeatureRequest for CutOffControl {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 4;
    const REPORT_ID: ReportId = ReportId::Short;

    fn payload(&self) -> Vec<u8> {
        let mut ctrl = 0u8;
        if self.desired_state {
            ctrl |= 0x01;
        }
        if self.change_state_requested {
            ctrl |= 0x02;
        }
        vec![ctrl]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutOffControlResponse {
    pub cutoff_enabled: bool,
}

impl FeatureResponse for CutOffControlResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 4;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            cutoff_enabled: payload_field(payload, 0)? & 0x01 != 0,
        })
    }
}

/// Version 1 only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetBatterySourceInfo {
    pub battery_source_index: u8,
}

impl FeatureRequest for SetBatterySourceInfo {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 5;
    const REPORT_ID: ReportId = ReportId::Short;

    fn payload(&self) -> Vec<u8> {
        vec![self.battery_source_index]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetBatterySourceInfoResponse {
    pub battery_source_index: u8,
}

impl FeatureResponse for SetBatterySourceInfoResponse {
    const FEATURE_ID: u16 = FEATURE_ID;
    const FUNCTION_INDEX: u8 = 5;

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            battery_source_index: payload_field(payload, 0)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FeatureRegistry;

    #[test]
    fn version_gating_of_battery_source() {
        let reg = FeatureRegistry::builtin();
        let v0 = reg.create(FEATURE_ID, 0).unwrap();
        assert_eq!(v0.max_function_index, 4);
        assert!(v0.function(5).is_none());

        let v1 = reg.create(FEATURE_ID, 1).unwrap();
        assert_eq!(v1.max_function_index, 5);
        assert_eq!(v1.function(5).unwrap().name, "setBatterySourceInfo");
        // inherited from v0
        assert_eq!(v1.function(2).unwrap().request_report, ReportId::Long);
    }

    #[test]
    fn store_payload_pads_unused_points() {
        let req = StoreCalibration {
            points: CalibrationPoints::new(vec![0x0FA0, 0x0FD2]).unwrap(),
        };
        let payload = req.payload();
        assert_eq!(payload.len(), 15);
        assert_eq!(&payload[..5], &[2, 0x0F, 0xA0, 0x0F, 0xD2]);
        assert!(payload[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn read_rejects_overlong_count() {
        let mut data = vec![0x11, 0x01, 0x09, 0x3D, 8];
        data.resize(20, 0);
        assert!(ReadCalibrationResponse::parse(&data).is_err());
    }

    #[test]
    fn cutoff_control_bits() {
        let req = CutOffControl {
            change_state_requested: true,
            desired_state: false,
        };
        assert_eq!(req.payload(), vec![0x02]);

        let mut data = vec![0x11, 0x01, 0x09, 0x4D, 0x01];
        data.resize(20, 0);
        assert!(CutOffControlResponse::parse(&data).unwrap().cutoff_enabled);
    }

    #[test]
    fn measure_battery_voltage() {
        let mut data = vec![0x11, 0x01, 0x09, 0x1D, 0x0F, 0xA0];
        data.resize(20, 0);
        assert_eq!(MeasureBatteryResponse::parse(&data).unwrap().voltage, 4000);
    }

    #[test]
    fn point_table_capacity() {
        assert!(CalibrationPoints::new(vec![0; 7]).is_ok());
        assert!(CalibrationPoints::new(vec![0; 8]).is_err());
    }
}
