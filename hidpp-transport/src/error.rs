//! Transport error types

use hidpp_protocol::{Hidpp2ErrorCode, ProtocolError};
use thiserror::Error;

/// Errors that can occur during transport operations
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Communication timeout")]
    Timeout,

    /// The queue backing a pending get was closed (channel unplug).
    #[error("Operation cancelled")]
    Cancelled,

    /// The physical transport went away mid-operation, as opposed to a
    /// device that merely stayed silent.
    #[error("Transport lost")]
    TransportLost,

    /// The device answered with a HID++ 2.0 error report.
    #[error("Device error {error_code:?} on feature index {feature_index}, function {function_index}")]
    Device {
        error_code: Hidpp2ErrorCode,
        feature_index: u8,
        function_index: u8,
    },

    #[error("Codec error: {0}")]
    Protocol(#[from] ProtocolError),

    // HID-specific errors
    #[error("HID error: {0}")]
    HidError(String),

    #[error("HID permission denied: {0}")]
    HidPermissionDenied(String),

    // BLE stack bridge
    #[error("BLE stack failure: {0}")]
    BleCritical(String),

    #[error("BLE request rejected: {0}")]
    BleArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<hidapi::HidError> for TransportError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") {
            TransportError::HidPermissionDenied(msg)
        } else {
            TransportError::HidError(msg)
        }
    }
}
