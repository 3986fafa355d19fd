//! Protocol error types

use thiserror::Error;

/// Errors raised by the codec layers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Bit range {start}..{end} out of bounds (length {len} bits)")]
    OutOfRange { start: usize, end: usize, len: usize },

    #[error("Value 0x{value:X} does not fit in {width} bits")]
    Overflow { value: u64, width: usize },

    #[error("Value {value} outside range {min}..={max}")]
    ValueOutOfRange { value: i64, min: i64, max: i64 },

    #[error("Invalid hex string: {0}")]
    InvalidHex(String),

    #[error("Invalid TLV: {0}")]
    InvalidTlv(&'static str),

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid report: {0}")]
    InvalidReport(String),

    #[error("Feature 0x{feature_id:04X} has no version {version}")]
    UnsupportedVersion { feature_id: u16, version: u8 },

    #[error("VLP sequence error: expected seqn {expected}, got {got}")]
    SequenceError { expected: u16, got: u16 },

    #[error("VLP payload exceeds transfer buffer size ({size} > {limit})")]
    OutOfMemory { size: usize, limit: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
