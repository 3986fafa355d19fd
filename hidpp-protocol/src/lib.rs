//! HID++ 2.0 / VLP 1.0 protocol codec
//!
//! This crate is the wire layer of the peripheral test harness:
//!
//! - Bit-packed primitives, hex buffers and TLV triplets
//! - Declarative field schemas and the report message model
//! - The feature registry with version-bound facades and typed
//!   request/response pairs for the built-in features
//! - VLP fragmentation for multi-frame transfers
//! - A USB HID report descriptor parser for non-HID++ reports
//! - Authentication session bookkeeping for gated features
//!
//! Bit-ordering contract: bit 0 of any field is the most significant
//! bit of its first byte. HID++ payload integers are big-endian; HID
//! report fields wider than one byte are little-endian on the wire and
//! byte-reversed at the codec boundary.

pub mod bits;
pub mod descriptor;
pub mod error;
pub mod features;
pub mod field;
pub mod hex;
pub mod message;
pub mod password;
pub mod registry;
pub mod tlv;
pub mod vlp;

pub use bits::{BitVec, Endian};
pub use error::{ProtocolError, Result};
pub use features::{FeatureRequest, FeatureResponse};
pub use field::{Check, FieldDesc, FieldValue, Schema};
pub use hex::HexBuf;
pub use message::{
    ErrorReport, Header, Hidpp2ErrorCode, Message, MsgType, ReportId,
    TRANSCEIVER_DEVICE_INDEX,
};
pub use registry::{EventSpec, Feature, FeatureFacade, FeatureRegistry, FunctionSpec};
pub use tlv::{Tlv, TlvMode};
pub use vlp::{Fragmenter, Reassembler, VlpFrame};
