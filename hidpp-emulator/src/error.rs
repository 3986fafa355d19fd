//! Emulator error types

use thiserror::Error;

use crate::keys::KeyId;

#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("Key {0:?} has no mapping for this backend")]
    UnmappedKey(KeyId),

    #[error("Displacement {0} outside 0..=40")]
    DisplacementOutOfRange(u8),

    #[error("Hardware driver fault: {0}")]
    Driver(String),

    #[error("Sequence did not complete in time")]
    Timeout,

    #[error("Sequencer worker is gone")]
    WorkerGone,

    #[error("Operation not supported in {0:?} mode")]
    WrongMode(crate::gtech::GtechMode),
}

pub type Result<T> = std::result::Result<T, EmulatorError>;
