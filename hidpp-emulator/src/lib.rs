//! Key-matrix emulation for driving HID peripherals under test
//!
//! Two hardware backends sit behind small driver traits:
//!
//! - [`crosspoint`]: a 16x24 analog crosspoint IC closing row/column
//!   intersections of a legacy matrix board
//! - [`gtech`]: the Kosmos FPGA emulating Gtech digital lane masks and
//!   analog Hall-effect displacement levels
//!
//! [`sequencer`] batches instructions so multi-key chords reach the
//! matrix in one update.

pub mod crosspoint;
pub mod error;
pub mod gtech;
pub mod keys;
pub mod sequencer;

pub use crosspoint::{CrosspointDriver, CrosspointMatrix, KeyAction};
pub use error::{EmulatorError, Result};
pub use gtech::{FpgaDriver, GtechMatrix, GtechMode, MAX_DISPLACEMENT};
pub use keys::{CrosspointAddr, KeyId, ALL_KEYS};
pub use sequencer::{SequenceStep, Sequencer};
