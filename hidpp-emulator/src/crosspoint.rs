//! Legacy crosspoint matrix backend.
//!
//! A 16x24 analog crosspoint IC synthesizes key presses by closing
//! row/column intersections. The board is driven through a small GPIO
//! vocabulary: address the intersection, set the state bit, pulse the
//! strobe. A dedicated reset line opens every intersection at once.

use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::keys::{CrosspointAddr, KeyId};

/// Press or release, as seen by the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Make,
    Break,
}

/// GPIO command vocabulary of the crosspoint board.
///
/// Implementations talk to real hardware; tests record the calls.
pub trait CrosspointDriver: Send {
    /// Drive the chip-select line for one IC.
    fn select(&mut self, cs_index: u8, enabled: bool) -> Result<()>;
    /// Latch a 5-bit row, 5-bit column and the open/closed bit.
    fn set_address(&mut self, row: u8, col: u8, closed: bool) -> Result<()>;
    /// Pulse the strobe to commit the latched address.
    fn strobe(&mut self) -> Result<()>;
    /// Assert the reset line, opening every intersection.
    fn reset(&mut self) -> Result<()>;
}

/// Crosspoint matrix with a shadow of the currently closed contacts.
pub struct CrosspointMatrix<D> {
    driver: Mutex<D>,
    closed: Mutex<HashSet<(u8, u8, u8)>>,
}

impl<D: CrosspointDriver> CrosspointMatrix<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver: Mutex::new(driver),
            closed: Mutex::new(HashSet::new()),
        }
    }

    /// Close or open the intersection mapped to `id`.
    pub fn set_key(&self, id: KeyId, action: KeyAction) -> Result<()> {
        let CrosspointAddr { cs_index, row, col } = id.crosspoint();
        let closed = action == KeyAction::Make;
        debug!(?id, row, col, closed, "crosspoint set");
        {
            let mut driver = self.driver.lock();
            driver.select(cs_index, true)?;
            driver.set_address(row, col, closed)?;
            driver.strobe()?;
            driver.select(cs_index, false)?;
        }
        let mut shadow = self.closed.lock();
        if closed {
            shadow.insert((cs_index, row, col));
        } else {
            shadow.remove(&(cs_index, row, col));
        }
        Ok(())
    }

    /// Open every intersection through the reset line.
    pub fn release_all(&self) -> Result<()> {
        debug!("crosspoint reset");
        self.driver.lock().reset()?;
        self.closed.lock().clear();
        Ok(())
    }

    /// Whether the shadow state holds `id` closed.
    pub fn is_pressed(&self, id: KeyId) -> bool {
        let CrosspointAddr { cs_index, row, col } = id.crosspoint();
        self.closed.lock().contains(&(cs_index, row, col))
    }

    pub fn pressed_count(&self) -> usize {
        self.closed.lock().len()
    }
}
