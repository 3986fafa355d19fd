//! Gtech FPGA matrix backend.
//!
//! The Kosmos FPGA emulates the key matrix of Gtech boards in two
//! modes. Digital mode drives dense per-address lane masks, one bit per
//! key; analog mode drives per-key Hall-effect displacement levels.
//!
//! Address derivation from a key's chain id:
//!
//! - digital: `addr = chain / 12`, `bank = (chain / 6) % 2`,
//!   `lane = chain % 6`
//! - analog: `addr = chain >> 1`, `bank = chain & 1`, `lane = 0`

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{EmulatorError, Result};
use crate::keys::KeyId;

/// Full travel of an analog key.
pub const MAX_DISPLACEMENT: u8 = 40;

/// Dense digital addresses 0..7 are always populated; address 7 varies
/// with the layout and anything above is zero.
pub const DIGITAL_ADDR_COUNT: usize = 8;

const LANE_MASK: u8 = 0x3F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GtechMode {
    Digital,
    Analog,
}

/// FPGA command vocabulary for the matrix block.
pub trait FpgaDriver: Send {
    /// Load one 6-bit lane mask at `(bank, addr)`.
    fn write_lane_mask(&mut self, bank: u8, addr: u8, mask: u8) -> Result<()>;
    /// Load one displacement level at `(bank, addr)`.
    fn write_displacement(&mut self, bank: u8, addr: u8, level: u8) -> Result<()>;
    /// Tell the FPGA to apply every loaded value to the emulated matrix.
    fn send_update(&mut self) -> Result<()>;
    /// Zero the whole matrix. Returns without waiting for the FPGA.
    fn reset_matrix(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DigitalAddr {
    bank: u8,
    lane: u8,
    addr: u8,
}

fn digital_addr(chain: u16) -> DigitalAddr {
    DigitalAddr {
        bank: ((chain / 6) % 2) as u8,
        lane: (chain % 6) as u8,
        addr: (chain / 12) as u8,
    }
}

fn analog_addr(chain: u16) -> (u8, u8) {
    ((chain & 1) as u8, (chain >> 1) as u8)
}

struct MatrixState {
    /// Digital lane masks, banks 0 and 1.
    banks: [Vec<u8>; 2],
    /// Analog displacement per `(bank, addr)`, absent means released.
    displacement: HashMap<(u8, u8), u8>,
}

/// Gtech matrix emulator over one FPGA driver.
pub struct GtechMatrix<D> {
    mode: GtechMode,
    driver: Mutex<D>,
    state: Mutex<MatrixState>,
}

impl<D: FpgaDriver> GtechMatrix<D> {
    pub fn new(driver: D, mode: GtechMode) -> Self {
        let addr_count = match mode {
            GtechMode::Digital => DIGITAL_ADDR_COUNT,
            GtechMode::Analog => 0,
        };
        Self {
            mode,
            driver: Mutex::new(driver),
            state: Mutex::new(MatrixState {
                banks: [vec![0; addr_count], vec![0; addr_count]],
                displacement: HashMap::new(),
            }),
        }
    }

    pub fn mode(&self) -> GtechMode {
        self.mode
    }

    /// Close or open one key in digital mode.
    pub fn set_key(&self, id: KeyId, pressed: bool) -> Result<()> {
        if self.mode != GtechMode::Digital {
            return Err(EmulatorError::WrongMode(self.mode));
        }
        let DigitalAddr { bank, lane, addr } = digital_addr(id.chain_id());
        if addr as usize >= DIGITAL_ADDR_COUNT {
            return Err(EmulatorError::UnmappedKey(id));
        }
        let mask = {
            let mut state = self.state.lock();
            let slot = &mut state.banks[bank as usize][addr as usize];
            if pressed {
                *slot |= 1 << lane;
            } else {
                *slot &= !(1 << lane);
            }
            *slot & LANE_MASK
        };
        debug!(?id, bank, addr, mask, "digital lane mask");
        let mut driver = self.driver.lock();
        driver.write_lane_mask(bank, addr, mask)?;
        driver.send_update()
    }

    /// Set one key's displacement in analog mode.
    ///
    /// With `update_only` the level is loaded but not applied; a later
    /// call without it flushes the accumulated set in one update.
    pub fn key_displacement(&self, id: KeyId, level: u8, update_only: bool) -> Result<()> {
        if self.mode != GtechMode::Analog {
            return Err(EmulatorError::WrongMode(self.mode));
        }
        if level > MAX_DISPLACEMENT {
            return Err(EmulatorError::DisplacementOutOfRange(level));
        }
        let (bank, addr) = analog_addr(id.chain_id());
        {
            let mut state = self.state.lock();
            if level == 0 {
                state.displacement.remove(&(bank, addr));
            } else {
                state.displacement.insert((bank, addr), level);
            }
        }
        debug!(?id, bank, addr, level, update_only, "analog displacement");
        let mut driver = self.driver.lock();
        driver.write_displacement(bank, addr, level)?;
        if !update_only {
            driver.send_update()?;
        }
        Ok(())
    }

    /// Apply every level loaded with `update_only` in one update.
    pub fn flush(&self) -> Result<()> {
        self.driver.lock().send_update()
    }

    /// Zero the matrix in either mode without blocking on the FPGA.
    pub fn release_all(&self) -> Result<()> {
        debug!("matrix reset");
        {
            let mut state = self.state.lock();
            for bank in &mut state.banks {
                bank.fill(0);
            }
            state.displacement.clear();
        }
        self.driver.lock().reset_matrix()
    }

    /// Shadow displacement of one key, 0 when released.
    pub fn displacement(&self, id: KeyId) -> u8 {
        let (bank, addr) = analog_addr(id.chain_id());
        self.state
            .lock()
            .displacement
            .get(&(bank, addr))
            .copied()
            .unwrap_or(0)
    }

    pub fn pressed_count(&self) -> usize {
        let state = self.state.lock();
        match self.mode {
            GtechMode::Analog => state.displacement.len(),
            GtechMode::Digital => state
                .banks
                .iter()
                .flatten()
                .map(|m| m.count_ones() as usize)
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingFpga {
        masks: HashMap<(u8, u8), u8>,
        levels: HashMap<(u8, u8), u8>,
        updates: usize,
        resets: usize,
    }

    impl FpgaDriver for RecordingFpga {
        fn write_lane_mask(&mut self, bank: u8, addr: u8, mask: u8) -> Result<()> {
            self.masks.insert((bank, addr), mask);
            Ok(())
        }
        fn write_displacement(&mut self, bank: u8, addr: u8, level: u8) -> Result<()> {
            self.levels.insert((bank, addr), level);
            Ok(())
        }
        fn send_update(&mut self) -> Result<()> {
            self.updates += 1;
            Ok(())
        }
        fn reset_matrix(&mut self) -> Result<()> {
            self.masks.clear();
            self.levels.clear();
            self.resets += 1;
            Ok(())
        }
    }

    #[test]
    fn digital_address_derivation() {
        // chain 13: addr 1, bank 0, lane 1
        assert_eq!(
            digital_addr(13),
            DigitalAddr {
                bank: 0,
                lane: 1,
                addr: 1
            }
        );
        // chain 7: addr 0, bank 1, lane 1
        assert_eq!(
            digital_addr(7),
            DigitalAddr {
                bank: 1,
                lane: 1,
                addr: 0
            }
        );
    }

    #[test]
    fn digital_masks_accumulate_per_address() {
        let matrix = GtechMatrix::new(RecordingFpga::default(), GtechMode::Digital);
        // Escape (chain 0) and F1 (chain 1) share bank 0, addr 0
        matrix.set_key(KeyId::Escape, true).unwrap();
        matrix.set_key(KeyId::F1, true).unwrap();
        assert_eq!(matrix.driver.lock().masks[&(0, 0)], 0b11);
        matrix.set_key(KeyId::Escape, false).unwrap();
        assert_eq!(matrix.driver.lock().masks[&(0, 0)], 0b10);
        assert_eq!(matrix.pressed_count(), 1);
    }

    #[test]
    fn analog_update_only_defers_the_flush() {
        let matrix = GtechMatrix::new(RecordingFpga::default(), GtechMode::Analog);
        matrix.key_displacement(KeyId::A, 25, true).unwrap();
        matrix.key_displacement(KeyId::S, 30, true).unwrap();
        assert_eq!(matrix.driver.lock().updates, 0);
        matrix.key_displacement(KeyId::D, 40, false).unwrap();
        assert_eq!(matrix.driver.lock().updates, 1);
        assert_eq!(matrix.displacement(KeyId::S), 30);
    }

    #[test]
    fn displacement_range_is_checked() {
        let matrix = GtechMatrix::new(RecordingFpga::default(), GtechMode::Analog);
        assert!(matches!(
            matrix.key_displacement(KeyId::A, 41, false),
            Err(EmulatorError::DisplacementOutOfRange(41))
        ));
    }

    #[test]
    fn mode_mismatch_is_rejected() {
        let matrix = GtechMatrix::new(RecordingFpga::default(), GtechMode::Digital);
        assert!(matches!(
            matrix.key_displacement(KeyId::A, 10, false),
            Err(EmulatorError::WrongMode(GtechMode::Digital))
        ));
    }
}
