//! Matrix-wide release behavior over a recorded FPGA.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use hidpp_emulator::{
    FpgaDriver, GtechMatrix, GtechMode, KeyId, Result, Sequencer, ALL_KEYS, MAX_DISPLACEMENT,
};

/// What the FPGA would report back for the emulated matrix.
#[derive(Default)]
struct FpgaShadow {
    levels: HashMap<(u8, u8), u8>,
    updates: usize,
}

#[derive(Clone, Default)]
struct RecordingFpga {
    shadow: Arc<Mutex<FpgaShadow>>,
}

impl FpgaDriver for RecordingFpga {
    fn write_lane_mask(&mut self, _bank: u8, _addr: u8, _mask: u8) -> Result<()> {
        Ok(())
    }

    fn write_displacement(&mut self, bank: u8, addr: u8, level: u8) -> Result<()> {
        self.shadow.lock().levels.insert((bank, addr), level);
        Ok(())
    }

    fn send_update(&mut self) -> Result<()> {
        self.shadow.lock().updates += 1;
        Ok(())
    }

    fn reset_matrix(&mut self) -> Result<()> {
        let mut shadow = self.shadow.lock();
        for level in shadow.levels.values_mut() {
            *level = 0;
        }
        Ok(())
    }
}

fn spread_keys(count: usize) -> Vec<KeyId> {
    ALL_KEYS.iter().step_by(7).take(count).copied().collect()
}

#[test]
fn release_all_zeroes_every_key_quickly() {
    let driver = RecordingFpga::default();
    let shadow = driver.shadow.clone();
    let matrix = GtechMatrix::new(driver, GtechMode::Analog);

    let keys = spread_keys(10);
    assert_eq!(keys.len(), 10);
    for &key in &keys {
        matrix.key_displacement(key, MAX_DISPLACEMENT, false).unwrap();
    }
    assert_eq!(matrix.pressed_count(), 10);

    let start = Instant::now();
    matrix.release_all().unwrap();
    assert!(start.elapsed() < Duration::from_millis(200));

    let report = shadow.lock();
    assert!(report.levels.values().all(|&level| level == 0));
    drop(report);
    assert_eq!(matrix.pressed_count(), 0);
    for &key in &keys {
        assert_eq!(matrix.displacement(key), 0);
    }
}

#[test]
fn batched_chord_reaches_the_fpga_in_one_update() {
    let driver = RecordingFpga::default();
    let shadow = driver.shadow.clone();
    let seq = Sequencer::new(Arc::new(GtechMatrix::new(driver, GtechMode::Analog)));

    seq.begin_offline();
    for key in [KeyId::LeftCtrl, KeyId::LeftShift, KeyId::Escape] {
        seq.key_displacement(key, MAX_DISPLACEMENT).unwrap();
    }
    assert_eq!(shadow.lock().updates, 0);
    seq.play_sequence(Duration::from_secs(1)).unwrap();

    let report = shadow.lock();
    assert_eq!(report.updates, 1);
    assert_eq!(report.levels.len(), 3);
    assert!(report.levels.values().all(|&level| level == MAX_DISPLACEMENT));
}
