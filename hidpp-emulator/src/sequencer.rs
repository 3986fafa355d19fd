//! Batched key sequences over the Gtech matrix.
//!
//! Online, every instruction hits the FPGA as it is issued. Offline,
//! instructions accumulate and `play_sequence` hands the whole batch to
//! a worker thread that loads all levels first and applies them with a
//! single update, so multi-key chords land in the same scan cycle.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{EmulatorError, Result};
use crate::gtech::{FpgaDriver, GtechMatrix};
use crate::keys::KeyId;

/// One instruction of a key sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStep {
    /// Move one key to `level`.
    Displacement { key: KeyId, level: u8 },
    /// Hold the current matrix state.
    Wait(Duration),
    /// Zero the whole matrix.
    ReleaseAll,
}

struct Job {
    steps: Vec<SequenceStep>,
    done: mpsc::Sender<Result<()>>,
}

/// Sequencing facade over one [`GtechMatrix`].
pub struct Sequencer<D: FpgaDriver + 'static> {
    matrix: Arc<GtechMatrix<D>>,
    offline: Mutex<bool>,
    pending: Mutex<Vec<SequenceStep>>,
    jobs: mpsc::Sender<Job>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<D: FpgaDriver + 'static> Sequencer<D> {
    pub fn new(matrix: Arc<GtechMatrix<D>>) -> Self {
        let (jobs, rx) = mpsc::channel::<Job>();
        let worker_matrix = matrix.clone();
        let worker = thread::Builder::new()
            .name("matrix-sequencer".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    let result = run_steps(&worker_matrix, &job.steps);
                    if job.done.send(result).is_err() {
                        warn!("sequence result dropped, caller timed out");
                    }
                }
            })
            .ok();
        Self {
            matrix,
            offline: Mutex::new(false),
            pending: Mutex::new(Vec::new()),
            jobs,
            worker: Mutex::new(worker),
        }
    }

    pub fn matrix(&self) -> &GtechMatrix<D> {
        &self.matrix
    }

    /// Start batching; instructions are held until `play_sequence`.
    pub fn begin_offline(&self) {
        *self.offline.lock() = true;
    }

    /// Move one key, immediately or into the current batch.
    pub fn key_displacement(&self, key: KeyId, level: u8) -> Result<()> {
        if *self.offline.lock() {
            self.pending
                .lock()
                .push(SequenceStep::Displacement { key, level });
            return Ok(());
        }
        self.matrix.key_displacement(key, level, false)
    }

    /// Insert a hold into the current batch.
    pub fn wait(&self, duration: Duration) -> Result<()> {
        if *self.offline.lock() {
            self.pending.lock().push(SequenceStep::Wait(duration));
            return Ok(());
        }
        thread::sleep(duration);
        Ok(())
    }

    /// Zero the matrix, immediately or into the current batch.
    pub fn release_all(&self) -> Result<()> {
        if *self.offline.lock() {
            self.pending.lock().push(SequenceStep::ReleaseAll);
            return Ok(());
        }
        self.matrix.release_all()
    }

    /// Flush the batch and block until the worker has played it.
    ///
    /// Leaves offline mode whether or not the sequence completed.
    pub fn play_sequence(&self, timeout: Duration) -> Result<()> {
        let steps = {
            *self.offline.lock() = false;
            std::mem::take(&mut *self.pending.lock())
        };
        if steps.is_empty() {
            return Ok(());
        }
        debug!(steps = steps.len(), "playing sequence");
        let (done, done_rx) = mpsc::channel();
        self.jobs
            .send(Job { steps, done })
            .map_err(|_| EmulatorError::WorkerGone)?;
        match done_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(EmulatorError::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(EmulatorError::WorkerGone),
        }
    }
}

impl<D: FpgaDriver + 'static> Drop for Sequencer<D> {
    fn drop(&mut self) {
        // closing the job channel stops the worker loop
        let (orphan, _) = mpsc::channel();
        drop(std::mem::replace(&mut self.jobs, orphan));
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Load every displacement of a run without updating, then apply them
/// together at the run's end.
fn run_steps<D: FpgaDriver>(matrix: &GtechMatrix<D>, steps: &[SequenceStep]) -> Result<()> {
    let mut loaded = false;
    for step in steps {
        match *step {
            SequenceStep::Displacement { key, level } => {
                matrix.key_displacement(key, level, true)?;
                loaded = true;
            }
            SequenceStep::Wait(duration) => {
                if loaded {
                    matrix.flush()?;
                    loaded = false;
                }
                thread::sleep(duration);
            }
            SequenceStep::ReleaseAll => {
                matrix.release_all()?;
                loaded = false;
            }
        }
    }
    if loaded {
        matrix.flush()?;
    }
    Ok(())
}
