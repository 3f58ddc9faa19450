//! The acquisition loop: acquire -> reduce -> classify or record -> alert
//!
//! [`Monitor`] holds all per-run state and is driven one block at a time.
//! [`run_session`] pulls blocks from a [`BlockSource`] until the source is
//! exhausted, the running flag clears or a device error occurs, and
//! [`run_persisted`] wraps any such run so the model store is written on
//! every exit path.

use crossbeam_channel::{Receiver, TryRecvError};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::acquisition::{Block, BlockSource, BlockTiming};
use crate::alert::{AlertGate, AlertSink};
use crate::analysis::{classify, rms, Classification, SignalReducer};
use crate::calibration::{CalibrationController, Command, RecordingOutcome, RunMode, Transition};
use crate::config::{AcquisitionConfig, Config};
use crate::error::{CalibrationError, Result};
use crate::store::ModelStore;

/// State published after every block
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Blocks processed so far, including this one
    pub iteration: u64,
    /// Milliseconds since the monitor was created
    pub elapsed_ms: i64,
    pub mode: RunMode,
    /// RMS of channel B for this block alone
    pub raw: f64,
    /// RMS of channel A for this block
    pub reference: f64,
    /// Moving average of channel B RMS
    pub smoothed: f64,
    /// Classifier output; `None` while recording
    pub classification: Option<Classification>,
    /// Values in the recording buffer
    pub recorded: usize,
    pub alert: bool,
    pub reduced_history: Vec<f64>,
    pub running_average: Vec<f64>,
}

impl Snapshot {
    pub fn label(&self) -> &str {
        match self.classification {
            Some(ref c) => c.label(),
            None => "---",
        }
    }
}

/// Single-threaded owner of the reducer, controller, store and alert gate
pub struct Monitor {
    reducer: SignalReducer,
    controller: CalibrationController,
    store: ModelStore,
    gate: AlertGate,
    iteration: u64,
    started: Instant,
}

impl Monitor {
    pub fn new(config: &Config, store: ModelStore, sink: Box<dyn AlertSink>) -> Self {
        Self {
            reducer: SignalReducer::new(&config.signal),
            controller: CalibrationController::new(&config.calibration),
            store,
            gate: AlertGate::new(config.alert.threshold, sink),
            iteration: 0,
            started: Instant::now(),
        }
    }

    /// Apply an operator command
    pub fn handle_command(
        &mut self,
        command: Command,
    ) -> std::result::Result<Transition, CalibrationError> {
        self.controller.apply(command, &mut self.store)
    }

    /// Run one iteration of the loop on an acquired block
    pub fn process_block(&mut self, block: &Block) -> Snapshot {
        self.iteration += 1;

        let reduction = self.reducer.process(&block.channel_b);
        let reference = rms(&block.channel_a);

        let classification = if self.controller.is_recording() {
            self.controller.record(reduction.smoothed);
            None
        } else {
            Some(classify(reduction.smoothed, &self.store))
        };

        let alert = self.gate.update(reduction.raw);

        debug!(
            "block {}: rms={:.6} avg={:.6} ref={:.6} {}",
            self.iteration,
            reduction.raw,
            reduction.smoothed,
            reference,
            match classification {
                Some(ref c) => c.to_string(),
                None => self.controller.mode().to_string(),
            }
        );

        Snapshot {
            iteration: self.iteration,
            elapsed_ms: self.started.elapsed().as_millis() as i64,
            mode: self.controller.mode().clone(),
            raw: reduction.raw,
            reference,
            smoothed: reduction.smoothed,
            classification,
            recorded: self.controller.recorded().len(),
            alert,
            reduced_history: self.reducer.reduced_history().iter().copied().collect(),
            running_average: self.reducer.running_average_history().iter().copied().collect(),
        }
    }

    pub fn mode(&self) -> &RunMode {
        self.controller.mode()
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn reducer(&self) -> &SignalReducer {
        &self.reducer
    }

    pub fn controller(&self) -> &CalibrationController {
        &self.controller
    }

    pub fn alert_active(&self) -> bool {
        self.gate.is_active()
    }

    pub fn into_store(self) -> ModelStore {
        self.store
    }
}

/// Counters for one session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub blocks: u64,
    pub alerts: u64,
    pub recalibrations: u64,
    pub rejected_commands: u64,
}

impl SessionStats {
    pub fn log_summary(&self, started: Instant) {
        info!(
            "Session complete: {} blocks, {} alerts, {} recalibrations, {} rejected commands, duration: {:.1}s",
            self.blocks,
            self.alerts,
            self.recalibrations,
            self.rejected_commands,
            started.elapsed().as_secs_f32()
        );
    }
}

/// Limits for a session
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionLimits {
    /// Stop after this many blocks
    pub max_blocks: Option<u64>,
}

/// Drive the monitor from `source` until it is exhausted, `running` clears,
/// the block limit is reached or acquisition fails.
///
/// Pending commands are applied before each block. Every snapshot is handed
/// to `on_snapshot`; an error there ends the session.
pub fn run_session<S, F>(
    source: &mut S,
    monitor: &mut Monitor,
    commands: &Receiver<Command>,
    running: &AtomicBool,
    limits: SessionLimits,
    mut on_snapshot: F,
) -> Result<SessionStats>
where
    S: BlockSource + ?Sized,
    F: FnMut(&Snapshot) -> Result<()>,
{
    let mut stats = SessionStats::default();

    while running.load(Ordering::SeqCst) {
        if let Some(max) = limits.max_blocks {
            if stats.blocks >= max {
                info!("Block limit of {} reached", max);
                break;
            }
        }

        drain_commands(monitor, commands, &mut stats);

        let block = match source.acquire_block()? {
            Some(block) => block,
            None => {
                info!("Acquisition source exhausted");
                break;
            }
        };

        let was_alert = monitor.alert_active();
        let snapshot = monitor.process_block(&block);
        stats.blocks += 1;
        if snapshot.alert && !was_alert {
            stats.alerts += 1;
        }

        on_snapshot(&snapshot)?;
    }

    // a command issued right before shutdown still counts
    drain_commands(monitor, commands, &mut stats);
    Ok(stats)
}

fn drain_commands(monitor: &mut Monitor, commands: &Receiver<Command>, stats: &mut SessionStats) {
    loop {
        match commands.try_recv() {
            Ok(command) => match monitor.handle_command(command) {
                Ok(transition) => {
                    if let Some(RecordingOutcome::Recalibrated(_)) = transition.outcome {
                        stats.recalibrations += 1;
                    }
                }
                Err(e) => {
                    stats.rejected_commands += 1;
                    warn!("Command rejected: {}", e);
                }
            },
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
}

/// Run `body` and then save the model store, whatever happened.
///
/// The store is written after a normal return, after an error and after a
/// panic (which is then resumed). A body error takes precedence over a
/// failure to save.
pub fn run_persisted<T, F>(monitor: &mut Monitor, store_path: &Path, body: F) -> Result<T>
where
    F: FnOnce(&mut Monitor) -> Result<T>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut *monitor)));
    let saved = monitor.store().save_file(store_path);

    match outcome {
        Err(payload) => {
            if let Err(e) = saved {
                error!("Failed to save model store during panic: {}", e);
            }
            panic::resume_unwind(payload)
        }
        Ok(Err(e)) => {
            if let Err(save_err) = saved {
                error!("Failed to save model store: {}", save_err);
            }
            Err(e)
        }
        Ok(Ok(value)) => {
            saved?;
            Ok(value)
        }
    }
}

/// Configure `source` and hand it to `body`, all inside [`run_persisted`].
///
/// A source that fails to configure still leaves the store saved.
pub fn run_configured<S, T, F>(
    source: &mut S,
    monitor: &mut Monitor,
    acquisition: &AcquisitionConfig,
    store_path: &Path,
    body: F,
) -> Result<T>
where
    S: BlockSource + ?Sized,
    F: FnOnce(&mut S, &mut Monitor, BlockTiming) -> Result<T>,
{
    run_persisted(monitor, store_path, |monitor| {
        let timing = source.configure(acquisition)?;
        info!(
            "Acquiring {} samples per block @ {} Hz ({:.1} ms)",
            timing.sample_count,
            timing.sample_rate(),
            timing.block_duration() * 1000.0
        );
        body(source, monitor, timing)
    })
}
