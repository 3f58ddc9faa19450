//! Two-channel signal classifier
//!
//! Acquires blocks of samples from a two-channel source, reduces channel B to
//! an RMS level, smooths it with a moving average and classifies the result
//! against per-object Gaussian models. The operator can record any object to
//! recalibrate its model; a separate gate raises an alert while the raw level
//! of the latest block exceeds a threshold.
//!
//! # Architecture
//!
//! - `acquisition`: block sources (live capture, WAV replay), trigger and
//!   channel conditioning
//! - `analysis`: RMS reduction, smoothing, histories and the classifier
//! - `calibration`: running/recording state machine and trimmed statistics
//! - `store`: per-object models and their JSON persistence
//! - `alert`: threshold gate and alert sound
//! - `monitor`: the acquisition loop tying everything together
//! - `input`: operator key presses
//! - `output`: snapshot formatting and writing
//! - `config`: configuration structures
//! - `error`: error types
//!
//! # Example
//!
//! ```no_run
//! use sigclass::{alert_sink, Config, ModelStore, Monitor};
//!
//! let config = Config::default();
//! let mut store = ModelStore::from_objects(&config.objects, config.calibration.std_floor);
//! store.load_file(&config.store.path);
//!
//! let monitor = Monitor::new(&config, store, alert_sink(&config.alert));
//! ```

pub mod acquisition;
pub mod alert;
pub mod analysis;
pub mod calibration;
pub mod config;
pub mod error;
pub mod input;
pub mod monitor;
pub mod output;
pub mod store;

// Re-exports for convenience
pub use acquisition::{Block, BlockSource, BlockTiming, CaptureSource, WavBlockWriter, WavSource};
pub use alert::{alert_sink, AlertGate, AlertSink};
pub use analysis::{classify, rms, Classification, SignalReducer};
pub use calibration::{CalibrationController, Command, RunMode};
pub use config::{Config, ObjectConfig, OutputConfig};
pub use error::{AcquisitionError, CalibrationError, ConfigError, Result, SigclassError, StoreError};
pub use input::KeyMap;
pub use monitor::{
    run_configured, run_persisted, run_session, Monitor, SessionLimits, SessionStats, Snapshot,
};
pub use output::OutputWriter;
pub use store::{ModelStore, ObjectModel};
