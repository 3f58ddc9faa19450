//! Configuration structures for the sigclass system

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub acquisition: AcquisitionConfig,
    pub signal: SignalConfig,
    pub calibration: CalibrationConfig,
    pub alert: AlertConfig,
    pub store: StoreConfig,
    pub output: OutputConfig,
    /// Trackable objects, in classification order
    pub objects: Vec<ObjectConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            acquisition: AcquisitionConfig::default(),
            signal: SignalConfig::default(),
            calibration: CalibrationConfig::default(),
            alert: AlertConfig::default(),
            store: StoreConfig::default(),
            output: OutputConfig::default(),
            objects: vec![
                ObjectConfig::new("nothing", Some('n')),
                ObjectConfig::new("1", Some('1')),
                ObjectConfig::new("2", Some('2')),
            ],
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.objects.is_empty() {
            return Err(ConfigError::NoObjects);
        }

        let mut seen = HashSet::new();
        for object in &self.objects {
            if object.name.is_empty() {
                return Err(invalid("objects.name", "\"\""));
            }
            if !seen.insert(object.name.as_str()) {
                return Err(ConfigError::DuplicateObject(object.name.clone()));
            }
        }

        let acq = &self.acquisition;
        if !(acq.sample_interval_secs > 0.0) {
            return Err(invalid(
                "acquisition.sample_interval_secs",
                acq.sample_interval_secs,
            ));
        }
        if !(acq.block_duration_secs > 0.0) {
            return Err(invalid(
                "acquisition.block_duration_secs",
                acq.block_duration_secs,
            ));
        }
        for (field, channel) in [
            ("acquisition.channel_a.range_volts", &acq.channel_a),
            ("acquisition.channel_b.range_volts", &acq.channel_b),
        ] {
            if !(channel.range_volts > 0.0) {
                return Err(invalid(field, channel.range_volts));
            }
        }

        if self.signal.average_window == 0 {
            return Err(invalid("signal.average_window", 0));
        }
        if self.signal.buffer_length < self.signal.average_window {
            return Err(invalid("signal.buffer_length", self.signal.buffer_length));
        }
        if !(self.calibration.std_floor > 0.0) {
            return Err(invalid("calibration.std_floor", self.calibration.std_floor));
        }

        Ok(())
    }

    /// Names of the configured objects, in order
    pub fn object_names(&self) -> Vec<String> {
        self.objects.iter().map(|o| o.name.clone()).collect()
    }
}

fn invalid(field: &str, value: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// A statically configured object that can be calibrated and detected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub name: String,
    /// Display/command key; defaults to the first character of the name
    #[serde(default)]
    pub key: Option<char>,
}

impl ObjectConfig {
    pub fn new(name: impl Into<String>, key: Option<char>) -> Self {
        Self {
            name: name.into(),
            key,
        }
    }

    /// Effective key for this object
    pub fn key(&self) -> char {
        self.key
            .or_else(|| self.name.chars().next())
            .unwrap_or('?')
    }
}

/// Acquisition device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Input device name (None = default device)
    pub device: Option<String>,
    /// Requested time between samples (seconds)
    pub sample_interval_secs: f64,
    /// Duration of one block (seconds)
    pub block_duration_secs: f64,
    pub trigger: TriggerConfig,
    pub channel_a: ChannelConfig,
    pub channel_b: ChannelConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_interval_secs: 1.0 / 48_000.0,
            block_duration_secs: 0.02,
            trigger: TriggerConfig::default(),
            channel_a: ChannelConfig {
                coupling: Coupling::Ac,
                range_volts: 1.5,
            },
            channel_b: ChannelConfig {
                coupling: Coupling::Ac,
                range_volts: 1.0,
            },
        }
    }
}

/// Input channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    A,
    B,
}

/// Per-channel front-end settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub coupling: Coupling,
    /// Full-scale input range; samples are clipped to +/- this value
    pub range_volts: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            coupling: Coupling::Ac,
            range_volts: 1.0,
        }
    }
}

/// Input coupling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coupling {
    Ac,
    Dc,
}

/// Trigger edge direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Rising,
    Falling,
}

/// Software trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub enabled: bool,
    pub channel: Channel,
    /// Level the trigger channel has to cross (volts)
    pub threshold: f64,
    pub edge: Edge,
    /// Auto-trigger after this long without a crossing
    pub timeout_ms: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: Channel::B,
            threshold: 10e-3,
            edge: Edge::Falling,
            timeout_ms: 100,
        }
    }
}

/// Signal reduction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Number of reduced values averaged for classification
    pub average_window: usize,
    /// Maximum length of the history series
    pub buffer_length: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            average_window: 30,
            buffer_length: 100,
        }
    }
}

/// Calibration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// A recording must hold strictly more values than this to be used
    pub min_recording: usize,
    /// Lower bound applied to every calibrated standard deviation
    pub std_floor: f64,
    /// Discard recordings too short to recompute a model from
    pub clear_short_recordings: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_recording: 30,
            std_floor: 1e-6,
            clear_short_recordings: true,
        }
    }
}

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Raw block RMS above this level raises the alert (volts)
    pub threshold: f64,
    /// Play a sound while the alert is active
    pub enable_sound: bool,
    /// WAV file looped while the alert is active (None = generated tone)
    pub sound_file: Option<PathBuf>,
    /// Frequency of the generated tone (Hz)
    pub tone_hz: f32,
    /// Playback gain (0.0 - 1.0)
    pub volume: f32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            threshold: 0.06,
            enable_sound: true,
            sound_file: None,
            tone_hz: 880.0,
            volume: 0.2,
        }
    }
}

/// Model store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON document holding the calibrated models
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("measurements.json"),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormat,
    /// Output file path (None = console only)
    pub output_path: Option<PathBuf>,
    /// Enable console output
    pub enable_console: bool,
    /// Include both history series in JSON output
    pub include_history: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            output_path: None,
            enable_console: true,
            include_history: false,
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human readable status line
    Text,
    /// One JSON object per block
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
