//! Custom error types for the sigclass system

use thiserror::Error;

/// Main error type for the sigclass system
#[derive(Error, Debug)]
pub enum SigclassError {
    #[error("Acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Model store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Alert error: {0}")]
    Alert(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel error: {0}")]
    Channel(String),
}

/// Acquisition device errors
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("No input device available")]
    NoInputDevice,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to get device configuration: {0}")]
    DeviceConfig(String),

    #[error("Failed to build input stream: {0}")]
    StreamBuild(String),

    #[error("Stream playback error: {0}")]
    StreamPlay(String),

    #[error("Device needs two input channels, found {0}")]
    ChannelCount(u16),

    #[error("Source is not configured")]
    NotConfigured,

    #[error("Input stream disconnected")]
    Disconnected,

    #[error("No samples received for {0} ms")]
    Stalled(u64),

    #[error("Channel conditioning error: {0}")]
    Conditioning(String),

    #[error("WAV error: {0}")]
    Wav(String),
}

/// Calibration controller errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("Unknown object: {0}")]
    UnknownObject(String),
}

/// Persisted model store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to serialize model store: {0}")]
    Serialize(String),

    #[error("Failed to write model store {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("Duplicate object name: {0}")]
    DuplicateObject(String),

    #[error("No objects configured")]
    NoObjects,
}

pub type Result<T> = std::result::Result<T, SigclassError>;
