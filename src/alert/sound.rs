//! Alert sound services

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

use super::gate::AlertSink;
use crate::config::AlertConfig;
use crate::error::{Result, SigclassError};

/// Shared on/off flag read by the playback callback.
///
/// Only the alert gate writes it (through its sink); the audio thread only
/// reads it.
#[derive(Debug, Clone, Default)]
pub struct AlertFlag(Arc<AtomicBool>);

impl AlertFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, active: bool) {
        self.0.store(active, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Sink that only logs alert transitions
#[derive(Debug, Default)]
pub struct LogAlert;

impl AlertSink for LogAlert {
    fn set_alert(&mut self, active: bool) {
        if active {
            info!("ALERT: level above threshold");
        } else {
            info!("Alert cleared");
        }
    }
}

/// Mono clip played in a loop while the alert is active
#[derive(Debug, Clone)]
pub struct AlertClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AlertClip {
    /// Beep pattern: `frequency` tone for 150 ms followed by 150 ms of silence
    pub fn beep(frequency: f32, sample_rate: u32, volume: f32) -> Self {
        let half = (sample_rate as f32 * 0.15) as usize;
        let mut samples: Vec<f32> = (0..half)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                volume * (2.0 * std::f32::consts::PI * frequency * t).sin()
            })
            .collect();
        samples.resize(half * 2, 0.0);

        Self {
            samples,
            sample_rate,
        }
    }

    /// Load a WAV file, mixing all channels down to mono
    pub fn from_wav(path: &Path, volume: f32) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| SigclassError::Alert(format!("{}: {}", path.display(), e)))?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().filter_map(|s| s.ok()).collect(),
            hound::SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .filter_map(|s| s.ok())
                    .map(|s| s as f32 / max_val)
                    .collect()
            }
        };

        let channels = spec.channels.max(1) as usize;
        let mono: Vec<f32> = samples
            .chunks(channels)
            .map(|frame| volume * frame.iter().sum::<f32>() / channels as f32)
            .collect();

        if mono.is_empty() {
            return Err(SigclassError::Alert(format!(
                "{} contains no samples",
                path.display()
            )));
        }

        Ok(Self {
            samples: mono,
            sample_rate: spec.sample_rate,
        })
    }

    /// Nearest-neighbour conversion to another sample rate
    pub fn resampled(&self, sample_rate: u32) -> Self {
        if sample_rate == self.sample_rate || self.samples.is_empty() {
            return self.clone();
        }

        let ratio = self.sample_rate as f64 / sample_rate as f64;
        let len = ((self.samples.len() as f64) / ratio).round().max(1.0) as usize;
        let samples = (0..len)
            .map(|i| {
                let src = ((i as f64) * ratio) as usize;
                self.samples[src.min(self.samples.len() - 1)]
            })
            .collect();

        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Loops an alert clip on the default output device while the flag is set
pub struct LoopingAlert {
    flag: AlertFlag,
    _stream: Stream,
}

impl LoopingAlert {
    /// Open the default output device and start a (silent) stream
    pub fn new(config: &AlertConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SigclassError::Alert("No output device available".to_string()))?;

        let supported = device
            .default_output_config()
            .map_err(|e| SigclassError::Alert(e.to_string()))?;
        if supported.sample_format() != SampleFormat::F32 {
            return Err(SigclassError::Alert(format!(
                "Unsupported output sample format: {:?}",
                supported.sample_format()
            )));
        }

        let stream_config: cpal::StreamConfig = supported.into();
        let sample_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels as usize;

        let clip = match config.sound_file {
            Some(ref path) => AlertClip::from_wav(path, config.volume)?.resampled(sample_rate),
            None => AlertClip::beep(config.tone_hz, sample_rate, config.volume),
        };
        info!(
            "Alert sound ready: {:.2}s clip @ {} Hz",
            clip.duration(),
            sample_rate
        );

        let flag = AlertFlag::new();
        let playing = flag.clone();
        let mut cursor = 0usize;

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let active = playing.is_set();
                    if !active {
                        cursor = 0;
                    }
                    for frame in data.chunks_mut(channels) {
                        let sample = if active {
                            let s = clip.samples[cursor];
                            cursor = (cursor + 1) % clip.samples.len();
                            s
                        } else {
                            0.0
                        };
                        frame.fill(sample);
                    }
                },
                move |err| {
                    error!("Alert stream error: {}", err);
                },
                None,
            )
            .map_err(|e| SigclassError::Alert(e.to_string()))?;

        stream
            .play()
            .map_err(|e| SigclassError::Alert(e.to_string()))?;

        Ok(Self {
            flag,
            _stream: stream,
        })
    }
}

impl AlertSink for LoopingAlert {
    fn set_alert(&mut self, active: bool) {
        self.flag.set(active);
        info!("Alert sound {}", if active { "started" } else { "stopped" });
    }
}

/// Pick the sound service for the given configuration.
///
/// Falls back to logging when sound is disabled or no output device works.
pub fn alert_sink(config: &AlertConfig) -> Box<dyn AlertSink> {
    if !config.enable_sound {
        return Box::new(LogAlert);
    }

    match LoopingAlert::new(config) {
        Ok(player) => Box::new(player),
        Err(e) => {
            error!("Alert sound unavailable ({}); logging alerts instead", e);
            Box::new(LogAlert)
        }
    }
}
