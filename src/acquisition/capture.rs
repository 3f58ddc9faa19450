//! Live two-channel acquisition using cpal

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleRate, Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::assembler::BlockAssembler;
use super::source::{Block, BlockSource, BlockTiming};
use crate::config::AcquisitionConfig;
use crate::error::{AcquisitionError, Result};

/// Give up on a stream that delivers nothing for this long
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Stereo input device acting as a two-channel scope (left = A, right = B)
pub struct CaptureSource {
    host: Host,
    device_name: Option<String>,
    stream: Option<Stream>,
    sample_sender: Sender<Vec<f32>>,
    sample_receiver: Receiver<Vec<f32>>,
    is_running: Arc<AtomicBool>,
    channels: usize,
    trigger_timeout: Duration,
    assembler: Option<BlockAssembler>,
}

impl CaptureSource {
    /// Create a capture source; no device is opened until `configure`
    pub fn new(device_name: Option<String>) -> Self {
        let host = cpal::default_host();
        let (sender, receiver) = bounded(256);

        Self {
            host,
            device_name,
            stream: None,
            sample_sender: sender,
            sample_receiver: receiver,
            is_running: Arc::new(AtomicBool::new(false)),
            channels: 2,
            trigger_timeout: Duration::from_millis(100),
            assembler: None,
        }
    }

    /// List available input devices that have at least two channels
    pub fn list_devices(&self) -> Result<Vec<String>> {
        let devices = self
            .host
            .input_devices()
            .map_err(|e| AcquisitionError::DeviceConfig(e.to_string()))?;

        let mut names = Vec::new();
        for device in devices {
            let stereo = device
                .supported_input_configs()
                .map(|mut configs| configs.any(|c| c.channels() >= 2))
                .unwrap_or(false);
            if let Ok(name) = device.name() {
                names.push(if stereo {
                    name
                } else {
                    format!("{} (mono, unusable)", name)
                });
            }
        }
        Ok(names)
    }

    fn open_device(&self) -> Result<Device> {
        match self.device_name {
            Some(ref name) => self.find_device_by_name(name),
            None => Ok(self
                .host
                .default_input_device()
                .ok_or(AcquisitionError::NoInputDevice)?),
        }
    }

    fn find_device_by_name(&self, name: &str) -> Result<Device> {
        let devices = self
            .host
            .input_devices()
            .map_err(|e| AcquisitionError::DeviceConfig(e.to_string()))?;

        for device in devices {
            if let Ok(device_name) = device.name() {
                if device_name.contains(name) {
                    return Ok(device);
                }
            }
        }

        Err(AcquisitionError::DeviceNotFound(name.to_string()).into())
    }

    fn start_stream(&mut self, device: &Device, config: StreamConfig) -> Result<()> {
        let sender = self.sample_sender.clone();
        let is_running = self.is_running.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !is_running.load(Ordering::Relaxed) {
                        return;
                    }
                    if sender.try_send(data.to_vec()).is_err() {
                        warn!("Acquisition buffer overflow - dropping samples");
                    }
                },
                move |err| {
                    error!("Input stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AcquisitionError::StreamBuild(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AcquisitionError::StreamPlay(e.to_string()))?;

        self.is_running.store(true, Ordering::Relaxed);
        self.stream = Some(stream);
        info!("Acquisition stream started");
        Ok(())
    }

    /// Stop the input stream
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Relaxed);
        if self.stream.take().is_some() {
            info!("Acquisition stream stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }
}

impl BlockSource for CaptureSource {
    fn configure(&mut self, config: &AcquisitionConfig) -> Result<BlockTiming> {
        self.stop();

        let device = self.open_device()?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using input device: {}", device_name);

        let supported_configs = device
            .supported_input_configs()
            .map_err(|e| AcquisitionError::DeviceConfig(e.to_string()))?;

        let target_rate = SampleRate(BlockTiming::requested_rate(config));
        let mut best_config = None;
        let mut max_channels = 0;
        for cfg in supported_configs {
            debug!(
                "Supported config: channels={}, sample_rate={:?}-{:?}, format={:?}",
                cfg.channels(),
                cfg.min_sample_rate(),
                cfg.max_sample_rate(),
                cfg.sample_format()
            );
            max_channels = max_channels.max(cfg.channels());

            if cfg.channels() < 2 || cfg.sample_format() != cpal::SampleFormat::F32 {
                continue;
            }
            if cfg.min_sample_rate() <= target_rate && target_rate <= cfg.max_sample_rate() {
                best_config = Some(cfg.with_sample_rate(target_rate));
                break;
            }
            if best_config.is_none() {
                best_config = Some(cfg.with_max_sample_rate());
            }
        }

        let supported_config = best_config.ok_or(AcquisitionError::ChannelCount(max_channels))?;

        let actual_rate = supported_config.sample_rate().0;
        let timing = BlockTiming::for_rate(actual_rate, config.block_duration_secs);
        self.channels = supported_config.channels() as usize;
        self.trigger_timeout = Duration::from_millis(config.trigger.timeout_ms);

        info!(
            "Acquisition: {} channels @ {} Hz (requested {} Hz), {} samples per block",
            self.channels, actual_rate, target_rate.0, timing.sample_count
        );

        self.assembler = Some(BlockAssembler::new(config, actual_rate, timing.sample_count)?);

        let stream_config = StreamConfig {
            channels: supported_config.channels(),
            sample_rate: SampleRate(actual_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        self.start_stream(&device, stream_config)?;

        Ok(timing)
    }

    fn acquire_block(&mut self) -> Result<Option<Block>> {
        let assembler = self
            .assembler
            .as_mut()
            .ok_or(AcquisitionError::NotConfigured)?;

        let armed_at = Instant::now();
        let mut last_data = Instant::now();

        loop {
            if let Some(block) = assembler.try_block() {
                return Ok(Some(block));
            }

            if !assembler.is_triggered() && armed_at.elapsed() >= self.trigger_timeout {
                assembler.force_trigger();
                continue;
            }

            match self.sample_receiver.recv_timeout(Duration::from_millis(10)) {
                Ok(chunk) => {
                    assembler.push_interleaved(&chunk, self.channels);
                    last_data = Instant::now();
                }
                Err(RecvTimeoutError::Timeout) => {
                    if last_data.elapsed() >= STALL_TIMEOUT {
                        return Err(
                            AcquisitionError::Stalled(STALL_TIMEOUT.as_millis() as u64).into()
                        );
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(AcquisitionError::Disconnected.into());
                }
            }
        }
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}
