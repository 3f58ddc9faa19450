//! Block source abstraction

use crate::config::{AcquisitionConfig, Channel};
use crate::error::Result;

/// One acquired block of voltage samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub channel_a: Vec<f32>,
    pub channel_b: Vec<f32>,
}

impl Block {
    pub fn new(channel_a: Vec<f32>, channel_b: Vec<f32>) -> Self {
        Self {
            channel_a,
            channel_b,
        }
    }

    pub fn channel(&self, channel: Channel) -> &[f32] {
        match channel {
            Channel::A => &self.channel_a,
            Channel::B => &self.channel_b,
        }
    }

    pub fn len(&self) -> usize {
        self.channel_a.len().min(self.channel_b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Actual timing a source settled on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockTiming {
    /// Seconds between samples
    pub sample_interval: f64,
    /// Samples per channel in each block
    pub sample_count: usize,
}

impl BlockTiming {
    /// Timing for a device running at `sample_rate`
    pub fn for_rate(sample_rate: u32, block_duration_secs: f64) -> Self {
        let sample_interval = 1.0 / sample_rate as f64;
        let sample_count = ((block_duration_secs / sample_interval).round() as usize).max(1);
        Self {
            sample_interval,
            sample_count,
        }
    }

    /// Requested sample rate, rounded to whole Hz
    pub fn requested_rate(config: &AcquisitionConfig) -> u32 {
        (1.0 / config.sample_interval_secs).round().max(1.0) as u32
    }

    pub fn sample_rate(&self) -> u32 {
        (1.0 / self.sample_interval).round() as u32
    }

    pub fn block_duration(&self) -> f64 {
        self.sample_interval * self.sample_count as f64
    }
}

/// Acquisition device seen by the acquisition loop
pub trait BlockSource {
    /// Apply channel, trigger and timing settings; report the actual timing
    fn configure(&mut self, config: &AcquisitionConfig) -> Result<BlockTiming>;

    /// Arm, wait for and read one block.
    ///
    /// Blocks the caller. `Ok(None)` means a finite source is exhausted.
    fn acquire_block(&mut self) -> Result<Option<Block>>;
}

impl<S: BlockSource + ?Sized> BlockSource for Box<S> {
    fn configure(&mut self, config: &AcquisitionConfig) -> Result<BlockTiming> {
        (**self).configure(config)
    }

    fn acquire_block(&mut self) -> Result<Option<Block>> {
        (**self).acquire_block()
    }
}
