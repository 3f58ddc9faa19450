//! Trigger-aligned block assembly from a continuous two-channel stream

use std::collections::VecDeque;
use tracing::trace;

use super::conditioning::ChannelConditioner;
use super::source::Block;
use crate::config::{AcquisitionConfig, Channel, Edge, TriggerConfig};
use crate::error::Result;

/// Finds threshold crossings across consecutive chunks of one channel
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    threshold: f32,
    edge: Edge,
    previous: Option<f32>,
}

impl EdgeDetector {
    pub fn new(threshold: f32, edge: Edge) -> Self {
        Self {
            threshold,
            edge,
            previous: None,
        }
    }

    /// Index of the first sample completing a crossing, if any.
    ///
    /// The last sample of every scanned chunk is remembered, so a crossing
    /// that straddles two chunks is found at index 0 of the second.
    pub fn scan<'a, I>(&mut self, samples: I) -> Option<usize>
    where
        I: IntoIterator<Item = &'a f32>,
    {
        for (i, &current) in samples.into_iter().enumerate() {
            let crossed = match (self.previous, self.edge) {
                (Some(prev), Edge::Rising) => prev < self.threshold && current >= self.threshold,
                (Some(prev), Edge::Falling) => prev > self.threshold && current <= self.threshold,
                (None, _) => false,
            };
            self.previous = Some(current);
            if crossed {
                return Some(i);
            }
        }
        None
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Cuts conditioned blocks out of the incoming sample stream.
///
/// With the trigger enabled, a block starts at the first crossing on the
/// trigger channel; samples before it are discarded. [`force_trigger`]
/// starts the block immediately, which is how an expired trigger timeout
/// (auto mode) is handled.
///
/// [`force_trigger`]: BlockAssembler::force_trigger
pub struct BlockAssembler {
    sample_count: usize,
    trigger_channel: Channel,
    detector: Option<EdgeDetector>,
    conditioners: [ChannelConditioner; 2],
    pending_a: VecDeque<f32>,
    pending_b: VecDeque<f32>,
    triggered: bool,
}

impl BlockAssembler {
    pub fn new(config: &AcquisitionConfig, sample_rate: u32, sample_count: usize) -> Result<Self> {
        let conditioners = [
            ChannelConditioner::new(&config.channel_a, sample_rate)?,
            ChannelConditioner::new(&config.channel_b, sample_rate)?,
        ];

        Ok(Self {
            sample_count,
            trigger_channel: config.trigger.channel,
            detector: Self::detector(&config.trigger),
            conditioners,
            pending_a: VecDeque::with_capacity(sample_count * 2),
            pending_b: VecDeque::with_capacity(sample_count * 2),
            triggered: false,
        })
    }

    fn detector(trigger: &TriggerConfig) -> Option<EdgeDetector> {
        trigger
            .enabled
            .then(|| EdgeDetector::new(trigger.threshold as f32, trigger.edge))
    }

    /// Feed interleaved frames; channel 0 is A and channel 1 is B
    pub fn push_interleaved(&mut self, data: &[f32], channels: usize) {
        if channels < 2 {
            return;
        }
        let mut a: Vec<f32> = data.chunks_exact(channels).map(|f| f[0]).collect();
        let mut b: Vec<f32> = data.chunks_exact(channels).map(|f| f[1]).collect();
        self.push_conditioned(&mut a, &mut b);
    }

    /// Feed planar samples for both channels
    pub fn push(&mut self, channel_a: &[f32], channel_b: &[f32]) {
        let mut a = channel_a.to_vec();
        let mut b = channel_b.to_vec();
        self.push_conditioned(&mut a, &mut b);
    }

    fn push_conditioned(&mut self, a: &mut Vec<f32>, b: &mut Vec<f32>) {
        let len = a.len().min(b.len());
        a.truncate(len);
        b.truncate(len);
        self.conditioners[0].process(a);
        self.conditioners[1].process(b);
        self.pending_a.extend(a.iter());
        self.pending_b.extend(b.iter());
    }

    /// Start the current block at the oldest pending sample
    pub fn force_trigger(&mut self) {
        if !self.triggered {
            trace!("Auto-trigger");
            self.triggered = true;
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    /// Next complete block, if the trigger fired and enough samples arrived
    pub fn try_block(&mut self) -> Option<Block> {
        if !self.triggered {
            self.search_trigger();
        }

        if !self.triggered || self.pending_a.len() < self.sample_count {
            return None;
        }

        let channel_a: Vec<f32> = self.pending_a.drain(..self.sample_count).collect();
        let channel_b: Vec<f32> = self.pending_b.drain(..self.sample_count).collect();
        self.triggered = false;
        if let Some(ref mut detector) = self.detector {
            detector.reset();
        }

        Some(Block::new(channel_a, channel_b))
    }

    fn search_trigger(&mut self) {
        let Some(ref mut detector) = self.detector else {
            self.triggered = true;
            return;
        };

        let trigger_samples = match self.trigger_channel {
            Channel::A => &self.pending_a,
            Channel::B => &self.pending_b,
        };

        match detector.scan(trigger_samples.iter()) {
            Some(index) => {
                trace!("Triggered at pending sample {}", index);
                self.pending_a.drain(..index);
                self.pending_b.drain(..index);
                self.triggered = true;
            }
            None => {
                // the detector remembers the last sample, nothing else is needed
                self.pending_a.clear();
                self.pending_b.clear();
            }
        }
    }

    /// Drop pending samples and filter history
    pub fn reset(&mut self) {
        self.pending_a.clear();
        self.pending_b.clear();
        self.triggered = false;
        if let Some(ref mut detector) = self.detector {
            detector.reset();
        }
        for conditioner in self.conditioners.iter_mut() {
            conditioner.reset();
        }
    }

    pub fn pending(&self) -> usize {
        self.pending_a.len()
    }
}
