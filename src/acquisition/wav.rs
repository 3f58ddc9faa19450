//! Two-channel WAV replay and recording

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::assembler::BlockAssembler;
use super::source::{Block, BlockSource, BlockTiming};
use crate::config::AcquisitionConfig;
use crate::error::{AcquisitionError, Result};

/// Replays a two-channel WAV file block by block.
///
/// Channel 0 is A, channel 1 is B. The file's own sample rate determines the
/// timing; the configured interval is only a request. The source is
/// exhausted at end of file.
pub struct WavSource {
    path: PathBuf,
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
    position: usize,
    assembler: Option<BlockAssembler>,
    sample_count: usize,
    /// Frames fed since the last block without a trigger crossing
    untriggered_frames: usize,
    /// Frames fed to the assembler per step
    chunk_frames: usize,
}

impl WavSource {
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| AcquisitionError::Wav(format!("{}: {}", path.display(), e)))?;
        let spec = reader.spec();

        if spec.channels < 2 {
            return Err(AcquisitionError::ChannelCount(spec.channels).into());
        }

        info!(
            "WAV format: {} channels, {} Hz, {} bits",
            spec.channels, spec.sample_rate, spec.bits_per_sample
        );

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

        Ok(Self {
            path: path.to_path_buf(),
            samples,
            channels: spec.channels as usize,
            sample_rate: spec.sample_rate,
            position: 0,
            assembler: None,
            sample_count: 0,
            untriggered_frames: 0,
            chunk_frames: 512,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames per channel in the file
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }
}

impl BlockSource for WavSource {
    fn configure(&mut self, config: &AcquisitionConfig) -> Result<BlockTiming> {
        let timing = BlockTiming::for_rate(self.sample_rate, config.block_duration_secs);
        if timing.sample_rate() != BlockTiming::requested_rate(config) {
            info!(
                "Replaying {} at its native {} Hz (requested {} Hz)",
                self.path.display(),
                self.sample_rate,
                BlockTiming::requested_rate(config)
            );
        }

        self.assembler = Some(BlockAssembler::new(
            config,
            self.sample_rate,
            timing.sample_count,
        )?);
        self.sample_count = timing.sample_count;
        self.position = 0;
        self.untriggered_frames = 0;
        Ok(timing)
    }

    fn acquire_block(&mut self) -> Result<Option<Block>> {
        let assembler = self
            .assembler
            .as_mut()
            .ok_or(AcquisitionError::NotConfigured)?;

        loop {
            if let Some(block) = assembler.try_block() {
                self.untriggered_frames = 0;
                return Ok(Some(block));
            }

            // a file has no real-time trigger timeout; auto-trigger once a
            // block's worth of frames went by without a crossing
            if !assembler.is_triggered() && self.untriggered_frames >= self.sample_count {
                assembler.force_trigger();
                continue;
            }

            if self.position >= self.samples.len() {
                debug!("End of {}", self.path.display());
                return Ok(None);
            }

            let end = (self.position + self.chunk_frames * self.channels).min(self.samples.len());
            assembler.push_interleaved(&self.samples[self.position..end], self.channels);
            if !assembler.is_triggered() {
                self.untriggered_frames += (end - self.position) / self.channels;
            }
            self.position = end;
        }
    }
}

/// Writes acquired blocks to a two-channel float WAV file
pub struct WavBlockWriter {
    writer: hound::WavWriter<BufWriter<File>>,
    blocks: usize,
}

impl WavBlockWriter {
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer = hound::WavWriter::create(path, spec)
            .map_err(|e| AcquisitionError::Wav(format!("{}: {}", path.display(), e)))?;

        Ok(Self { writer, blocks: 0 })
    }

    pub fn write_block(&mut self, block: &Block) -> Result<()> {
        for (a, b) in block.channel_a.iter().zip(block.channel_b.iter()) {
            self.writer
                .write_sample(*a)
                .and_then(|_| self.writer.write_sample(*b))
                .map_err(|e| AcquisitionError::Wav(e.to_string()))?;
        }
        self.blocks += 1;
        Ok(())
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    pub fn finalize(self) -> Result<()> {
        self.writer
            .finalize()
            .map_err(|e| AcquisitionError::Wav(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, Coupling};

    fn free_running_config() -> AcquisitionConfig {
        let dc = ChannelConfig {
            coupling: Coupling::Dc,
            range_volts: 10.0,
        };
        let mut config = AcquisitionConfig {
            channel_a: dc.clone(),
            channel_b: dc,
            block_duration_secs: 0.01,
            ..Default::default()
        };
        config.trigger.enabled = false;
        config
    }

    fn write_blocks(path: &Path, blocks: &[Block]) {
        let mut writer = WavBlockWriter::create(path, 1000).unwrap();
        for block in blocks {
            writer.write_block(block).unwrap();
        }
        assert_eq!(writer.blocks(), blocks.len());
        writer.finalize().unwrap();
    }

    #[test]
    fn test_record_then_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.wav");

        let blocks: Vec<Block> = (0..3)
            .map(|i| Block::new(vec![i as f32 * 0.1; 10], vec![-(i as f32) * 0.1; 10]))
            .collect();
        write_blocks(&path, &blocks);

        let mut source = WavSource::open(&path).unwrap();
        assert_eq!(source.frames(), 30);

        let timing = source.configure(&free_running_config()).unwrap();
        assert_eq!(timing.sample_count, 10);
        assert_eq!(timing.sample_rate(), 1000);

        for expected in &blocks {
            let block = source.acquire_block().unwrap().unwrap();
            assert_eq!(&block, expected);
        }
        assert!(source.acquire_block().unwrap().is_none());
    }

    #[test]
    fn test_mono_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 1000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0i16).unwrap();
        writer.finalize().unwrap();

        assert!(WavSource::open(&path).is_err());
    }

    #[test]
    fn test_acquire_before_configure_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.wav");
        write_blocks(&path, &[Block::new(vec![0.0; 4], vec![0.0; 4])]);

        let mut source = WavSource::open(&path).unwrap();
        assert!(source.acquire_block().is_err());
    }
}
