//! Two-channel block acquisition
//!
//! A [`BlockSource`] is configured once and then yields trigger-aligned
//! blocks of voltage samples for channels A and B. Sources:
//!
//! - [`CaptureSource`]: live stereo input device (left = A, right = B)
//! - [`WavSource`]: replay of a two-channel WAV recording

pub mod assembler;
pub mod capture;
pub mod conditioning;
pub mod source;
pub mod wav;

pub use assembler::{BlockAssembler, EdgeDetector};
pub use capture::CaptureSource;
pub use conditioning::ChannelConditioner;
pub use source::{Block, BlockSource, BlockTiming};
pub use wav::{WavBlockWriter, WavSource};
