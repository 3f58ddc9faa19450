//! Per-channel front end: coupling and input range

use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type, Q_BUTTERWORTH_F32};
use tracing::debug;

use crate::config::{ChannelConfig, Coupling};
use crate::error::{AcquisitionError, Result};

/// Corner frequency of the AC coupling high-pass (Hz)
pub const AC_COUPLING_CUTOFF_HZ: f32 = 10.0;

/// Applies coupling and range clipping to one channel's samples
pub struct ChannelConditioner {
    coeffs: Option<Coefficients<f32>>,
    high_pass: Option<DirectForm1<f32>>,
    range: f32,
}

impl ChannelConditioner {
    pub fn new(config: &ChannelConfig, sample_rate: u32) -> Result<Self> {
        let coeffs = match config.coupling {
            Coupling::Dc => None,
            Coupling::Ac => {
                let coeffs = Coefficients::<f32>::from_params(
                    Type::HighPass,
                    sample_rate.hz(),
                    AC_COUPLING_CUTOFF_HZ.hz(),
                    Q_BUTTERWORTH_F32,
                )
                .map_err(|e| {
                    AcquisitionError::Conditioning(format!("AC coupling filter: {:?}", e))
                })?;
                debug!(
                    "AC coupling: {} Hz high-pass @ {} Hz",
                    AC_COUPLING_CUTOFF_HZ, sample_rate
                );
                Some(coeffs)
            }
        };

        Ok(Self {
            coeffs,
            high_pass: coeffs.map(DirectForm1::<f32>::new),
            range: config.range_volts as f32,
        })
    }

    /// Condition samples in place
    pub fn process(&mut self, samples: &mut [f32]) {
        if let Some(ref mut filter) = self.high_pass {
            for sample in samples.iter_mut() {
                *sample = filter.run(*sample);
            }
        }

        let range = self.range;
        for sample in samples.iter_mut() {
            *sample = sample.clamp(-range, range);
        }
    }

    /// Forget filter history
    pub fn reset(&mut self) {
        self.high_pass = self.coeffs.map(DirectForm1::<f32>::new);
    }
}
