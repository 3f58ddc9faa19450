//! Calibration controller: the RUNNING / RECORDING state machine
//!
//! While recording, every smoothed value is appended to a recording buffer.
//! Leaving a recording (returning to running, or switching to another target)
//! recomputes the target's mean and std from the middle half of the buffer.

use std::fmt;
use tracing::{info, warn};

use crate::config::CalibrationConfig;
use crate::error::CalibrationError;
use crate::store::ModelStore;

/// Operator command driving the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Stop recording (if recording) and go back to classification
    ReturnToRunning,
    /// Start recording calibration data for the named object
    StartRecording(String),
}

/// Current run mode
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Running,
    Recording {
        target: String,
    },
}

impl RunMode {
    pub fn is_recording(&self) -> bool {
        matches!(self, RunMode::Recording { .. })
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            RunMode::Running => None,
            RunMode::Recording { target } => Some(target),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Running => write!(f, "running"),
            RunMode::Recording { target } => write!(f, "recording {}", target),
        }
    }
}

/// New statistics written into a model by a finished recording
#[derive(Debug, Clone, PartialEq)]
pub struct Recalibration {
    pub object: String,
    pub mean: f64,
    /// Std after the floor was applied
    pub std: f64,
    /// Values the statistics were computed from
    pub used: usize,
    /// Values in the recording before trimming
    pub recorded: usize,
}

/// What a finished recording produced
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingOutcome {
    Recalibrated(Recalibration),
    /// Too few values; the model was left unchanged
    TooShort { object: String, recorded: usize },
    /// The statistics were not finite; the model was left unchanged
    Invalid { object: String, recorded: usize },
}

/// Observable effect of applying a command
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: RunMode,
    pub to: RunMode,
    pub outcome: Option<RecordingOutcome>,
}

/// Mean and population standard deviation of the middle half of `samples`.
///
/// With `n = samples.len()` and `q = n / 4`, the retained window is
/// `samples[q .. n - q]`. `None` when that window is empty.
pub fn trimmed_stats(samples: &[f64]) -> Option<(f64, f64, usize)> {
    let n = samples.len();
    let quarter = n / 4;
    let kept = &samples[quarter..n - quarter];
    if kept.is_empty() {
        return None;
    }

    let count = kept.len() as f64;
    let mean = kept.iter().sum::<f64>() / count;
    let variance = kept.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count;
    Some((mean, variance.sqrt(), kept.len()))
}

/// Owns the run mode and the recording buffer
#[derive(Debug, Clone)]
pub struct CalibrationController {
    mode: RunMode,
    buffer: Vec<f64>,
    min_recording: usize,
    clear_short_recordings: bool,
}

impl CalibrationController {
    pub fn new(config: &CalibrationConfig) -> Self {
        Self {
            mode: RunMode::Running,
            buffer: Vec::new(),
            min_recording: config.min_recording,
            clear_short_recordings: config.clear_short_recordings,
        }
    }

    pub fn mode(&self) -> &RunMode {
        &self.mode
    }

    pub fn is_recording(&self) -> bool {
        self.mode.is_recording()
    }

    /// Values recorded so far for the current (or last) target
    pub fn recorded(&self) -> &[f64] {
        &self.buffer
    }

    /// Append one smoothed value; ignored unless recording.
    ///
    /// Non-finite values are dropped so they cannot reach the model.
    pub fn record(&mut self, value: f64) {
        if !self.mode.is_recording() {
            return;
        }
        if !value.is_finite() {
            warn!("Dropping non-finite value {} from recording", value);
            return;
        }
        self.buffer.push(value);
    }

    /// Apply an operator command, recomputing the target model if a
    /// recording ends.
    pub fn apply(
        &mut self,
        command: Command,
        store: &mut ModelStore,
    ) -> Result<Transition, CalibrationError> {
        let next = match command {
            Command::ReturnToRunning => RunMode::Running,
            Command::StartRecording(target) => {
                if !store.contains(&target) {
                    warn!("Cannot record unknown object '{}'", target);
                    return Err(CalibrationError::UnknownObject(target));
                }
                RunMode::Recording { target }
            }
        };

        let from = std::mem::replace(&mut self.mode, next);
        let outcome = match from.target() {
            Some(target) => Some(self.finish_recording(target, store)),
            None => None,
        };

        match &self.mode {
            RunMode::Running => info!("Running"),
            RunMode::Recording { target } => info!("Recording {}", target),
        }

        Ok(Transition {
            from,
            to: self.mode.clone(),
            outcome,
        })
    }

    fn finish_recording(&mut self, target: &str, store: &mut ModelStore) -> RecordingOutcome {
        let recorded = self.buffer.len();

        if recorded <= self.min_recording {
            info!(
                "Recording for '{}' too short ({} <= {} values); model unchanged",
                target, recorded, self.min_recording
            );
            if self.clear_short_recordings {
                self.buffer.clear();
            }
            return RecordingOutcome::TooShort {
                object: target.to_string(),
                recorded,
            };
        }

        // recorded > min_recording >= 0, so the middle half is never empty
        let (mean, raw_std, used) = match trimmed_stats(&self.buffer) {
            Some(stats) => stats,
            None => {
                self.buffer.clear();
                return RecordingOutcome::TooShort {
                    object: target.to_string(),
                    recorded,
                };
            }
        };
        self.buffer.clear();

        if !mean.is_finite() || !raw_std.is_finite() {
            warn!(
                "Recording for '{}' gave mean={} std={}; model unchanged",
                target, mean, raw_std
            );
            return RecordingOutcome::Invalid {
                object: target.to_string(),
                recorded,
            };
        }

        store.update(target, mean, raw_std);
        let std = store.get(target).map(|m| m.std()).unwrap_or(raw_std);
        if std != raw_std {
            warn!(
                "Recording for '{}' has std {:e}; clamped to {:e}",
                target, raw_std, std
            );
        }
        info!(
            "Calibrated '{}': mean={:.6}, std={:.6} ({} of {} values)",
            target, mean, std, used, recorded
        );

        RecordingOutcome::Recalibrated(Recalibration {
            object: target.to_string(),
            mean,
            std,
            used,
            recorded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ObjectConfig;
    use crate::store::DEFAULT_STD_FLOOR;

    fn store() -> ModelStore {
        ModelStore::from_objects(
            &[
                ObjectConfig::new("nothing", Some('n')),
                ObjectConfig::new("1", Some('1')),
            ],
            DEFAULT_STD_FLOOR,
        )
    }

    fn controller() -> CalibrationController {
        CalibrationController::new(&CalibrationConfig::default())
    }

    fn record_all(controller: &mut CalibrationController, values: &[f64]) {
        for &v in values {
            controller.record(v);
        }
    }

    fn population_stats(values: &[f64]) -> (f64, f64) {
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        (mean, var.sqrt())
    }

    #[test]
    fn test_trimmed_stats_uses_original_length() {
        let values: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let (mean, std, used) = trimmed_stats(&values).unwrap();
        let (expected_mean, expected_std) = population_stats(&values[10..30]);
        assert_eq!(used, 20);
        assert!((mean - expected_mean).abs() < 1e-12);
        assert!((std - expected_std).abs() < 1e-12);
        assert!((mean - 19.5).abs() < 1e-12);
    }

    #[test]
    fn test_trimmed_stats_odd_length() {
        // n = 33, q = 8 -> samples[8..25]
        let values: Vec<f64> = (0..33).map(|i| (i * i) as f64).collect();
        let (mean, _, used) = trimmed_stats(&values).unwrap();
        assert_eq!(used, 17);
        let (expected_mean, _) = population_stats(&values[8..25]);
        assert!((mean - expected_mean).abs() < 1e-9);
        assert_eq!(trimmed_stats(&[]), None);
    }

    #[test]
    fn test_initial_state_running() {
        let c = controller();
        assert_eq!(c.mode(), &RunMode::Running);
        assert!(c.recorded().is_empty());
    }

    #[test]
    fn test_record_ignored_while_running() {
        let mut c = controller();
        c.record(1.0);
        assert!(c.recorded().is_empty());
    }

    #[test]
    fn test_recompute_on_return_to_running() {
        let mut store = store();
        let mut c = controller();
        c.apply(Command::StartRecording("1".into()), &mut store).unwrap();
        assert!(c.is_recording());

        let values: Vec<f64> = (0..40).map(|i| 0.05 + i as f64 * 0.001).collect();
        record_all(&mut c, &values);

        let transition = c.apply(Command::ReturnToRunning, &mut store).unwrap();
        assert_eq!(transition.to, RunMode::Running);

        let (mean, std) = population_stats(&values[10..30]);
        let model = store.get("1").unwrap();
        assert!((model.mean() - mean).abs() < 1e-12);
        assert!((model.std() - std).abs() < 1e-12);
        assert!(c.recorded().is_empty());

        match transition.outcome {
            Some(RecordingOutcome::Recalibrated(r)) => {
                assert_eq!(r.object, "1");
                assert_eq!(r.used, 20);
                assert_eq!(r.recorded, 40);
            }
            other => panic!("expected recalibration, got {:?}", other),
        }
    }

    #[test]
    fn test_short_recording_leaves_model_unchanged() {
        let mut store = store();
        let mut c = controller();
        c.apply(Command::StartRecording("1".into()), &mut store).unwrap();
        record_all(&mut c, &[0.2; 30]);

        let transition = c.apply(Command::ReturnToRunning, &mut store).unwrap();
        assert_eq!(
            transition.outcome,
            Some(RecordingOutcome::TooShort {
                object: "1".into(),
                recorded: 30
            })
        );
        let model = store.get("1").unwrap();
        assert_eq!(model.mean(), 0.0);
        assert_eq!(model.std(), 1.0);
        // cleared by default so it cannot leak into a later recording
        assert!(c.recorded().is_empty());
    }

    #[test]
    fn test_short_recording_kept_when_configured() {
        let mut store = store();
        let mut c = CalibrationController::new(&CalibrationConfig {
            clear_short_recordings: false,
            ..Default::default()
        });
        c.apply(Command::StartRecording("1".into()), &mut store).unwrap();
        record_all(&mut c, &[0.2; 10]);
        c.apply(Command::ReturnToRunning, &mut store).unwrap();
        assert_eq!(c.recorded().len(), 10);

        // leftovers count towards the next recording
        c.apply(Command::StartRecording("1".into()), &mut store).unwrap();
        record_all(&mut c, &[0.2; 21]);
        let transition = c.apply(Command::ReturnToRunning, &mut store).unwrap();
        assert!(matches!(
            transition.outcome,
            Some(RecordingOutcome::Recalibrated(_))
        ));
    }

    #[test]
    fn test_non_finite_values_not_recorded() {
        let mut store = store();
        let mut c = controller();
        c.apply(Command::StartRecording("1".into()), &mut store).unwrap();

        let mut values = vec![0.05; 40];
        values[15] = f64::NAN;
        values[20] = f64::INFINITY;
        record_all(&mut c, &values);
        assert_eq!(c.recorded().len(), 38);

        let transition = c.apply(Command::ReturnToRunning, &mut store).unwrap();
        assert!(matches!(
            transition.outcome,
            Some(RecordingOutcome::Recalibrated(_))
        ));

        let model = store.get("1").unwrap();
        assert!((model.mean() - 0.05).abs() < 1e-12);
        assert_eq!(model.std(), DEFAULT_STD_FLOOR);
        assert_eq!(crate::analysis::classify(0.05, &store).label(), "1");
    }

    #[test]
    fn test_constant_recording_clamps_std() {
        let mut store = store();
        let mut c = controller();
        c.apply(Command::StartRecording("nothing".into()), &mut store).unwrap();
        record_all(&mut c, &[0.01; 40]);
        c.apply(Command::ReturnToRunning, &mut store).unwrap();

        let model = store.get("nothing").unwrap();
        assert!((model.mean() - 0.01).abs() < 1e-12);
        assert_eq!(model.std(), DEFAULT_STD_FLOOR);
        assert!(model.std() > 0.0);
    }

    #[test]
    fn test_unknown_object_rejected() {
        let mut store = store();
        let mut c = controller();
        let err = c
            .apply(Command::StartRecording("ghost".into()), &mut store)
            .unwrap_err();
        assert_eq!(err, CalibrationError::UnknownObject("ghost".into()));
        assert_eq!(c.mode(), &RunMode::Running);
    }

    #[test]
    fn test_switching_target_finalizes_previous() {
        let mut store = store();
        let mut c = controller();
        c.apply(Command::StartRecording("nothing".into()), &mut store).unwrap();
        record_all(&mut c, &[0.02; 40]);

        let transition = c
            .apply(Command::StartRecording("1".into()), &mut store)
            .unwrap();
        assert_eq!(
            transition.to,
            RunMode::Recording {
                target: "1".into()
            }
        );
        assert!((store.get("nothing").unwrap().mean() - 0.02).abs() < 1e-12);
        assert!(c.recorded().is_empty());
        assert_eq!(store.get("1").unwrap().mean(), 0.0);
    }

    #[test]
    fn test_return_while_running_is_noop() {
        let mut store = store();
        let mut c = controller();
        let transition = c.apply(Command::ReturnToRunning, &mut store).unwrap();
        assert_eq!(transition.from, RunMode::Running);
        assert_eq!(transition.outcome, None);
    }
}
