//! Block reduction: per-block RMS and the rolling histories built from it

use std::collections::VecDeque;
use tracing::trace;

use crate::config::SignalConfig;

/// Root-mean-square of a block, taken about zero.
///
/// Computed about zero, not about the block mean: a DC offset in the block
/// contributes to the result.
/// An empty block reduces to 0.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_squares / samples.len() as f64).sqrt()
}

/// Value fed to the classifier.
///
/// Mean of the last `window` values once that many are available, otherwise
/// the most recent value unchanged. `None` for an empty history.
pub fn smooth(history: &VecDeque<f64>, window: usize) -> Option<f64> {
    let last = *history.back()?;
    if window == 0 || history.len() < window {
        return Some(last);
    }

    let sum: f64 = history.iter().rev().take(window).sum();
    Some(sum / window as f64)
}

/// Output of reducing one block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reduction {
    /// RMS of this block alone
    pub raw: f64,
    /// Moving average used for classification
    pub smoothed: f64,
}

/// Maintains the bounded reduced-value history and its running average
#[derive(Debug, Clone)]
pub struct SignalReducer {
    window: usize,
    capacity: usize,
    reduced: VecDeque<f64>,
    running_average: VecDeque<f64>,
}

impl SignalReducer {
    pub fn new(config: &SignalConfig) -> Self {
        Self::with_window(config.average_window, config.buffer_length)
    }

    pub fn with_window(window: usize, capacity: usize) -> Self {
        Self {
            window,
            capacity,
            reduced: VecDeque::with_capacity(capacity + 1),
            running_average: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Reduce a block and fold it into the histories
    pub fn process(&mut self, samples: &[f32]) -> Reduction {
        let raw = rms(samples);
        let smoothed = self.push(raw);
        Reduction { raw, smoothed }
    }

    /// Append an already-reduced value; returns the smoothed value
    pub fn push(&mut self, value: f64) -> f64 {
        self.reduced.push_back(value);
        while self.reduced.len() > self.capacity {
            self.reduced.pop_front();
        }

        let smoothed = smooth(&self.reduced, self.window).unwrap_or(value);

        if self.reduced.len() > self.window {
            self.running_average.push_back(smoothed);
            while self.running_average.len() > self.capacity {
                self.running_average.pop_front();
            }
        }

        trace!("reduced {:.6} -> smoothed {:.6}", value, smoothed);
        smoothed
    }

    /// Current classification value, if any block has been seen
    pub fn smoothed(&self) -> Option<f64> {
        smooth(&self.reduced, self.window)
    }

    pub fn reduced_history(&self) -> &VecDeque<f64> {
        &self.reduced
    }

    pub fn running_average_history(&self) -> &VecDeque<f64> {
        &self.running_average
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(values: &[f64]) -> VecDeque<f64> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_rms_matches_definition() {
        let samples = [0.5f32, -0.5, 0.5, -0.5];
        assert!((rms(&samples) - 0.5).abs() < 1e-12);

        let samples = [3.0f32, 4.0];
        let expected = ((9.0 + 16.0) / 2.0f64).sqrt();
        assert!((rms(&samples) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rms_includes_dc_offset() {
        // Constant block: std-dev would be 0, RMS is the offset itself
        let samples = vec![0.25f32; 64];
        assert!((rms(&samples) - 0.25).abs() < 1e-9);

        let negative = vec![-0.25f32; 64];
        assert!((rms(&negative) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_rms_non_negative_and_empty() {
        assert_eq!(rms(&[]), 0.0);
        let samples: Vec<f32> = (0..100).map(|i| ((i as f32) * 0.37).sin() - 0.3).collect();
        assert!(rms(&samples) >= 0.0);
    }

    #[test]
    fn test_smooth_short_history_returns_last() {
        assert_eq!(smooth(&history(&[]), 30), None);
        assert_eq!(smooth(&history(&[1.0, 2.0, 7.0]), 30), Some(7.0));

        let values: Vec<f64> = (0..29).map(|i| i as f64).collect();
        assert_eq!(smooth(&history(&values), 30), Some(28.0));
    }

    #[test]
    fn test_smooth_uses_last_window() {
        let values: Vec<f64> = (0..30).map(|i| i as f64).collect();
        assert_eq!(smooth(&history(&values), 30), Some(14.5));

        // 40 values: mean of 10..40
        let values: Vec<f64> = (0..40).map(|i| i as f64).collect();
        assert_eq!(smooth(&history(&values), 30), Some(24.5));
    }

    #[test]
    fn test_reduced_history_is_capped() {
        let mut reducer = SignalReducer::with_window(30, 100);
        for i in 0..150 {
            reducer.push(i as f64);
        }
        let reduced = reducer.reduced_history();
        assert_eq!(reduced.len(), 100);
        assert_eq!(reduced.front(), Some(&50.0));
        assert_eq!(reduced.back(), Some(&149.0));
    }

    #[test]
    fn test_running_average_starts_after_window() {
        let mut reducer = SignalReducer::with_window(30, 100);
        for i in 0..30 {
            reducer.push(i as f64);
        }
        assert!(reducer.running_average_history().is_empty());

        reducer.push(30.0);
        assert_eq!(reducer.running_average_history().len(), 1);
        // mean of 1..=30
        assert_eq!(reducer.running_average_history()[0], 15.5);
    }

    #[test]
    fn test_running_average_is_capped() {
        let mut reducer = SignalReducer::with_window(30, 100);
        for i in 0..300 {
            reducer.push(i as f64);
        }
        assert_eq!(reducer.running_average_history().len(), 100);
        assert_eq!(
            reducer.running_average_history().back().copied(),
            reducer.smoothed()
        );
    }

    #[test]
    fn test_process_reports_raw_and_smoothed() {
        let mut reducer = SignalReducer::with_window(2, 10);
        let first = reducer.process(&[1.0, -1.0]);
        assert_eq!(first.raw, 1.0);
        assert_eq!(first.smoothed, 1.0);

        let second = reducer.process(&[3.0, -3.0]);
        assert_eq!(second.raw, 3.0);
        assert_eq!(second.smoothed, 2.0);
    }
}
