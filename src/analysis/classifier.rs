//! Gaussian-likelihood classifier over the calibrated object models
//!
//! Each object is a 1-D Gaussian over the smoothed RMS value. The classifier
//! evaluates every density at the current value and keeps the largest.
//!
//! The reported likelihood is a raw probability *density*, not a probability:
//! it is not normalized across objects and can exceed 1 for narrow models.
//! Values are comparable between objects only because every model shares the
//! same functional form.

use std::f64::consts::PI;
use std::fmt;

use crate::store::ModelStore;

/// Label reported when no object is selected
pub const UNKNOWN_LABEL: &str = "unknown";

/// Normal probability density of `value` under N(mean, std^2).
///
/// Returns 0 for a non-positive or non-finite `std`, where the density is
/// undefined.
pub fn gaussian_pdf(mean: f64, std: f64, value: f64) -> f64 {
    if !(std > 0.0) || !std.is_finite() {
        return 0.0;
    }

    let z = (value - mean) / std;
    1.0 / (std * (2.0 * PI).sqrt()) * (-0.5 * z * z).exp()
}

/// Result of classifying one smoothed value
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Best matching object, `None` when nothing beat a density of 0
    pub name: Option<String>,
    /// Unnormalized density of the best match
    pub likelihood: f64,
}

impl Classification {
    pub fn unknown() -> Self {
        Self {
            name: None,
            likelihood: 0.0,
        }
    }

    /// Object name, or "unknown"
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_LABEL)
    }

    pub fn is_unknown(&self) -> bool {
        self.name.is_none()
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.3})", self.label(), self.likelihood)
    }
}

/// Pick the object with the highest density at `value`.
///
/// Scanning starts from "unknown" with likelihood 0 and only a strictly larger
/// density replaces the current best, so on exact ties the object configured
/// first wins.
pub fn classify(value: f64, models: &ModelStore) -> Classification {
    let mut best = Classification::unknown();

    for (name, model) in models.iter() {
        let likelihood = gaussian_pdf(model.mean(), model.std(), value);
        if likelihood > best.likelihood {
            best.name = Some(name.to_string());
            best.likelihood = likelihood;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ObjectModel, DEFAULT_STD_FLOOR};

    fn store(models: &[(&str, f64, f64)]) -> ModelStore {
        ModelStore::from_models(
            models.iter().map(|&(name, mean, std)| {
                let key = name.chars().next().unwrap_or('?');
                (name, ObjectModel::with_stats(key, mean, std, DEFAULT_STD_FLOOR))
            }),
            DEFAULT_STD_FLOOR,
        )
    }

    #[test]
    fn test_pdf_peak() {
        let peak = gaussian_pdf(0.0, 1.0, 0.0);
        assert!((peak - 1.0 / (2.0 * PI).sqrt()).abs() < 1e-12);

        let narrow = gaussian_pdf(0.05, 0.01, 0.05);
        assert!((narrow - 39.894228040143275).abs() < 1e-9);
    }

    #[test]
    fn test_pdf_guards_degenerate_std() {
        assert_eq!(gaussian_pdf(0.0, 0.0, 0.0), 0.0);
        assert_eq!(gaussian_pdf(0.0, -1.0, 0.0), 0.0);
        assert_eq!(gaussian_pdf(0.0, f64::NAN, 0.0), 0.0);
    }

    #[test]
    fn test_pdf_decreases_with_distance() {
        let (mean, std) = (0.1, 0.02);
        let mut previous = f64::INFINITY;
        for step in 0..20 {
            let offset = step as f64 * 0.005;
            let above = gaussian_pdf(mean, std, mean + offset);
            let below = gaussian_pdf(mean, std, mean - offset);
            assert!(above < previous || step == 0);
            assert!((above - below).abs() < 1e-9);
            previous = above;
        }
    }

    #[test]
    fn test_empty_store_is_unknown() {
        let result = classify(0.3, &store(&[]));
        assert!(result.is_unknown());
        assert_eq!(result.label(), UNKNOWN_LABEL);
        assert_eq!(result.likelihood, 0.0);
    }

    #[test]
    fn test_tie_goes_to_first_object() {
        let models = store(&[("first", 0.0, 1.0), ("second", 0.0, 1.0)]);
        let result = classify(0.4, &models);
        assert_eq!(result.name.as_deref(), Some("first"));

        let reversed = store(&[("second", 0.0, 1.0), ("first", 0.0, 1.0)]);
        assert_eq!(classify(0.4, &reversed).name.as_deref(), Some("second"));
    }

    #[test]
    fn test_picks_nearest_equal_width_model() {
        let models = store(&[("1", 0.05, 0.01), ("2", 0.10, 0.01)]);

        let near_one = classify(0.051, &models);
        assert_eq!(near_one.label(), "1");
        assert!((near_one.likelihood - 39.695254747701185).abs() < 1e-9);

        assert_eq!(classify(0.099, &models).label(), "2");
    }

    #[test]
    fn test_equidistant_value_resolved_by_rounding() {
        // (0.075 - 0.05) / 0.01 rounds just below 2.5, (0.075 - 0.10) / 0.01
        // just above -2.5, so object "1" has the marginally larger density.
        let models = store(&[("1", 0.05, 0.01), ("2", 0.10, 0.01)]);
        let p1 = gaussian_pdf(0.05, 0.01, 0.075);
        let p2 = gaussian_pdf(0.10, 0.01, 0.075);
        assert!(p1 > p2);
        assert_eq!(classify(0.075, &models).label(), "1");
    }

    #[test]
    fn test_wider_model_wins_far_from_both() {
        let models = store(&[("narrow", 0.0, 0.01), ("wide", 0.0, 1.0)]);
        assert_eq!(classify(0.5, &models).label(), "wide");
        assert_eq!(classify(0.0, &models).label(), "narrow");
    }

    #[test]
    fn test_all_zero_densities_stay_unknown() {
        let models = store(&[("far", 1000.0, 0.001)]);
        let result = classify(0.0, &models);
        assert!(result.is_unknown());
    }
}
