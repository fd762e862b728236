//! Robust statistics of elevation residuals.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};

/// Scale factor making the MAD a consistent estimator of a normal sigma.
pub const NMAD_SCALE: f64 = 1.4826;

/// Median of the finite values, NaN when there are none.
pub fn median(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    Data::new(finite).median()
}

/// Normalized median absolute deviation of the finite values.
pub fn nmad(values: &[f64]) -> f64 {
    let med = median(values);
    if med.is_nan() {
        return f64::NAN;
    }
    let deviations: Vec<f64> = values
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| (v - med).abs())
        .collect();
    NMAD_SCALE * median(&deviations)
}

/// Summary of a residual distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualStats {
    /// Number of finite residuals.
    pub count: usize,
    /// Median residual.
    pub median: f64,
    /// Normalized median absolute deviation.
    pub nmad: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation.
    pub std: f64,
    /// Root mean square.
    pub rmse: f64,
}

impl ResidualStats {
    /// Compute statistics over the finite values.
    pub fn from_residuals(values: &[f64]) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Self {
                count: 0,
                median: f64::NAN,
                nmad: f64::NAN,
                mean: f64::NAN,
                std: f64::NAN,
                rmse: f64::NAN,
            };
        }
        let rmse = (finite.iter().map(|v| v * v).sum::<f64>() / finite.len() as f64).sqrt();
        Self {
            count: finite.len(),
            median: median(&finite),
            nmad: nmad(&finite),
            mean: finite.iter().mean(),
            std: if finite.len() > 1 { finite.iter().std_dev() } else { 0.0 },
            rmse,
        }
    }
}

impl std::fmt::Display for ResidualStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "n={} median={:.3} nmad={:.3} mean={:.3} std={:.3} rmse={:.3}",
            self.count, self.median, self.nmad, self.mean, self.std, self.rmse
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median_ignores_nan() {
        assert_relative_eq!(median(&[3.0, f64::NAN, 1.0, 2.0]), 2.0);
        assert_relative_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!(median(&[f64::NAN]).is_nan());
    }

    #[test]
    fn test_nmad() {
        // |x - 3| = [2, 1, 0, 1, 97] -> MAD 1
        assert_relative_eq!(nmad(&[1.0, 2.0, 3.0, 4.0, 100.0]), NMAD_SCALE);
        assert_relative_eq!(nmad(&[5.0; 10]), 0.0);
    }

    #[test]
    fn test_residual_stats() {
        let stats = ResidualStats::from_residuals(&[1.0, -1.0, 1.0, -1.0, f64::NAN]);
        assert_eq!(stats.count, 4);
        assert_relative_eq!(stats.mean, 0.0);
        assert_relative_eq!(stats.rmse, 1.0);
        assert_relative_eq!(stats.median, 0.0);

        let empty = ResidualStats::from_residuals(&[]);
        assert_eq!(empty.count, 0);
        assert!(empty.median.is_nan());
    }
}
