//! Polynomial trend removal.

use crate::config::EstimatorConfig;
use crate::coreg::{store_fit, Coreg};
use crate::sampling::{FitData, FitOptions, Reference};
use crate::stats::nmad;
use crate::transform::{FitMetadata, FittedTransformation, PolynomialSurface, Transform};
use crate::{CoregError, Result};
use demreg_dem::{Bounds, ElevationSurface, InlierMask};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Highest supported polynomial order.
pub const MAX_POLY_ORDER: usize = 5;

/// Parameters of the [`Deramp`] estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerampParams {
    /// Polynomial order; 0 is a constant, 1 a tilted plane.
    pub poly_order: usize,
}

impl Default for DerampParams {
    fn default() -> Self {
        Self { poly_order: 1 }
    }
}

/// Fits a 2-D polynomial to the residuals and adds it back on `apply`.
#[derive(Debug, Clone, Default)]
pub struct Deramp {
    params: DerampParams,
    fitted: Option<FittedTransformation>,
}

impl Deramp {
    pub fn new(params: DerampParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    fn estimate(
        &self,
        reference: &Reference<'_>,
        tba: &ElevationSurface,
        mask: Option<&InlierMask>,
        options: &FitOptions,
    ) -> Result<FittedTransformation> {
        let order = self.params.poly_order;
        if order > MAX_POLY_ORDER {
            return Err(CoregError::InvalidParameter(format!(
                "poly_order must be at most {}, got {}",
                MAX_POLY_ORDER, order
            )));
        }
        if options.initial_shift.is_some() {
            return Err(CoregError::NotAffine("An initial shift".to_string()));
        }
        let data = FitData::prepare(reference, tba, mask, options)?;
        let dh = data.residuals(tba, 0.0, 0.0);
        let sample_count = FitData::check_valid(&dh, options.min_samples)?;

        let (xs, ys, targets): (Vec<f64>, Vec<f64>, Vec<f64>) = data
            .xs
            .iter()
            .zip(&data.ys)
            .zip(&dh)
            .filter(|(_, d)| d.is_finite())
            .map(|((&x, &y), &d)| (x, y, d))
            .fold((Vec::new(), Vec::new(), Vec::new()), |mut acc, (x, y, d)| {
                acc.0.push(x);
                acc.1.push(y);
                acc.2.push(d);
                acc
            });

        let poly = fit_polynomial(&xs, &ys, &targets, order)?;
        let corrected: Vec<f64> = xs
            .iter()
            .zip(&ys)
            .zip(&targets)
            .map(|((&x, &y), &d)| d - poly.evaluate(x, y))
            .collect();

        Ok(FittedTransformation {
            method: self.name().to_string(),
            transform: Transform::Polynomial(poly),
            metadata: FitMetadata {
                nmad_before: nmad(&dh),
                nmad_after: nmad(&corrected),
                ..FitMetadata::from_data(&data, sample_count)
            },
        })
    }
}

/// Least-squares polynomial of `order` through `(x, y, z)` samples.
fn fit_polynomial(xs: &[f64], ys: &[f64], zs: &[f64], order: usize) -> Result<PolynomialSurface> {
    let bounds = Bounds::from_coords(xs, ys)
        .ok_or_else(|| CoregError::InsufficientData { valid: 0, required: 1 })?;
    let center_x = (bounds.min_x + bounds.max_x) / 2.0;
    let center_y = (bounds.min_y + bounds.max_y) / 2.0;
    let half_extent = ((bounds.max_x - bounds.min_x).max(bounds.max_y - bounds.min_y)) / 2.0;
    let scale = if half_extent > 0.0 { half_extent } else { 1.0 };

    let mut poly = PolynomialSurface {
        order,
        coefficients: Vec::new(),
        center_x,
        center_y,
        scale,
    };
    let powers = PolynomialSurface::powers(order);
    let terms = powers.len();

    // Accumulate the normal equations rather than the full design matrix
    let mut ata = DMatrix::<f64>::zeros(terms, terms);
    let mut atb = DVector::<f64>::zeros(terms);
    let mut row = DVector::<f64>::zeros(terms);
    for ((&x, &y), &z) in xs.iter().zip(ys).zip(zs) {
        let (u, v) = poly.normalize(x, y);
        for (k, &(i, j)) in powers.iter().enumerate() {
            row[k] = u.powi(i) * v.powi(j);
        }
        ata += &row * row.transpose();
        atb += &row * z;
    }

    let svd = ata.svd(true, true);
    let largest = svd.singular_values.max();
    let rank = svd
        .singular_values
        .iter()
        .filter(|&&s| s > largest * 1e-12)
        .count();
    if !(largest > 0.0) || rank < terms {
        return Err(CoregError::SingularFit(format!(
            "order {} polynomial needs {} independent samples, design has rank {}",
            order, terms, rank
        )));
    }
    let solution = svd
        .solve(&atb, largest * 1e-15)
        .map_err(|e| CoregError::SingularFit(e.to_string()))?;

    poly.coefficients = solution.iter().copied().collect();
    Ok(poly)
}

impl Coreg for Deramp {
    fn name(&self) -> &'static str {
        "Deramp"
    }

    fn is_affine(&self) -> bool {
        false
    }

    fn config(&self) -> Vec<EstimatorConfig> {
        vec![EstimatorConfig::Deramp(self.params)]
    }

    fn fitted(&self) -> Option<&FittedTransformation> {
        self.fitted.as_ref()
    }

    fn fit(
        &mut self,
        reference: &Reference<'_>,
        tba: &ElevationSurface,
        mask: Option<&InlierMask>,
        options: &FitOptions,
    ) -> Result<&FittedTransformation> {
        let result = self.estimate(reference, tba, mask, options);
        let name = self.name();
        store_fit(&mut self.fitted, name, reference.kind(), options.pipeline_step, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use demreg_dem::{Crs, GeoTransform};

    #[test]
    fn test_fit_plane() {
        let xs: Vec<f64> = (0..50).map(|i| (i % 10) as f64 * 100.0).collect();
        let ys: Vec<f64> = (0..50).map(|i| (i / 10) as f64 * 100.0).collect();
        let zs: Vec<f64> = xs.iter().zip(&ys).map(|(x, y)| 3.0 + 0.01 * x - 0.02 * y).collect();
        let poly = fit_polynomial(&xs, &ys, &zs, 1).unwrap();
        for ((x, y), z) in xs.iter().zip(&ys).zip(&zs) {
            assert_relative_eq!(poly.evaluate(*x, *y), *z, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_collinear_samples_are_singular() {
        let xs: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let ys = xs.clone();
        let zs = vec![1.0; 30];
        let err = fit_polynomial(&xs, &ys, &zs, 1).unwrap_err();
        assert!(matches!(err, CoregError::SingularFit(_)));
    }

    #[test]
    fn test_removes_tilt() {
        let gt = GeoTransform::north_up(0.0, 500.0, 10.0).unwrap();
        let reference = ElevationSurface::filled(50, 50, gt, Crs::Local, 100.0);
        let tilted = ElevationSurface::from_fn(50, 50, gt, Crs::Local, |x, y| 100.0 - 0.01 * x + 0.005 * y);

        let mut deramp = Deramp::default();
        assert!(!deramp.is_affine());
        let aligned = deramp
            .fit_and_apply(&Reference::Surface(&reference), &tilted, None, &FitOptions::seeded(3))
            .unwrap();
        for &v in aligned.data() {
            assert_relative_eq!(v, 100.0, epsilon = 1e-3);
        }
        assert!(deramp.fitted().unwrap().metadata.nmad_after < 1e-3);
    }

    #[test]
    fn test_initial_shift_not_allowed() {
        let gt = GeoTransform::north_up(0.0, 500.0, 10.0).unwrap();
        let surface = ElevationSurface::filled(50, 50, gt, Crs::Local, 100.0);
        let mut deramp = Deramp::default();
        let err = deramp
            .fit(
                &Reference::Surface(&surface),
                &surface,
                None,
                &FitOptions::seeded(3).with_initial_shift(1.0, 1.0),
            )
            .unwrap_err();
        assert!(matches!(err, CoregError::NotAffine(_)));
    }
}
