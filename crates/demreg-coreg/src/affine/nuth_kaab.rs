//! Iterative translation estimate from the slope/aspect dependence of
//! elevation residuals (Nuth and Kääb, 2011).
//!
//! A horizontal offset `r` between two surfaces produces residuals
//! `dh ≈ |∇z| (r_x sin ψ + r_y cos ψ) + dz`, where `ψ` is the downslope
//! aspect. Dividing the de-medianed residuals by the slope tangent gives a
//! linear model in `cos ψ` and `sin ψ` whose coefficients are the remaining
//! offset. Each iteration resamples at the accumulated shift and solves for
//! the next increment.

use crate::config::EstimatorConfig;
use crate::coreg::{store_fit, Coreg};
use crate::sampling::{FitData, FitOptions, Reference};
use crate::stats::{median, nmad};
use crate::transform::{AffineShift, FitMetadata, FittedTransformation, Transform};
use crate::{CoregError, Result};
use demreg_dem::terrain::Gradient;
use demreg_dem::{ElevationSurface, InlierMask};
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Residuals further than this many NMADs from the median are ignored in
/// the horizontal solve.
const OUTLIER_NMAD_FACTOR: f64 = 3.0;

/// Parameters of the [`NuthKaab`] estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NuthKaabParams {
    /// Iteration cap.
    pub max_iterations: usize,
    /// Stop when the shift increment is below this many pixels.
    pub offset_threshold: f64,
    /// Samples flatter than this are excluded from the horizontal solve.
    pub min_slope_degrees: f64,
}

impl Default for NuthKaabParams {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            offset_threshold: 0.01,
            min_slope_degrees: 1.0,
        }
    }
}

impl NuthKaabParams {
    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(CoregError::InvalidParameter(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.offset_threshold > 0.0) {
            return Err(CoregError::InvalidParameter(format!(
                "offset_threshold must be positive, got {}",
                self.offset_threshold
            )));
        }
        if !(0.0..90.0).contains(&self.min_slope_degrees) {
            return Err(CoregError::InvalidParameter(format!(
                "min_slope_degrees must be in [0, 90), got {}",
                self.min_slope_degrees
            )));
        }
        Ok(())
    }
}

/// Accumulated horizontal shift, carried from one iteration to the next.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ShiftState {
    x: f64,
    y: f64,
    iteration: usize,
}

impl ShiftState {
    fn start((x, y): (f64, f64)) -> Self {
        Self { x, y, iteration: 0 }
    }

    fn advance(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            iteration: self.iteration + 1,
        }
    }

    fn hold(self) -> Self {
        Self {
            iteration: self.iteration + 1,
            ..self
        }
    }
}

/// Translation estimator.
#[derive(Debug, Clone, Default)]
pub struct NuthKaab {
    params: NuthKaabParams,
    fitted: Option<FittedTransformation>,
}

impl NuthKaab {
    pub fn new(params: NuthKaabParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    pub fn params(&self) -> &NuthKaabParams {
        &self.params
    }

    fn estimate(
        &self,
        reference: &Reference<'_>,
        tba: &ElevationSurface,
        mask: Option<&InlierMask>,
        options: &FitOptions,
    ) -> Result<FittedTransformation> {
        self.params.validate()?;
        let initial = options.checked_initial_shift()?;
        let data = FitData::prepare(reference, tba, mask, options)?;

        let gradient = Gradient::horn(tba);
        let resolution = tba.transform().mean_resolution();
        let min_tan = self.params.min_slope_degrees.to_radians().tan();

        let mut state = ShiftState::start(initial);
        let mut converged = false;
        let mut nmad_before = f64::NAN;

        while state.iteration < self.params.max_iterations {
            let dh = data.residuals(tba, state.x, state.y);
            FitData::check_valid(&dh, options.min_samples)?;
            if state.iteration == 0 {
                nmad_before = nmad(&dh);
            }

            let gradients = sample_gradients(&gradient, &data, state.x, state.y);
            match solve_increment(&dh, &gradients, min_tan, options.min_samples)? {
                None => {
                    log::warn!(
                        "Too few samples steeper than {} degrees, horizontal shift left at ({:.3}, {:.3})",
                        self.params.min_slope_degrees,
                        state.x,
                        state.y
                    );
                    state = state.hold();
                    converged = true;
                    break;
                }
                Some((dx, dy)) => {
                    state = state.advance(dx, dy);
                    let step_pixels = dx.hypot(dy) / resolution;
                    log::debug!(
                        "Iteration {}: increment ({:.4}, {:.4}), shift ({:.4}, {:.4})",
                        state.iteration,
                        dx,
                        dy,
                        state.x,
                        state.y
                    );
                    if step_pixels < self.params.offset_threshold {
                        converged = true;
                        break;
                    }
                }
            }
        }

        if !converged {
            log::warn!(
                "NuthKaab did not converge within {} iterations, keeping shift ({:.3}, {:.3})",
                self.params.max_iterations,
                state.x,
                state.y
            );
        }

        let dh = data.residuals(tba, state.x, state.y);
        let sample_count = FitData::check_valid(&dh, options.min_samples)?;
        let shift_z = median(&dh);

        Ok(FittedTransformation {
            method: self.name().to_string(),
            transform: Transform::Affine(AffineShift::new(state.x, state.y, shift_z)),
            metadata: FitMetadata {
                iterations: state.iteration,
                converged,
                nmad_before,
                nmad_after: nmad(&dh),
                ..FitMetadata::from_data(&data, sample_count)
            },
        })
    }
}

/// Surface gradient at each sample moved back by the current shift.
fn sample_gradients(gradient: &Gradient, data: &FitData, shift_x: f64, shift_y: f64) -> Vec<(f64, f64)> {
    data.xs
        .par_iter()
        .zip(data.ys.par_iter())
        .map(|(&x, &y)| {
            gradient
                .sample(x - shift_x, y - shift_y)
                .unwrap_or((f64::NAN, f64::NAN))
        })
        .collect()
}

/// Least-squares horizontal increment `(dx, dy)`.
///
/// Returns `None` when fewer than `min_samples` sloped samples remain.
fn solve_increment(
    dh: &[f64],
    gradients: &[(f64, f64)],
    min_tan: f64,
    min_samples: usize,
) -> Result<Option<(f64, f64)>> {
    let med = median(dh);

    // (cos ψ, sin ψ, normalized residual)
    let rows: Vec<(f64, f64, f64)> = dh
        .iter()
        .zip(gradients)
        .filter_map(|(&d, &(gx, gy))| {
            let tan_slope = gx.hypot(gy);
            if !(d.is_finite() && tan_slope.is_finite()) || tan_slope < min_tan || tan_slope == 0.0 {
                return None;
            }
            Some((-gy / tan_slope, -gx / tan_slope, (d - med) / tan_slope))
        })
        .collect();

    let targets: Vec<f64> = rows.iter().map(|r| r.2).collect();
    let target_median = median(&targets);
    let spread = nmad(&targets);
    let rows: Vec<&(f64, f64, f64)> = rows
        .iter()
        .filter(|r| !(spread > 0.0) || (r.2 - target_median).abs() <= OUTLIER_NMAD_FACTOR * spread)
        .collect();

    if rows.len() < min_samples.max(3) {
        return Ok(None);
    }

    let mut ata = Matrix3::<f64>::zeros();
    let mut atb = Vector3::<f64>::zeros();
    for &&(cos, sin, target) in &rows {
        let r = Vector3::new(cos, sin, 1.0);
        ata += r * r.transpose();
        atb += r * target;
    }

    let singular_values = ata.singular_values();
    let largest = singular_values.max();
    if !(largest > 0.0) || singular_values.min() <= largest * 1e-10 {
        return Err(CoregError::SingularFit(
            "aspects of sloped samples do not span two directions".to_string(),
        ));
    }
    let solution = ata
        .cholesky()
        .ok_or_else(|| CoregError::SingularFit("normal equations not positive definite".to_string()))?
        .solve(&atb);

    // a·cos ψ + b·sin ψ + c with a = remaining y offset, b = remaining x offset
    let (a, b) = (solution[0], solution[1]);
    if !(a.is_finite() && b.is_finite()) {
        return Err(CoregError::SingularFit("non-finite solution".to_string()));
    }
    Ok(Some((b, a)))
}

impl Coreg for NuthKaab {
    fn name(&self) -> &'static str {
        "NuthKaab"
    }

    fn is_affine(&self) -> bool {
        true
    }

    fn config(&self) -> Vec<EstimatorConfig> {
        vec![EstimatorConfig::NuthKaab(self.params)]
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
    fn test_shift_state_accumulates() {
        let state = ShiftState::start((1.0, -1.0)).advance(0.5, 0.25).advance(-0.1, 0.0);
        assert_eq!(state.iteration, 2);
        assert_relative_eq!(state.x, 1.4);
        assert_relative_eq!(state.y, -0.75);
        assert_eq!(state.hold().iteration, 3);
    }

    #[test]
    fn test_solve_increment_recovers_offset() {
        // Residuals generated from a pure offset of (2, -3) on slopes of 0.5
        let (rx, ry) = (2.0, -3.0);
        let mut dh = Vec::new();
        let mut gradients = Vec::new();
        for k in 0..72 {
            let psi = (k as f64 * 5.0).to_radians();
            let (gx, gy) = (-0.5 * psi.sin(), -0.5 * psi.cos());
            gradients.push((gx, gy));
            dh.push(-(gx * rx + gy * ry) + 7.0);
        }
        let (dx, dy) = solve_increment(&dh, &gradients, 0.01, 20).unwrap().unwrap();
        assert_relative_eq!(dx, rx, epsilon = 1e-9);
        assert_relative_eq!(dy, ry, epsilon = 1e-9);
    }

    #[test]
    fn test_solve_increment_flat() {
        let dh = vec![5.0; 50];
        let gradients = vec![(0.0, 0.0); 50];
        assert!(solve_increment(&dh, &gradients, 0.01, 20).unwrap().is_none());
    }

    #[test]
    fn test_solve_increment_single_aspect_is_singular() {
        let dh: Vec<f64> = (0..50).map(|i| i as f64 * 0.1).collect();
        let gradients = vec![(0.3, 0.0); 50];
        let err = solve_increment(&dh, &gradients, 0.01, 20).unwrap_err();
        assert!(matches!(err, CoregError::SingularFit(_)));
    }

    #[test]
    fn test_invalid_params() {
        let gt = GeoTransform::north_up(0.0, 100.0, 10.0).unwrap();
        let surface = ElevationSurface::filled(10, 10, gt, Crs::Local, 1.0);
        let mut coreg = NuthKaab::new(NuthKaabParams {
            max_iterations: 0,
            ..NuthKaabParams::default()
        });
        let err = coreg
            .fit(&Reference::Surface(&surface), &surface, None, &FitOptions::seeded(0))
            .unwrap_err();
        assert!(matches!(err, CoregError::InvalidParameter(_)));
        assert!(coreg.fitted().is_none());
    }
}
