//! Translation found by directly minimizing the spread of residuals.

use crate::config::EstimatorConfig;
use crate::coreg::{store_fit, Coreg};
use crate::sampling::{FitData, FitOptions, Reference};
use crate::stats::{median, nmad};
use crate::transform::{AffineShift, FitMetadata, FittedTransformation, Transform};
use crate::{CoregError, Result};
use argmin::core::{CostFunction, Error, Executor, State, TerminationReason};
use argmin::solver::neldermead::NelderMead;
use demreg_dem::{ElevationSurface, InlierMask};
use serde::{Deserialize, Serialize};

/// Parameters of the [`DhMinimize`] estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DhMinimizeParams {
    /// Iteration cap of the simplex search.
    pub max_iterations: u64,
    /// Stop when the simplex cost spread falls below this value (metres).
    pub tolerance: f64,
}

impl Default for DhMinimizeParams {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-4,
        }
    }
}

/// NMAD of residuals as a function of the shift in pixels.
struct NmadCost<'a> {
    data: &'a FitData,
    tba: &'a ElevationSurface,
    resolution: f64,
    min_samples: usize,
}

impl CostFunction for NmadCost<'_> {
    type Param = Vec<f64>; // [shift_x, shift_y] in pixels
    type Output = f64;

    fn cost(&self, p: &Self::Param) -> std::result::Result<Self::Output, Error> {
        let dh = self
            .data
            .residuals(self.tba, p[0] * self.resolution, p[1] * self.resolution);
        // Shifts that push too many samples off the grid are infeasible
        if dh.iter().filter(|v| v.is_finite()).count() < self.min_samples {
            return Ok(f64::INFINITY);
        }
        Ok(nmad(&dh))
    }
}

/// Minimizes the NMAD of residuals over the horizontal shift with a
/// Nelder-Mead simplex, then sets the vertical shift to the median residual.
#[derive(Debug, Clone, Default)]
pub struct DhMinimize {
    params: DhMinimizeParams,
    fitted: Option<FittedTransformation>,
}

impl DhMinimize {
    pub fn new(params: DhMinimizeParams) -> Self {
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
        if self.params.max_iterations == 0 || !(self.params.tolerance > 0.0) {
            return Err(CoregError::InvalidParameter(format!(
                "DhMinimize needs max_iterations > 0 and tolerance > 0, got {:?}",
                self.params
            )));
        }
        let (x0, y0) = options.checked_initial_shift()?;
        let data = FitData::prepare(reference, tba, mask, options)?;
        let resolution = tba.transform().mean_resolution();

        let initial = data.residuals(tba, x0, y0);
        FitData::check_valid(&initial, options.min_samples)?;
        let nmad_before = nmad(&initial);

        let cost = NmadCost {
            data: &data,
            tba,
            resolution,
            min_samples: options.min_samples,
        };
        let (px, py) = (x0 / resolution, y0 / resolution);
        let solver = NelderMead::new(vec![
            vec![px, py],
            vec![px + 1.0, py],
            vec![px, py + 1.0],
        ])
        .with_sd_tolerance(self.params.tolerance)
        .map_err(|e| CoregError::InvalidParameter(e.to_string()))?;

        let res = Executor::new(cost, solver)
            .configure(|state| state.max_iters(self.params.max_iterations))
            .run()
            .map_err(|e| CoregError::OptimizationFailed(e.to_string()))?;

        let state = res.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| CoregError::OptimizationFailed("No solution found".to_string()))?;
        let (shift_x, shift_y) = (best[0] * resolution, best[1] * resolution);
        let converged = matches!(
            state.get_termination_reason(),
            Some(TerminationReason::SolverConverged)
        );
        let iterations = state.get_iter() as usize;
        if !converged {
            log::warn!(
                "DhMinimize stopped after {} iterations without converging, keeping shift ({:.3}, {:.3})",
                iterations,
                shift_x,
                shift_y
            );
        }

        let dh = data.residuals(tba, shift_x, shift_y);
        let sample_count = FitData::check_valid(&dh, options.min_samples)?;

        Ok(FittedTransformation {
            method: self.name().to_string(),
            transform: Transform::Affine(AffineShift::new(shift_x, shift_y, median(&dh))),
            metadata: FitMetadata {
                iterations,
                converged,
                nmad_before,
                nmad_after: nmad(&dh),
                ..FitMetadata::from_data(&data, sample_count)
            },
        })
    }
}

impl Coreg for DhMinimize {
    fn name(&self) -> &'static str {
        "DhMinimize"
    }

    fn is_affine(&self) -> bool {
        true
    }

    fn config(&self) -> Vec<EstimatorConfig> {
        vec![EstimatorConfig::DhMinimize(self.params)]
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

    #[test]
    fn test_rejects_bad_params() {
        use demreg_dem::{Crs, GeoTransform};
        let gt = GeoTransform::north_up(0.0, 100.0, 10.0).unwrap();
        let surface = ElevationSurface::filled(10, 10, gt, Crs::Local, 0.0);
        let mut coreg = DhMinimize::new(DhMinimizeParams {
            tolerance: 0.0,
            ..DhMinimizeParams::default()
        });
        let err = coreg
            .fit(&Reference::Surface(&surface), &surface, None, &FitOptions::seeded(1))
            .unwrap_err();
        assert!(matches!(err, CoregError::InvalidParameter(_)));
    }
}
