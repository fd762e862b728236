//! Vertical-only correction.

use crate::config::EstimatorConfig;
use crate::coreg::{store_fit, Coreg};
use crate::sampling::{FitData, FitOptions, Reference};
use crate::stats::{median, nmad};
use crate::transform::{AffineShift, FitMetadata, FittedTransformation, Transform};
use crate::Result;
use demreg_dem::{ElevationSurface, InlierMask};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Statistic used to aggregate residuals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalShiftMethod {
    #[default]
    Median,
    Mean,
}

/// Parameters of the [`VerticalShift`] estimator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerticalShiftParams {
    pub statistic: VerticalShiftMethod,
}

/// Estimates a constant elevation offset.
///
/// With an initial shift, residuals are taken at that horizontal offset and
/// the offset is carried into the result unchanged.
#[derive(Debug, Clone, Default)]
pub struct VerticalShift {
    params: VerticalShiftParams,
    fitted: Option<FittedTransformation>,
}

impl VerticalShift {
    pub fn new(params: VerticalShiftParams) -> Self {
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
        let (shift_x, shift_y) = options.checked_initial_shift()?;
        let data = FitData::prepare(reference, tba, mask, options)?;

        let dh = data.residuals(tba, shift_x, shift_y);
        let sample_count = FitData::check_valid(&dh, options.min_samples)?;
        let shift_z = match self.params.statistic {
            VerticalShiftMethod::Median => median(&dh),
            VerticalShiftMethod::Mean => dh.iter().filter(|v| v.is_finite()).mean(),
        };
        let spread = nmad(&dh);

        Ok(FittedTransformation {
            method: self.name().to_string(),
            transform: Transform::Affine(AffineShift::new(shift_x, shift_y, shift_z)),
            metadata: FitMetadata {
                nmad_before: spread,
                nmad_after: spread,
                ..FitMetadata::from_data(&data, sample_count)
            },
        })
    }
}

impl Coreg for VerticalShift {
    fn name(&self) -> &'static str {
        "VerticalShift"
    }

    fn is_affine(&self) -> bool {
        true
    }

    fn config(&self) -> Vec<EstimatorConfig> {
        vec![EstimatorConfig::VerticalShift(self.params)]
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
