//! Sequential composition of estimators.

use crate::config::EstimatorConfig;
use crate::coreg::{store_fit, Coreg};
use crate::sampling::{FitOptions, Reference};
use crate::transform::{FitMetadata, FittedTransformation, Transform};
use crate::{CoregError, Result};
use demreg_dem::{ElevationSurface, InlierMask};
use rand::Rng;

/// Ordered list of estimators.
///
/// Step `k` is fitted on the surface produced by applying steps `0..k`.
/// The initial shift is handed to the first step only.
#[derive(Debug, Default)]
pub struct CoregPipeline {
    steps: Vec<Box<dyn Coreg>>,
    fitted: Option<FittedTransformation>,
}

impl CoregPipeline {
    pub fn new(steps: Vec<Box<dyn Coreg>>) -> Self {
        Self {
            steps,
            fitted: None,
        }
    }

    /// Append a step.
    pub fn then(mut self, step: impl Coreg + 'static) -> Self {
        self.steps.push(Box::new(step));
        self.fitted = None;
        self
    }

    pub fn steps(&self) -> &[Box<dyn Coreg>] {
        &self.steps
    }

    fn estimate(
        &mut self,
        reference: &Reference<'_>,
        tba: &ElevationSurface,
        mask: Option<&InlierMask>,
        options: &FitOptions,
    ) -> Result<FittedTransformation> {
        let Some(first) = self.steps.first() else {
            return Err(CoregError::InvalidParameter("pipeline has no steps".to_string()));
        };
        if options.initial_shift.is_some() && !first.is_affine() {
            return Err(CoregError::NotAffine(format!(
                "An initial shift for pipeline step '{}'",
                first.name()
            )));
        }

        // One seed for every step so the whole pipeline is reproducible
        let random_state = options
            .random_state
            .unwrap_or_else(|| rand::thread_rng().gen());

        let last = self.steps.len() - 1;
        let mut current = tba.clone();
        let mut transforms = Vec::with_capacity(self.steps.len());
        let mut metadata: Option<FitMetadata> = None;

        for (k, step) in self.steps.iter_mut().enumerate() {
            let step_options = FitOptions {
                random_state: Some(random_state),
                initial_shift: if k == 0 { options.initial_shift } else { None },
                pipeline_step: Some(k),
                ..options.clone()
            };
            log::debug!("Fitting pipeline step {} ({})", k, step.name());
            let fitted = step.fit(reference, &current, mask, &step_options)?;
            transforms.push(fitted.transform.clone());
            let step_meta = &fitted.metadata;

            metadata = Some(match metadata {
                None => step_meta.clone(),
                Some(acc) => FitMetadata {
                    sample_count: step_meta.sample_count,
                    iterations: acc.iterations + step_meta.iterations,
                    converged: acc.converged && step_meta.converged,
                    nmad_after: step_meta.nmad_after,
                    ..acc
                },
            });

            if k < last {
                current = step.apply(&current)?;
            }
        }

        let metadata = metadata
            .ok_or_else(|| CoregError::InvalidParameter("pipeline has no steps".to_string()))?;
        Ok(FittedTransformation {
            method: self.name().to_string(),
            transform: Transform::Chain { steps: transforms },
            metadata,
        })
    }
}

impl Coreg for CoregPipeline {
    fn name(&self) -> &'static str {
        "CoregPipeline"
    }

    fn is_affine(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.is_affine())
    }

    fn config(&self) -> Vec<EstimatorConfig> {
        self.steps.iter().flat_map(|s| s.config()).collect()
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
        let kind = reference.kind();
        store_fit(&mut self.fitted, "CoregPipeline", kind, options.pipeline_step, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affine::{NuthKaab, VerticalShift};
    use crate::deramp::Deramp;
    use approx::assert_relative_eq;
    use demreg_dem::{Crs, GeoTransform};

    #[test]
    fn test_affinity() {
        let affine = CoregPipeline::default()
            .then(NuthKaab::default())
            .then(VerticalShift::default());
        assert!(affine.is_affine());
        assert_eq!(affine.config().len(), 2);

        let mixed = CoregPipeline::default()
            .then(VerticalShift::default())
            .then(Deramp::default());
        assert!(!mixed.is_affine());
        assert!(!CoregPipeline::default().is_affine());
    }

    #[test]
    fn test_empty_pipeline() {
        let gt = GeoTransform::north_up(0.0, 100.0, 10.0).unwrap();
        let surface = ElevationSurface::filled(10, 10, gt, Crs::Local, 1.0);
        let mut pipeline = CoregPipeline::default();
        let err = pipeline
            .fit(&Reference::Surface(&surface), &surface, None, &FitOptions::seeded(0))
            .unwrap_err();
        assert!(matches!(err, CoregError::InvalidParameter(_)));
    }

    #[test]
    fn test_initial_shift_requires_affine_first_step() {
        let gt = GeoTransform::north_up(0.0, 100.0, 10.0).unwrap();
        let surface = ElevationSurface::filled(10, 10, gt, Crs::Local, 1.0);
        let mut pipeline = CoregPipeline::default()
            .then(Deramp::default())
            .then(VerticalShift::default());
        let err = pipeline
            .fit(
                &Reference::Surface(&surface),
                &surface,
                None,
                &FitOptions::seeded(0).with_initial_shift(5.0, 0.0),
            )
            .unwrap_err();
        assert!(matches!(err, CoregError::NotAffine(_)));
    }

    #[test]
    fn test_vertical_steps_sum() {
        let gt = GeoTransform::north_up(0.0, 200.0, 10.0).unwrap();
        let tba = ElevationSurface::filled(20, 20, gt, Crs::Local, 990.0);
        let reference = ElevationSurface::filled(20, 20, gt, Crs::Local, 1000.0);
        let mut pipeline = CoregPipeline::default()
            .then(VerticalShift::default())
            .then(VerticalShift::default());
        let fitted = pipeline
            .fit(&Reference::Surface(&reference), &tba, None, &FitOptions::seeded(0))
            .unwrap();
        let params = fitted.parameters();
        assert_relative_eq!(params["shift_z"], 10.0, epsilon = 1e-6);
        assert_eq!(fitted.metadata.iterations, 2);
        assert_eq!(fitted.metadata.random_state, 0);
    }
}
