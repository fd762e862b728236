//! The estimator interface shared by every coregistration method.

use crate::config::EstimatorConfig;
use crate::sampling::{FitOptions, Reference};
use crate::transform::{ApplyMode, FittedTransformation, ReferenceKind};
use crate::{CoregError, Result};
use demreg_dem::{ElevationSurface, InlierMask};
use demreg_metrics::{metric_defs, FitLabels};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A coregistration method: `fit` once, then `apply` any number of times.
///
/// Only `fit` mutates the estimator. A failed fit clears any previous
/// result, so [`Coreg::info`] always describes the most recent call.
pub trait Coreg: Send + Sync + fmt::Debug {
    /// Method name, e.g. `"NuthKaab"`.
    fn name(&self) -> &'static str;

    /// Whether the method is a rigid translation.
    fn is_affine(&self) -> bool;

    /// Configuration of this method (one entry per step).
    fn config(&self) -> Vec<EstimatorConfig>;

    /// Result of the last successful fit.
    fn fitted(&self) -> Option<&FittedTransformation>;

    /// Estimate the correction aligning `tba` to `reference`.
    fn fit(
        &mut self,
        reference: &Reference<'_>,
        tba: &ElevationSurface,
        mask: Option<&InlierMask>,
        options: &FitOptions,
    ) -> Result<&FittedTransformation>;

    /// Aligned copy of `surface`, resampled onto its own grid.
    fn apply(&self, surface: &ElevationSurface) -> Result<ElevationSurface> {
        self.apply_with(surface, ApplyMode::Resample)
    }

    /// Aligned copy of `surface` using the given mode.
    fn apply_with(&self, surface: &ElevationSurface, mode: ApplyMode) -> Result<ElevationSurface> {
        self.fitted()
            .ok_or_else(|| CoregError::NotFitted(self.name().to_string()))?
            .apply(surface, mode)
    }

    /// Fit on `tba`, then return it aligned.
    fn fit_and_apply(
        &mut self,
        reference: &Reference<'_>,
        tba: &ElevationSurface,
        mask: Option<&InlierMask>,
        options: &FitOptions,
    ) -> Result<ElevationSurface> {
        self.fit(reference, tba, mask, options)?;
        self.apply(tba)
    }

    /// Name, configuration and fitted parameters.
    fn info(&self) -> CoregInfo {
        CoregInfo {
            name: self.name().to_string(),
            is_affine: self.is_affine(),
            steps: self.config(),
            fitted: self.fitted().cloned(),
        }
    }
}

/// Snapshot of an estimator for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoregInfo {
    pub name: String,
    pub is_affine: bool,
    pub steps: Vec<EstimatorConfig>,
    pub fitted: Option<FittedTransformation>,
}

impl fmt::Display for CoregInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Method: {} ({})",
            self.name,
            if self.is_affine { "affine" } else { "non-affine" }
        )?;
        writeln!(f, "Configuration:")?;
        for step in &self.steps {
            writeln!(f, "  - {}", step)?;
        }
        match &self.fitted {
            Some(fitted) => write!(f, "{}", fitted),
            None => write!(f, "Not fitted."),
        }
    }
}

/// Store a fit result, emitting fit metrics.
///
/// The slot is cleared on failure. Fits run as a pipeline step carry a
/// `step` label so they are not counted as standalone fits.
pub(crate) fn store_fit<'a>(
    slot: &'a mut Option<FittedTransformation>,
    method: &'static str,
    reference: ReferenceKind,
    pipeline_step: Option<usize>,
    result: Result<FittedTransformation>,
) -> Result<&'a FittedTransformation> {
    let labels = FitLabels::new(method, reference.as_str()).with_step(pipeline_step);
    match result {
        Ok(fitted) => {
            let meta = &fitted.metadata;
            metrics::counter!(metric_defs::COREG_FITS.name, &labels.to_labels()).increment(1);
            metrics::histogram!(metric_defs::COREG_ITERATIONS.name, &labels.to_labels())
                .record(meta.iterations as f64);
            metrics::histogram!(metric_defs::COREG_SAMPLES.name, &labels.to_labels())
                .record(meta.sample_count as f64);
            if meta.nmad_after.is_finite() {
                metrics::gauge!(metric_defs::COREG_RESIDUAL_NMAD.name, &labels.to_labels())
                    .set(meta.nmad_after);
            }
            if !meta.converged {
                metrics::counter!(metric_defs::COREG_NOT_CONVERGED.name, &labels.to_labels())
                    .increment(1);
            }
            log::info!(
                "{} fitted on {} samples: {:?}",
                method,
                meta.sample_count,
                fitted.parameters()
            );
            Ok(slot.insert(fitted))
        }
        Err(err) => {
            *slot = None;
            metrics::counter!(
                metric_defs::COREG_FIT_FAILURES.name,
                &labels.with(&[("error", err.kind().to_string())])
            )
            .increment(1);
            Err(err)
        }
    }
}
