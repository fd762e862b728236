//! YAML configuration of estimators and fits.

use crate::affine::{
    DhMinimize, DhMinimizeParams, NuthKaab, NuthKaabParams, VerticalShift, VerticalShiftParams,
};
use crate::coreg::Coreg;
use crate::deramp::{Deramp, DerampParams};
use crate::pipeline::CoregPipeline;
use crate::sampling::{FitOptions, DEFAULT_MIN_SAMPLES, DEFAULT_SUBSAMPLE};
use crate::workflows::InlierMaskOptions;
use crate::{CoregError, Result};
use demreg_dem::{DemError, QualityFilter};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// One estimator and its parameters.
///
/// ```yaml
/// - method: NuthKaab
///   max_iterations: 20
/// - method: VerticalShift
///   statistic: median
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum EstimatorConfig {
    NuthKaab(NuthKaabParams),
    VerticalShift(VerticalShiftParams),
    DhMinimize(DhMinimizeParams),
    Deramp(DerampParams),
}

impl EstimatorConfig {
    /// Construct the configured estimator.
    pub fn build(&self) -> Box<dyn Coreg> {
        match *self {
            EstimatorConfig::NuthKaab(p) => Box::new(NuthKaab::new(p)),
            EstimatorConfig::VerticalShift(p) => Box::new(VerticalShift::new(p)),
            EstimatorConfig::DhMinimize(p) => Box::new(DhMinimize::new(p)),
            EstimatorConfig::Deramp(p) => Box::new(Deramp::new(p)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EstimatorConfig::NuthKaab(_) => "NuthKaab",
            EstimatorConfig::VerticalShift(_) => "VerticalShift",
            EstimatorConfig::DhMinimize(_) => "DhMinimize",
            EstimatorConfig::Deramp(_) => "Deramp",
        }
    }
}

impl fmt::Display for EstimatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimatorConfig::NuthKaab(p) => write!(
                f,
                "NuthKaab(max_iterations={}, offset_threshold={}, min_slope_degrees={})",
                p.max_iterations, p.offset_threshold, p.min_slope_degrees
            ),
            EstimatorConfig::VerticalShift(p) => {
                write!(f, "VerticalShift(statistic={:?})", p.statistic)
            }
            EstimatorConfig::DhMinimize(p) => write!(
                f,
                "DhMinimize(max_iterations={}, tolerance={})",
                p.max_iterations, p.tolerance
            ),
            EstimatorConfig::Deramp(p) => write!(f, "Deramp(poly_order={})", p.poly_order),
        }
    }
}

/// Sampling section of a [`CoregConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub subsample: usize,
    pub min_samples: usize,
    pub random_state: Option<u64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            subsample: DEFAULT_SUBSAMPLE,
            min_samples: DEFAULT_MIN_SAMPLES,
            random_state: None,
        }
    }
}

/// Top-level coregistration configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoregConfig {
    /// Estimators run in order; more than one builds a pipeline.
    pub steps: Vec<EstimatorConfig>,
    pub sampling: SamplingConfig,
    /// Filters on point reference attributes.
    pub quality_filters: Vec<QualityFilter>,
    pub mask: InlierMaskOptions,
}

impl Default for CoregConfig {
    fn default() -> Self {
        Self {
            steps: vec![
                EstimatorConfig::NuthKaab(NuthKaabParams::default()),
                EstimatorConfig::VerticalShift(VerticalShiftParams::default()),
            ],
            sampling: SamplingConfig::default(),
            quality_filters: Vec::new(),
            mask: InlierMaskOptions::default(),
        }
    }
}

impl CoregConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = std::fs::read_to_string(path.as_ref()).map_err(DemError::from)?;
        Self::from_yaml_str(&yaml)
    }

    fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(CoregError::InvalidParameter(
                "configuration lists no steps".to_string(),
            ));
        }
        if self.sampling.subsample == 0 {
            return Err(CoregError::InvalidParameter(
                "sampling.subsample must be positive".to_string(),
            ));
        }
        self.mask.validate()
    }

    /// The configured estimator; a single step is returned bare.
    pub fn build(&self) -> Box<dyn Coreg> {
        match self.steps.as_slice() {
            [single] => single.build(),
            steps => Box::new(CoregPipeline::new(
                steps.iter().map(EstimatorConfig::build).collect(),
            )),
        }
    }

    /// Fit options from the sampling and filter sections.
    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            random_state: self.sampling.random_state,
            quality_filters: self.quality_filters.clone(),
            subsample: self.sampling.subsample,
            min_samples: self.sampling.min_samples,
            ..FitOptions::default()
        }
    }
}
