//! Preparation of reference samples shared by every estimator.
//!
//! All validation happens here, before any iteration starts, so a bad input
//! fails fast with the matching error.

use crate::transform::ReferenceKind;
use crate::{CoregError, Result};
use demreg_dem::{
    check_vertical, CrsTransformer, ElevationSurface, InlierMask, PointCloud, QualityFilter,
    SameCrs,
};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::sync::Arc;

/// Default cap on the number of samples used in a fit.
pub const DEFAULT_SUBSAMPLE: usize = 500_000;

/// Default minimum number of valid samples.
pub const DEFAULT_MIN_SAMPLES: usize = 20;

/// Reference elevation data to align against.
#[derive(Debug, Clone, Copy)]
pub enum Reference<'a> {
    /// Sparse points; `z_name` names the elevation column.
    Points {
        cloud: &'a PointCloud,
        z_name: &'a str,
    },
    /// Another gridded surface.
    Surface(&'a ElevationSurface),
}

impl Reference<'_> {
    pub fn kind(&self) -> ReferenceKind {
        match self {
            Reference::Points { .. } => ReferenceKind::Points,
            Reference::Surface(_) => ReferenceKind::Surface,
        }
    }
}

/// Options common to every fit.
#[derive(Clone)]
pub struct FitOptions {
    /// Seed for subsampling. `None` draws a fresh seed, recorded in the metadata.
    pub random_state: Option<u64>,
    /// Starting horizontal shift `(x, y)` in world units. Affine estimators only.
    pub initial_shift: Option<(f64, f64)>,
    /// Horizontal reprojection used for point references in another CRS.
    pub transformer: Arc<dyn CrsTransformer>,
    /// Filters applied to point references before sampling.
    pub quality_filters: Vec<QualityFilter>,
    /// Maximum number of samples kept.
    pub subsample: usize,
    /// Minimum number of valid samples.
    pub min_samples: usize,
    /// Index of the step when run inside a [`CoregPipeline`](crate::CoregPipeline).
    pub pipeline_step: Option<usize>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            random_state: None,
            initial_shift: None,
            transformer: Arc::new(SameCrs),
            quality_filters: Vec::new(),
            subsample: DEFAULT_SUBSAMPLE,
            min_samples: DEFAULT_MIN_SAMPLES,
            pipeline_step: None,
        }
    }
}

impl fmt::Debug for FitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FitOptions")
            .field("random_state", &self.random_state)
            .field("initial_shift", &self.initial_shift)
            .field("quality_filters", &self.quality_filters)
            .field("subsample", &self.subsample)
            .field("min_samples", &self.min_samples)
            .field("pipeline_step", &self.pipeline_step)
            .finish_non_exhaustive()
    }
}

impl FitOptions {
    /// Options with a fixed seed.
    pub fn seeded(random_state: u64) -> Self {
        Self {
            random_state: Some(random_state),
            ..Self::default()
        }
    }

    /// Set the starting horizontal shift.
    pub fn with_initial_shift(mut self, x: f64, y: f64) -> Self {
        self.initial_shift = Some((x, y));
        self
    }

    /// Use a custom horizontal reprojection.
    pub fn with_transformer(mut self, transformer: Arc<dyn CrsTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    /// Initial shift after validation.
    pub fn checked_initial_shift(&self) -> Result<(f64, f64)> {
        match self.initial_shift {
            None => Ok((0.0, 0.0)),
            Some((x, y)) if x.is_finite() && y.is_finite() => Ok((x, y)),
            Some(shift) => Err(CoregError::InvalidParameter(format!(
                "initial shift must be two finite numbers, got {:?}",
                shift
            ))),
        }
    }
}

/// Validated reference samples in the surface CRS.
#[derive(Debug, Clone)]
pub struct FitData {
    /// Sample x coordinates.
    pub xs: Vec<f64>,
    /// Sample y coordinates.
    pub ys: Vec<f64>,
    /// Reference elevations.
    pub z: Vec<f64>,
    /// Seed used for subsampling.
    pub random_state: u64,
    /// Kind of reference the samples came from.
    pub reference: ReferenceKind,
    /// Elevation column for point references.
    pub z_name: Option<String>,
}

impl FitData {
    /// Validate inputs and build the sample set.
    pub fn prepare(
        reference: &Reference<'_>,
        tba: &ElevationSurface,
        mask: Option<&InlierMask>,
        options: &FitOptions,
    ) -> Result<Self> {
        if let Some(mask) = mask {
            mask.check_congruent(tba)?;
        }
        if options.min_samples == 0 || options.subsample == 0 {
            return Err(CoregError::InvalidParameter(
                "min_samples and subsample must be positive".to_string(),
            ));
        }

        let (xs, ys, z, z_name) = match reference {
            Reference::Points { cloud, z_name } => {
                if !check_vertical(cloud.vertical_crs(), tba.vertical_crs())? {
                    log::warn!("Vertical CRS unknown on one side, comparing elevations as-is");
                }
                let cloud = if cloud.crs() == tba.crs() {
                    cloud.filter(&options.quality_filters)?
                } else {
                    cloud
                        .filter(&options.quality_filters)?
                        .reproject(tba.crs(), options.transformer.as_ref())?
                };
                let z = cloud.column(z_name)?.to_vec();
                (
                    cloud.x().to_vec(),
                    cloud.y().to_vec(),
                    z,
                    Some(z_name.to_string()),
                )
            }
            Reference::Surface(surface) => {
                if !check_vertical(surface.vertical_crs(), tba.vertical_crs())? {
                    log::warn!("Vertical CRS unknown on one side, comparing elevations as-is");
                }
                let (mut xs, mut ys, z) = cell_samples(surface);
                if surface.crs() != tba.crs() {
                    options
                        .transformer
                        .transform(surface.crs(), tba.crs(), &mut xs, &mut ys)?;
                }
                (xs, ys, z, None)
            }
        };

        let bounds = tba.bounds();
        let mut overlapping = 0usize;
        let keep: Vec<usize> = (0..xs.len())
            .filter(|&i| {
                let (x, y) = (xs[i], ys[i]);
                if !(x.is_finite() && y.is_finite() && z[i].is_finite()) {
                    return false;
                }
                if !bounds.contains(x, y) {
                    return false;
                }
                overlapping += 1;
                mask.map_or(true, |m| m.at(x, y))
            })
            .collect();

        if overlapping == 0 {
            return Err(CoregError::NoOverlap);
        }

        let random_state = options
            .random_state
            .unwrap_or_else(|| rand::thread_rng().gen());
        let keep = subsample(keep, options.subsample, random_state);

        if keep.len() < options.min_samples {
            return Err(CoregError::InsufficientData {
                valid: keep.len(),
                required: options.min_samples,
            });
        }

        log::debug!(
            "Prepared {} {} samples ({} overlapping, seed {})",
            keep.len(),
            reference.kind().as_str(),
            overlapping,
            random_state
        );

        Ok(Self {
            xs: keep.iter().map(|&i| xs[i]).collect(),
            ys: keep.iter().map(|&i| ys[i]).collect(),
            z: keep.iter().map(|&i| z[i]).collect(),
            random_state,
            reference: reference.kind(),
            z_name,
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    /// Whether there are no samples.
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Residuals `z_ref - tba(p - shift)`; NaN where the surface has no value.
    pub fn residuals(&self, tba: &ElevationSurface, shift_x: f64, shift_y: f64) -> Vec<f64> {
        let qx: Vec<f64> = self.xs.iter().map(|x| x - shift_x).collect();
        let qy: Vec<f64> = self.ys.iter().map(|y| y - shift_y).collect();
        tba.sample_points(&qx, &qy)
            .into_iter()
            .zip(&self.z)
            .map(|(t, z)| z - t)
            .collect()
    }

    /// Fail unless at least `required` residuals are finite.
    pub fn check_valid(residuals: &[f64], required: usize) -> Result<usize> {
        let valid = residuals.iter().filter(|v| v.is_finite()).count();
        if valid < required {
            return Err(CoregError::InsufficientData { valid, required });
        }
        Ok(valid)
    }
}

/// One sample per valid cell centre.
fn cell_samples(surface: &ElevationSurface) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let (width, height) = surface.dimensions();
    let transform = surface.transform();
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    let mut z = Vec::new();
    for row in 0..height {
        for col in 0..width {
            if let Some(value) = surface.value(col, row) {
                let (x, y) = transform.cell_center(col, row);
                xs.push(x);
                ys.push(y);
                z.push(value);
            }
        }
    }
    (xs, ys, z)
}

/// Seeded random subset of `indices`, returned in their original order.
fn subsample(indices: Vec<usize>, limit: usize, seed: u64) -> Vec<usize> {
    if indices.len() <= limit {
        return indices;
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut picked = index::sample(&mut rng, indices.len(), limit).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| indices[i]).collect()
}
