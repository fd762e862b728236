//! End-to-end raster coregistration.
//!
//! [`create_inlier_mask`] selects stable terrain and [`dem_coregistration`]
//! fits a method on it, applies it and reports residual statistics.

use crate::affine::{NuthKaab, VerticalShift};
use crate::coreg::Coreg;
use crate::pipeline::CoregPipeline;
use crate::sampling::{FitOptions, Reference};
use crate::stats::ResidualStats;
use crate::transform::ApplyMode;
use crate::{CoregError, Result};
use demreg_dem::{terrain, write_geotiff, CrsTransformer, ElevationSurface, InlierMask, SameCrs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// How a region mask restricts the inliers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionMode {
    /// Cells inside the region are outliers (e.g. glaciers).
    #[default]
    Exclude,
    /// Only cells inside the region are inliers.
    KeepOnly,
}

/// A rasterized region on the to-be-aligned grid; `true` is inside.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMask {
    pub mask: InlierMask,
    pub mode: RegionMode,
}

impl RegionMask {
    pub fn exclude(mask: InlierMask) -> Self {
        Self {
            mask,
            mode: RegionMode::Exclude,
        }
    }

    pub fn keep_only(mask: InlierMask) -> Self {
        Self {
            mask,
            mode: RegionMode::KeepOnly,
        }
    }
}

/// Stable-terrain selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InlierMaskOptions {
    /// Region masks; rasters cannot come from a config file.
    #[serde(skip)]
    pub regions: Vec<RegionMask>,
    /// Enable the slope, `dh_max` and NMAD filters.
    pub filtering: bool,
    /// Inclusive slope range in degrees, computed on the reference.
    pub slope_lim: (f64, f64),
    /// Keep `|dh| < dh_max`.
    pub dh_max: Option<f64>,
    /// Keep `|dh - median| < nmad_factor * NMAD`; infinity disables.
    /// A zero NMAD leaves no inliers.
    pub nmad_factor: f64,
}

impl Default for InlierMaskOptions {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            filtering: true,
            slope_lim: (0.1, 40.0),
            dh_max: None,
            nmad_factor: 5.0,
        }
    }
}

impl InlierMaskOptions {
    /// Options with no filtering, so only region masks apply.
    pub fn regions_only(regions: Vec<RegionMask>) -> Self {
        Self {
            regions,
            filtering: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (lo, hi) = self.slope_lim;
        let in_range = |v: f64| (0.0..=90.0).contains(&v);
        if !(in_range(lo) && in_range(hi) && lo < hi) {
            return Err(CoregError::InvalidParameter(format!(
                "slope_lim must satisfy 0 <= lo < hi <= 90, got ({}, {})",
                lo, hi
            )));
        }
        if let Some(dh_max) = self.dh_max {
            if !(dh_max > 0.0) {
                return Err(CoregError::InvalidParameter(format!(
                    "dh_max must be positive, got {}",
                    dh_max
                )));
            }
        }
        if !(self.nmad_factor > 0.0) {
            return Err(CoregError::InvalidParameter(format!(
                "nmad_factor must be positive, got {}",
                self.nmad_factor
            )));
        }
        Ok(())
    }
}

/// `reference` on the grid of `tba`, regridded if needed.
fn on_grid_of(reference: &ElevationSurface, tba: &ElevationSurface) -> Result<ElevationSurface> {
    if reference.crs() != tba.crs() {
        return Err(CoregError::CrsResolution {
            from: reference.crs().to_string(),
            to: tba.crs().to_string(),
        });
    }
    if reference.same_grid(tba.transform(), tba.width(), tba.height()) {
        Ok(reference.clone())
    } else {
        log::debug!("Regridding reference onto the to-be-aligned grid");
        Ok(reference.resample_to(*tba.transform(), tba.width(), tba.height()))
    }
}

/// Inlier mask on the grid of `tba`.
///
/// Region masks are combined first, then (with `filtering`) the slope,
/// `dh_max` and NMAD filters. Every filter narrows the previous result.
pub fn create_inlier_mask(
    tba: &ElevationSurface,
    reference: &ElevationSurface,
    options: &InlierMaskOptions,
) -> Result<InlierMask> {
    options.validate()?;
    let reference = on_grid_of(reference, tba)?;

    let mut mask = InlierMask::all_inliers(tba);
    for region in &options.regions {
        region.mask.check_congruent(tba)?;
        let inside = region.mask.data();
        match region.mode {
            RegionMode::Exclude => mask.retain(|i| !inside[i]),
            RegionMode::KeepOnly => mask.retain(|i| inside[i]),
        }
    }
    if !options.filtering {
        return Ok(mask);
    }

    let dh = reference.difference(tba)?;
    let dh = dh.data();
    mask.retain(|i| dh[i].is_finite());

    let (lo, hi) = options.slope_lim;
    let slope = terrain::slope(&reference);
    let slope = slope.data();
    mask.retain(|i| {
        let s = slope[i] as f64;
        s >= lo && s <= hi
    });

    if let Some(dh_max) = options.dh_max {
        mask.retain(|i| (dh[i] as f64).abs() < dh_max);
    }

    if options.nmad_factor.is_finite() {
        let kept: Vec<f64> = mask
            .data()
            .iter()
            .zip(dh)
            .filter(|(&inlier, _)| inlier)
            .map(|(_, &v)| v as f64)
            .collect();
        let stats = ResidualStats::from_residuals(&kept);
        let limit = options.nmad_factor * stats.nmad;
        mask.retain(|i| ((dh[i] as f64) - stats.median).abs() < limit);
    }

    log::debug!(
        "Inlier mask keeps {} of {} cells",
        mask.count(),
        tba.width() * tba.height()
    );
    Ok(mask)
}

/// Inputs of [`dem_coregistration`] besides the two surfaces.
pub struct CoregistrationOptions {
    /// Method to fit; `NuthKaab` then `VerticalShift` when `None`.
    pub method: Option<Box<dyn Coreg>>,
    pub mask: InlierMaskOptions,
    /// Starting horizontal shift `[x, y]`; affine methods only.
    pub estimated_initial_shift: Option<[f64; 2]>,
    pub random_state: Option<u64>,
    /// How the fitted method is applied to `tba`. `None` translates the
    /// georeferencing for affine methods and resamples otherwise.
    pub apply_mode: Option<ApplyMode>,
    /// Write the aligned surface here as GeoTIFF.
    pub out_path: Option<PathBuf>,
    pub transformer: Arc<dyn CrsTransformer>,
}

impl Default for CoregistrationOptions {
    fn default() -> Self {
        Self {
            method: None,
            mask: InlierMaskOptions::default(),
            estimated_initial_shift: None,
            random_state: None,
            apply_mode: None,
            out_path: None,
            transformer: Arc::new(SameCrs),
        }
    }
}

impl fmt::Debug for CoregistrationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoregistrationOptions")
            .field("method", &self.method)
            .field("mask", &self.mask)
            .field("estimated_initial_shift", &self.estimated_initial_shift)
            .field("random_state", &self.random_state)
            .field("apply_mode", &self.apply_mode)
            .field("out_path", &self.out_path)
            .finish_non_exhaustive()
    }
}

/// Residual statistics on inliers before and after alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoregStats {
    pub before: ResidualStats,
    pub after: ResidualStats,
}

/// Result of [`dem_coregistration`].
#[derive(Debug)]
pub struct CoregistrationOutput {
    pub aligned: ElevationSurface,
    /// The fitted method, ready to `apply` to other surfaces.
    pub method: Box<dyn Coreg>,
    pub stats: CoregStats,
    pub inlier_mask: InlierMask,
}

/// The default method: horizontal `NuthKaab` then a `VerticalShift`.
pub fn default_method() -> Box<dyn Coreg> {
    Box::new(
        CoregPipeline::default()
            .then(NuthKaab::default())
            .then(VerticalShift::default()),
    )
}

/// Align `tba` to `reference`.
pub fn dem_coregistration(
    tba: &ElevationSurface,
    reference: &ElevationSurface,
    options: CoregistrationOptions,
) -> Result<CoregistrationOutput> {
    let CoregistrationOptions {
        method,
        mask: mask_options,
        estimated_initial_shift,
        random_state,
        apply_mode,
        out_path,
        transformer,
    } = options;
    let mut method = method.unwrap_or_else(default_method);

    if let Some([x, y]) = estimated_initial_shift {
        if !(x.is_finite() && y.is_finite()) {
            return Err(CoregError::InvalidParameter(format!(
                "estimated_initial_shift must be two finite numbers, got [{}, {}]",
                x, y
            )));
        }
        if !method.is_affine() {
            return Err(CoregError::NotAffine("estimated_initial_shift".to_string()));
        }
    }

    let reference = on_grid_of(reference, tba)?;
    let inlier_mask = create_inlier_mask(tba, &reference, &mask_options)?;

    let fit_options = FitOptions {
        random_state,
        initial_shift: estimated_initial_shift.map(|[x, y]| (x, y)),
        transformer,
        ..FitOptions::default()
    };
    method.fit(
        &Reference::Surface(&reference),
        tba,
        Some(&inlier_mask),
        &fit_options,
    )?;
    let mode = apply_mode.unwrap_or(if method.is_affine() {
        ApplyMode::Translate
    } else {
        ApplyMode::Resample
    });
    let aligned = method.apply_with(tba, mode)?;

    // Statistics are taken on the tba grid, where the mask lives
    let aligned_on_grid = match mode {
        ApplyMode::Translate => aligned.resample_to(*tba.transform(), tba.width(), tba.height()),
        ApplyMode::Resample => aligned.clone(),
    };
    let stats = CoregStats {
        before: masked_stats(&reference, tba, &inlier_mask)?,
        after: masked_stats(&reference, &aligned_on_grid, &inlier_mask)?,
    };
    log::info!(
        "Coregistration with {}: NMAD {:.3} -> {:.3} m",
        method.name(),
        stats.before.nmad,
        stats.after.nmad
    );

    if let Some(path) = out_path {
        write_geotiff(&aligned, &path)?;
        log::info!("Wrote aligned surface to {}", path.display());
    }

    Ok(CoregistrationOutput {
        aligned,
        method,
        stats,
        inlier_mask,
    })
}

fn masked_stats(
    reference: &ElevationSurface,
    surface: &ElevationSurface,
    mask: &InlierMask,
) -> Result<ResidualStats> {
    let dh = reference.difference(surface)?;
    let values: Vec<f64> = dh
        .data()
        .iter()
        .zip(mask.data())
        .filter(|(_, &inlier)| inlier)
        .map(|(&v, _)| v as f64)
        .collect();
    Ok(ResidualStats::from_residuals(&values))
}
