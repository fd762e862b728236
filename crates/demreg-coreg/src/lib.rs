//! # demreg-coreg
//!
//! Coregistration of digital elevation models against a reference surface
//! or a sparse reference point set.
//!
//! ## Features
//!
//! - **Estimators**: [`NuthKaab`] (iterative slope/aspect translation),
//!   [`VerticalShift`], [`DhMinimize`] (Nelder-Mead on residual NMAD) and
//!   [`Deramp`] (polynomial trend)
//! - **Pipelines**: [`CoregPipeline`] chains estimators, each fitted on the
//!   output of the previous ones
//! - **Workflows**: [`create_inlier_mask`] and [`dem_coregistration`] for the
//!   common raster-to-raster case
//! - **Configuration**: [`CoregConfig`] loads estimator lists from YAML
//!
//! Every estimator implements [`Coreg`]: `fit` stores an immutable
//! [`FittedTransformation`], `apply` returns a new surface.
//!
//! ## Example
//!
//! ```no_run
//! use demreg_coreg::{Coreg, FitOptions, NuthKaab, Reference};
//! use demreg_dem::read_geotiff;
//!
//! let reference = read_geotiff("reference.tif")?;
//! let tba = read_geotiff("tba.tif")?;
//!
//! let mut coreg = NuthKaab::default();
//! let aligned = coreg.fit_and_apply(&Reference::Surface(&reference), &tba, None, &FitOptions::seeded(42))?;
//! println!("{}", coreg.info());
//! # let _ = aligned;
//! # Ok::<(), demreg_coreg::CoregError>(())
//! ```

mod affine;
mod config;
mod coreg;
mod deramp;
mod error;
mod pipeline;
mod sampling;
pub mod stats;
mod transform;
mod workflows;

pub use affine::{
    DhMinimize, DhMinimizeParams, NuthKaab, NuthKaabParams, VerticalShift, VerticalShiftMethod,
    VerticalShiftParams,
};
pub use config::{CoregConfig, EstimatorConfig, SamplingConfig};
pub use coreg::{Coreg, CoregInfo};
pub use deramp::{Deramp, DerampParams, MAX_POLY_ORDER};
pub use error::CoregError;
pub use pipeline::CoregPipeline;
pub use sampling::{FitData, FitOptions, Reference, DEFAULT_MIN_SAMPLES, DEFAULT_SUBSAMPLE};
pub use stats::ResidualStats;
pub use transform::{
    AffineShift, ApplyMode, FitMetadata, FittedTransformation, PolynomialSurface, ReferenceKind,
    Transform,
};
pub use workflows::{
    create_inlier_mask, default_method, dem_coregistration, CoregStats, CoregistrationOptions,
    CoregistrationOutput, InlierMaskOptions, RegionMask, RegionMode,
};

/// Result type for coregistration operations.
pub type Result<T> = std::result::Result<T, CoregError>;
