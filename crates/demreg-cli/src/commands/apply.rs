//! `demreg apply`

use super::read_text;
use crate::Result;
use clap::Args;
use demreg_coreg::{ApplyMode, FittedTransformation};
use demreg_dem::{read_geotiff, write_geotiff};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Transformation saved by `align --save-transform`
    #[arg(long)]
    pub transform: PathBuf,

    /// DEM to transform (GeoTIFF)
    #[arg(long)]
    pub dem: PathBuf,

    /// Output GeoTIFF
    #[arg(long)]
    pub out: PathBuf,

    /// Shift the georeferencing instead of resampling (affine transforms only)
    #[arg(long)]
    pub translate: bool,
}

pub fn execute(args: ApplyArgs) -> Result<()> {
    let fitted = FittedTransformation::from_json(&read_text(&args.transform)?)?;
    let dem = read_geotiff(&args.dem)?;
    let mode = if args.translate {
        ApplyMode::Translate
    } else {
        ApplyMode::Resample
    };

    let aligned = fitted.apply(&dem, mode)?;
    write_geotiff(&aligned, &args.out)?;
    tracing::info!(
        "Applied {} to {} ({} valid cells), wrote {}",
        fitted.method,
        args.dem.display(),
        aligned.valid_count(),
        args.out.display()
    );
    Ok(())
}
