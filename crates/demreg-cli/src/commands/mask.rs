//! `demreg mask`

use super::load_config;
use crate::Result;
use clap::Args;
use demreg_coreg::create_inlier_mask;
use demreg_dem::{read_geotiff, write_geotiff};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct MaskArgs {
    /// Reference DEM (GeoTIFF)
    #[arg(long)]
    pub reference: PathBuf,

    /// DEM to be aligned (GeoTIFF); the mask uses its grid
    #[arg(long)]
    pub tba: PathBuf,

    /// YAML configuration; only the `mask` section is used
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output GeoTIFF, 1 for inliers and 0 for outliers
    #[arg(long)]
    pub out: PathBuf,
}

pub fn execute(args: MaskArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let reference = read_geotiff(&args.reference)?;
    let tba = read_geotiff(&args.tba)?;

    let mask = create_inlier_mask(&tba, &reference, &config.mask)?;
    write_geotiff(&mask.to_surface(tba.crs()), &args.out)?;

    let (width, height) = mask.dimensions();
    println!(
        "{} of {} cells are inliers ({:.1}%)",
        mask.count(),
        width * height,
        100.0 * mask.count() as f64 / (width * height).max(1) as f64
    );
    Ok(())
}
