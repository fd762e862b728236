//! `demreg align`

use super::{load_config, load_reference, parse_shift, write_text, LoadedReference};
use crate::Result;
use clap::Args;
use demreg_coreg::{
    dem_coregistration, ApplyMode, CoregError, CoregStats, CoregistrationOptions,
    FittedTransformation, Reference, RegionMask,
};
use demreg_dem::{read_geotiff, write_geotiff, Crs, CsvOptions, InlierMask};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct AlignArgs {
    /// Reference elevations: a GeoTIFF, or a CSV of points
    #[arg(long)]
    pub reference: PathBuf,

    /// DEM to be aligned (GeoTIFF)
    #[arg(long)]
    pub tba: PathBuf,

    /// Elevation column of a CSV reference
    #[arg(long, default_value = "h")]
    pub z_name: String,

    /// Easting column of a CSV reference
    #[arg(long, default_value = "x")]
    pub x_column: String,

    /// Northing column of a CSV reference
    #[arg(long, default_value = "y")]
    pub y_column: String,

    /// EPSG code of CSV points; defaults to the CRS of the DEM
    #[arg(long)]
    pub points_epsg: Option<u32>,

    /// YAML coregistration configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Inlier mask on the DEM grid (GeoTIFF, non-zero cells are stable terrain),
    /// e.g. written by `demreg mask`
    #[arg(long)]
    pub mask: Option<PathBuf>,

    /// Shift the georeferencing of the output instead of resampling
    /// (affine methods only)
    #[arg(long)]
    pub translate: bool,

    /// Write the aligned DEM here
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Write the fitted transformation here as JSON
    #[arg(long)]
    pub save_transform: Option<PathBuf>,

    /// Seed for subsampling; overrides the configuration
    #[arg(long)]
    pub random_state: Option<u64>,

    /// Starting horizontal shift as X,Y in map units
    #[arg(long, value_parser = parse_shift, allow_hyphen_values = true)]
    pub initial_shift: Option<(f64, f64)>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Outcome of an alignment, printed by `--json`.
#[derive(Debug, Serialize)]
pub struct AlignReport {
    pub fitted: FittedTransformation,
    /// Residual statistics; only for raster references.
    pub stats: Option<CoregStats>,
}

pub fn execute(args: AlignArgs) -> Result<()> {
    let report = align(&args)?;

    if let Some(path) = &args.save_transform {
        write_text(path, &report.fitted.to_json()?)?;
        tracing::info!("Saved transformation to {}", path.display());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Method: {}", report.fitted.method);
        println!("{}", report.fitted);
        if let Some(stats) = &report.stats {
            println!("Before: {}", stats.before);
            println!("After:  {}", stats.after);
        }
    }
    Ok(())
}

/// Fit and apply, writing the aligned DEM when requested.
pub fn align(args: &AlignArgs) -> Result<AlignReport> {
    let mut config = load_config(args.config.as_deref())?;
    if args.random_state.is_some() {
        config.sampling.random_state = args.random_state;
    }

    let tba = read_geotiff(&args.tba)?;
    let points_crs = args.points_epsg.map_or(tba.crs(), Crs::Epsg);
    let csv = CsvOptions {
        x_column: args.x_column.clone(),
        y_column: args.y_column.clone(),
        ..CsvOptions::default()
    };
    tracing::info!(
        "Aligning {} ({}x{}) to {}",
        args.tba.display(),
        tba.width(),
        tba.height(),
        args.reference.display()
    );

    let mask = match &args.mask {
        Some(path) => {
            let mask = InlierMask::from_surface(&read_geotiff(path)?);
            mask.check_congruent(&tba).map_err(CoregError::from)?;
            tracing::info!("Using {} inlier cells from {}", mask.count(), path.display());
            Some(mask)
        }
        None => None,
    };
    let mode = if args.translate {
        ApplyMode::Translate
    } else {
        ApplyMode::Resample
    };

    match load_reference(&args.reference, points_crs, &csv)? {
        LoadedReference::Surface(reference) => {
            let mut mask_options = config.mask.clone();
            mask_options.regions.extend(mask.map(RegionMask::keep_only));
            let output = dem_coregistration(
                &tba,
                &reference,
                CoregistrationOptions {
                    method: Some(config.build()),
                    mask: mask_options,
                    apply_mode: Some(mode),
                    estimated_initial_shift: args.initial_shift.map(|(x, y)| [x, y]),
                    random_state: config.sampling.random_state,
                    out_path: args.out.clone(),
                    ..CoregistrationOptions::default()
                },
            )?;
            let fitted = output
                .method
                .fitted()
                .cloned()
                .ok_or_else(|| CoregError::NotFitted(output.method.name().to_string()))?;
            Ok(AlignReport {
                fitted,
                stats: Some(output.stats),
            })
        }
        LoadedReference::Points(cloud) => {
            let mut coreg = config.build();
            let mut options = config.fit_options();
            options.initial_shift = args.initial_shift;
            let reference = Reference::Points {
                cloud: &cloud,
                z_name: &args.z_name,
            };
            let fitted = coreg.fit(&reference, &tba, mask.as_ref(), &options)?.clone();
            if let Some(out) = &args.out {
                let aligned = coreg.apply_with(&tba, mode)?;
                write_geotiff(&aligned, out)?;
                tracing::info!("Wrote aligned DEM to {}", out.display());
            }
            Ok(AlignReport {
                fitted,
                stats: None,
            })
        }
    }
}
