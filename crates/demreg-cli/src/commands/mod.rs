//! Subcommand implementations.

pub mod align;
pub mod apply;
pub mod info;
pub mod mask;

use crate::{CliError, Result};
use demreg_coreg::CoregConfig;
use demreg_dem::{read_geotiff, Crs, CsvOptions, ElevationSurface, PointCloud};
use std::path::Path;

/// Reference data loaded from disk.
#[derive(Debug)]
pub enum LoadedReference {
    Surface(ElevationSurface),
    Points(PointCloud),
}

/// Load a GeoTIFF or CSV reference, chosen by file extension.
///
/// CSV points carry no CRS, so they are taken to be in `points_crs`.
pub fn load_reference(path: &Path, points_crs: Crs, csv: &CsvOptions) -> Result<LoadedReference> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("tif") | Some("tiff") => Ok(LoadedReference::Surface(read_geotiff(path)?)),
        Some("csv") => Ok(LoadedReference::Points(PointCloud::from_csv(
            path, points_crs, csv,
        )?)),
        _ => Err(CliError::UnsupportedReference(path.to_path_buf())),
    }
}

/// The configuration file, or defaults when none is given.
pub fn load_config(path: Option<&Path>) -> Result<CoregConfig> {
    match path {
        Some(path) => Ok(CoregConfig::from_yaml_file(path)?),
        None => Ok(CoregConfig::default()),
    }
}

/// Parse `X,Y` into a pair of finite numbers.
pub fn parse_shift(value: &str) -> std::result::Result<(f64, f64), String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [x, y] = parts.as_slice() else {
        return Err(format!("expected X,Y but got '{}'", value));
    };
    let x: f64 = x.parse().map_err(|_| format!("invalid number '{}'", x))?;
    let y: f64 = y.parse().map_err(|_| format!("invalid number '{}'", y))?;
    if !(x.is_finite() && y.is_finite()) {
        return Err(format!("shift must be finite, got '{}'", value));
    }
    Ok((x, y))
}

pub(crate) fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn write_text(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}
