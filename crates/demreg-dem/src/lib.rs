//! # demreg-dem
//!
//! Elevation data containers for DEM coregistration.
//!
//! This crate provides:
//! - [`ElevationSurface`]: a north-up gridded raster with a [`GeoTransform`],
//!   a horizontal [`Crs`] and an optional [`VerticalCrs`]
//! - [`PointCloud`]: sparse reference samples (e.g. ICESat-2 footprints) with
//!   named attribute columns and [`QualityFilter`]s
//! - [`InlierMask`]: boolean grid marking stable terrain
//! - Terrain attributes (Horn slope and aspect)
//! - GeoTIFF and CSV readers/writers for local files
//!
//! Missing elevations are always NaN in memory. A declared no-data value is
//! converted on load and restored on write.
//!
//! ## Example
//!
//! ```no_run
//! use demreg_dem::{read_geotiff, terrain};
//!
//! let dem = read_geotiff("dem.tif")?;
//! let slope = terrain::slope(&dem);
//! let (x, y) = dem.transform().cell_center(10, 10);
//! println!("elevation {:?}, slope {:?}", dem.sample(x, y), slope.value(10, 10));
//! # Ok::<(), demreg_dem::DemError>(())
//! ```

mod crs;
mod error;
mod geotiff;
mod geotransform;
mod mask;
mod points;
mod surface;
pub mod terrain;

pub use crs::{check_vertical, Crs, CrsTransformer, SameCrs, VerticalCrs};
pub use error::DemError;
pub use geotiff::{read_geotiff, write_geotiff};
pub use geotransform::{Bounds, GeoTransform};
pub use mask::InlierMask;
pub use points::{CsvOptions, PointCloud, QualityFilter};
pub use surface::ElevationSurface;

/// Result type for DEM operations.
pub type Result<T> = std::result::Result<T, DemError>;
