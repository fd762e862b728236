//! Error types for the DEM crate.

use thiserror::Error;

/// Errors that can occur when working with elevation data.
#[derive(Debug, Error)]
pub enum DemError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding or encoding error.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Invalid GeoTIFF - missing required tags.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    /// Unsupported data type in the TIFF file.
    #[error("Unsupported TIFF data type: {0}")]
    UnsupportedDataType(String),

    /// Buffer length does not match the declared grid dimensions.
    #[error("{what} has {actual} values but a {width}x{height} grid needs {expected}")]
    SizeMismatch {
        /// What was being built.
        what: &'static str,
        /// Grid width in cells.
        width: usize,
        /// Grid height in cells.
        height: usize,
        /// Expected number of values.
        expected: usize,
        /// Number of values provided.
        actual: usize,
    },

    /// A grid with no rows or no columns.
    #[error("Grid must have at least one cell, got {width}x{height}")]
    EmptyGrid {
        /// Grid width in cells.
        width: usize,
        /// Grid height in cells.
        height: usize,
    },

    /// Two grids that must be congruent are not.
    #[error("Grid mismatch: {0}")]
    GridMismatch(String),

    /// Invalid geotransform (zero or non-finite pixel size).
    #[error("Invalid geotransform: {0}")]
    InvalidTransform(String),

    /// No transformation is known between two coordinate reference systems.
    #[error("Cannot resolve transform from {from} to {to}")]
    CrsResolution {
        /// Source CRS.
        from: String,
        /// Target CRS.
        to: String,
    },

    /// A named point attribute does not exist.
    #[error("Column '{0}' not found in point set")]
    MissingColumn(String),

    /// Malformed CSV content.
    #[error("CSV parse error at line {line}: {reason}")]
    Csv {
        /// 1-based line number.
        line: usize,
        /// Reason for failure.
        reason: String,
    },
}
