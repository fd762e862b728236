//! Errors surfaced by the `demreg` command.

use demreg_coreg::CoregError;
use demreg_dem::DemError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Coreg(#[from] CoregError),

    #[error(transparent)]
    Dem(#[from] DemError),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported reference file {0} (expected .tif, .tiff or .csv)")]
    UnsupportedReference(PathBuf),
}
