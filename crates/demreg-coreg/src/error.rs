//! Error types for coregistration.

use demreg_dem::DemError;
use thiserror::Error;

/// Errors that can occur while fitting or applying an estimator.
#[derive(Debug, Error)]
pub enum CoregError {
    /// Inlier mask and surface grids differ.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Too few valid reference/surface pairs to fit.
    #[error("Insufficient data: {valid} valid samples, at least {required} required")]
    InsufficientData {
        /// Samples available.
        valid: usize,
        /// Minimum required.
        required: usize,
    },

    /// Reference data does not overlap the surface footprint.
    #[error("Reference data does not overlap the surface")]
    NoOverlap,

    /// Coordinate reference systems cannot be reconciled.
    #[error("Cannot resolve CRS from {from} to {to}")]
    CrsResolution {
        /// Source CRS.
        from: String,
        /// Target CRS.
        to: String,
    },

    /// `apply` or `info` parameters requested before a successful `fit`.
    #[error("{0} has not been fitted")]
    NotFitted(String),

    /// Normal equations of a least-squares solve are singular.
    #[error("Singular fit: {0}")]
    SingularFit(String),

    /// An operation requires an affine (translation) method.
    #[error("{0} requires an affine coregistration method")]
    NotAffine(String),

    /// Configuration value out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Elevation field missing from the reference points.
    #[error("Column '{0}' not found in reference points")]
    MissingColumn(String),

    /// Optimizer failure.
    #[error("Optimization failed: {0}")]
    OptimizationFailed(String),

    /// YAML configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// Underlying elevation data error.
    #[error(transparent)]
    Dem(DemError),
}

impl From<DemError> for CoregError {
    fn from(err: DemError) -> Self {
        match err {
            DemError::GridMismatch(msg) => CoregError::ShapeMismatch(msg),
            DemError::CrsResolution { from, to } => CoregError::CrsResolution { from, to },
            DemError::MissingColumn(name) => CoregError::MissingColumn(name),
            other => CoregError::Dem(other),
        }
    }
}

impl CoregError {
    /// Short snake_case tag used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            CoregError::ShapeMismatch(_) => "shape_mismatch",
            CoregError::InsufficientData { .. } => "insufficient_data",
            CoregError::NoOverlap => "no_overlap",
            CoregError::CrsResolution { .. } => "crs_resolution",
            CoregError::NotFitted(_) => "not_fitted",
            CoregError::SingularFit(_) => "singular_fit",
            CoregError::NotAffine(_) => "not_affine",
            CoregError::InvalidParameter(_) => "invalid_parameter",
            CoregError::MissingColumn(_) => "missing_column",
            CoregError::OptimizationFailed(_) => "optimization_failed",
            CoregError::Config(_) => "config",
            CoregError::Dem(_) => "dem",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dem_errors_map_to_taxonomy() {
        let err: CoregError = DemError::GridMismatch("3x3 vs 4x4".into()).into();
        assert!(matches!(err, CoregError::ShapeMismatch(_)));

        let err: CoregError = DemError::MissingColumn("h_li".into()).into();
        assert!(matches!(err, CoregError::MissingColumn(ref c) if c == "h_li"));

        let err: CoregError = DemError::InvalidTransform("zero".into()).into();
        assert_eq!(err.kind(), "dem");
    }

    #[test]
    fn test_messages() {
        let err = CoregError::InsufficientData { valid: 3, required: 20 };
        assert_eq!(
            err.to_string(),
            "Insufficient data: 3 valid samples, at least 20 required"
        );
        let err = CoregError::NotAffine("estimated_initial_shift".into());
        assert!(err.to_string().contains("affine"));
    }
}
