//! Coordinate reference system descriptors.
//!
//! Conversion between different horizontal systems is delegated to a
//! [`CrsTransformer`]. The built-in [`SameCrs`] transformer only resolves a
//! system to itself; callers that need real reprojection plug in their own.

use crate::{DemError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Horizontal coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crs {
    /// A system identified by its EPSG code.
    Epsg(u32),
    /// Unreferenced local grid coordinates.
    Local,
}

impl Crs {
    /// WGS 84 geographic coordinates.
    pub const WGS84: Crs = Crs::Epsg(4326);

    /// Whether the system uses angular (degree) coordinates.
    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Epsg(4326) | Crs::Epsg(4269) | Crs::Epsg(4258))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{}", code),
            Crs::Local => write!(f, "local"),
        }
    }
}

impl std::str::FromStr for Crs {
    type Err = DemError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("local") {
            return Ok(Crs::Local);
        }
        let digits = trimmed
            .strip_prefix("EPSG:")
            .or_else(|| trimmed.strip_prefix("epsg:"))
            .unwrap_or(trimmed);
        digits.parse().map(Crs::Epsg).map_err(|_| DemError::CrsResolution {
            from: s.to_string(),
            to: "a known CRS".to_string(),
        })
    }
}

/// Vertical reference of elevation values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalCrs {
    /// Heights above the reference ellipsoid.
    Ellipsoid,
    /// Heights above a named geoid model (e.g. `EGM96`).
    Geoid(String),
}

impl fmt::Display for VerticalCrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerticalCrs::Ellipsoid => write!(f, "ellipsoid"),
            VerticalCrs::Geoid(name) => write!(f, "geoid:{}", name),
        }
    }
}

/// Check that elevations in two vertical systems can be compared directly.
///
/// Two known but different datums cannot be compared without a geoid grid,
/// which is an error. When either side is unknown the comparison proceeds
/// and `Ok(false)` is returned so callers can warn.
pub fn check_vertical(a: Option<&VerticalCrs>, b: Option<&VerticalCrs>) -> Result<bool> {
    match (a, b) {
        (Some(a), Some(b)) if a == b => Ok(true),
        (Some(a), Some(b)) => Err(DemError::CrsResolution {
            from: a.to_string(),
            to: b.to_string(),
        }),
        _ => Ok(false),
    }
}

/// Converts planar coordinates between horizontal reference systems.
pub trait CrsTransformer: Send + Sync {
    /// Transform coordinates in place from `from` to `to`.
    fn transform(&self, from: Crs, to: Crs, xs: &mut [f64], ys: &mut [f64]) -> Result<()>;
}

/// Transformer that only resolves a CRS to itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameCrs;

impl CrsTransformer for SameCrs {
    fn transform(&self, from: Crs, to: Crs, _xs: &mut [f64], _ys: &mut [f64]) -> Result<()> {
        if from == to {
            Ok(())
        } else {
            Err(DemError::CrsResolution {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crs() {
        assert_eq!("EPSG:32633".parse::<Crs>().unwrap(), Crs::Epsg(32633));
        assert_eq!("4326".parse::<Crs>().unwrap(), Crs::WGS84);
        assert_eq!("local".parse::<Crs>().unwrap(), Crs::Local);
        assert!("UTM33".parse::<Crs>().is_err());
        assert_eq!(Crs::Epsg(32633).to_string(), "EPSG:32633");
    }

    #[test]
    fn test_same_crs_transformer() {
        let mut xs = [1.0, 2.0];
        let mut ys = [3.0, 4.0];
        SameCrs
            .transform(Crs::Epsg(32633), Crs::Epsg(32633), &mut xs, &mut ys)
            .unwrap();
        assert_eq!(xs, [1.0, 2.0]);

        let err = SameCrs
            .transform(Crs::WGS84, Crs::Epsg(32633), &mut xs, &mut ys)
            .unwrap_err();
        assert!(matches!(err, DemError::CrsResolution { .. }));
    }

    #[test]
    fn test_vertical_check() {
        let egm = VerticalCrs::Geoid("EGM96".to_string());
        assert!(check_vertical(Some(&egm), Some(&egm)).unwrap());
        assert!(!check_vertical(None, Some(&egm)).unwrap());
        assert!(check_vertical(Some(&VerticalCrs::Ellipsoid), Some(&egm)).is_err());
    }
}
