//! Fitted transformations and their application to surfaces.

use crate::sampling::FitData;
use crate::{CoregError, Result};
use demreg_dem::ElevationSurface;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How an affine correction is applied to a surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    /// Resample the shifted surface back onto the input grid (bilinear).
    #[default]
    Resample,
    /// Move the georeferencing by the horizontal shift and keep cell values.
    Translate,
}

/// Rigid translation in world units.
///
/// The aligned surface is `out(p) = tba(p - (shift_x, shift_y)) + shift_z`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AffineShift {
    pub shift_x: f64,
    pub shift_y: f64,
    pub shift_z: f64,
}

impl AffineShift {
    pub fn new(shift_x: f64, shift_y: f64, shift_z: f64) -> Self {
        Self {
            shift_x,
            shift_y,
            shift_z,
        }
    }

    /// Composition of two translations.
    pub fn then(&self, other: &AffineShift) -> Self {
        Self::new(
            self.shift_x + other.shift_x,
            self.shift_y + other.shift_y,
            self.shift_z + other.shift_z,
        )
    }

    fn apply(&self, surface: &ElevationSurface, mode: ApplyMode) -> ElevationSurface {
        match mode {
            ApplyMode::Translate => surface
                .translated(self.shift_x, self.shift_y)
                .map(|v| v + self.shift_z as f32),
            ApplyMode::Resample => {
                let (width, height) = surface.dimensions();
                let transform = *surface.transform();
                // Values of the shifted surface, read back at the original cell centres
                let shifted = surface.translated(self.shift_x, self.shift_y);
                shifted
                    .resample_to(transform, width, height)
                    .map(|v| v + self.shift_z as f32)
            }
        }
    }
}

/// Bivariate polynomial in normalized coordinates.
///
/// Terms are ordered by total degree, then by decreasing power of `u`:
/// `1, u, v, u², uv, v², ...` where `u = (x - center_x) / scale` and
/// `v = (y - center_y) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialSurface {
    pub order: usize,
    pub coefficients: Vec<f64>,
    pub center_x: f64,
    pub center_y: f64,
    pub scale: f64,
}

impl PolynomialSurface {
    /// Number of terms for a polynomial of `order`.
    pub fn term_count(order: usize) -> usize {
        (order + 1) * (order + 2) / 2
    }

    /// Powers `(i, j)` of `u^i v^j` for each term.
    pub fn powers(order: usize) -> Vec<(i32, i32)> {
        let mut powers = Vec::with_capacity(Self::term_count(order));
        for degree in 0..=order as i32 {
            for j in 0..=degree {
                powers.push((degree - j, j));
            }
        }
        powers
    }

    /// Normalized coordinates of a world point.
    #[inline]
    pub fn normalize(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.center_x) / self.scale, (y - self.center_y) / self.scale)
    }

    /// Evaluate at a world coordinate.
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        let (u, v) = self.normalize(x, y);
        Self::powers(self.order)
            .iter()
            .zip(&self.coefficients)
            .map(|(&(i, j), c)| c * u.powi(i) * v.powi(j))
            .sum()
    }

    fn apply(&self, surface: &ElevationSurface) -> Result<ElevationSurface> {
        let (width, _) = surface.dimensions();
        let transform = surface.transform();
        let data: Vec<f32> = surface
            .data()
            .par_iter()
            .enumerate()
            .map(|(idx, &z)| {
                if z.is_nan() {
                    return z;
                }
                let (x, y) = transform.cell_center(idx % width, idx / width);
                (z as f64 + self.evaluate(x, y)) as f32
            })
            .collect();
        Ok(surface.with_data(data)?)
    }
}

/// A geometric correction produced by an estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    /// Horizontal plus vertical translation.
    Affine(AffineShift),
    /// Additive polynomial surface.
    Polynomial(PolynomialSurface),
    /// Ordered sequence of corrections.
    Chain { steps: Vec<Transform> },
}

impl Transform {
    /// Whether the transform is a pure translation.
    pub fn is_affine(&self) -> bool {
        match self {
            Transform::Affine(_) => true,
            Transform::Polynomial(_) => false,
            Transform::Chain { steps } => steps.iter().all(Transform::is_affine),
        }
    }

    /// Summed translation when every component is affine.
    pub fn combined_shift(&self) -> Option<AffineShift> {
        match self {
            Transform::Affine(shift) => Some(*shift),
            Transform::Polynomial(_) => None,
            Transform::Chain { steps } => steps
                .iter()
                .try_fold(AffineShift::default(), |acc, step| {
                    step.combined_shift().map(|s| acc.then(&s))
                }),
        }
    }

    /// Named scalar parameters.
    ///
    /// Affine transforms (including all-affine chains) expose `shift_x`,
    /// `shift_y` and `shift_z`; polynomials expose `c0`, `c1`, ...; mixed
    /// chains prefix each step's names with `stepN.`.
    pub fn parameters(&self) -> BTreeMap<String, f64> {
        if let Some(shift) = self.combined_shift() {
            return BTreeMap::from([
                ("shift_x".to_string(), shift.shift_x),
                ("shift_y".to_string(), shift.shift_y),
                ("shift_z".to_string(), shift.shift_z),
            ]);
        }
        match self {
            Transform::Polynomial(poly) => poly
                .coefficients
                .iter()
                .enumerate()
                .map(|(i, c)| (format!("c{}", i), *c))
                .collect(),
            Transform::Chain { steps } => steps
                .iter()
                .enumerate()
                .flat_map(|(i, step)| {
                    step.parameters()
                        .into_iter()
                        .map(move |(name, value)| (format!("step{}.{}", i, name), value))
                })
                .collect(),
            Transform::Affine(_) => BTreeMap::new(),
        }
    }

    /// Apply to a surface, producing a new one.
    ///
    /// All-affine transforms are applied as a single shift so that chained
    /// translations only interpolate once.
    pub fn apply(&self, surface: &ElevationSurface, mode: ApplyMode) -> Result<ElevationSurface> {
        if let Some(shift) = self.combined_shift() {
            return Ok(shift.apply(surface, mode));
        }
        if mode == ApplyMode::Translate {
            return Err(CoregError::NotAffine("Translate mode".to_string()));
        }
        match self {
            Transform::Polynomial(poly) => poly.apply(surface),
            Transform::Chain { steps } => steps
                .iter()
                .try_fold(surface.clone(), |current, step| step.apply(&current, mode)),
            Transform::Affine(shift) => Ok(shift.apply(surface, mode)),
        }
    }
}

/// Kind of reference data a fit used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Points,
    Surface,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Points => "points",
            ReferenceKind::Surface => "surface",
        }
    }
}

/// Diagnostics recorded by a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitMetadata {
    /// Valid samples used.
    pub sample_count: usize,
    /// Iterations performed (1 for closed-form estimators).
    pub iterations: usize,
    /// Whether the stopping criterion was met before the iteration cap.
    pub converged: bool,
    /// Seed used for subsampling.
    pub random_state: u64,
    /// Reference data kind.
    pub reference: ReferenceKind,
    /// Elevation column of point references.
    pub z_name: Option<String>,
    /// NMAD of residuals before correction.
    pub nmad_before: f64,
    /// NMAD of residuals after correction.
    pub nmad_after: f64,
}

impl FitMetadata {
    /// Metadata of a single-pass fit over `data`; residual spreads unset.
    pub(crate) fn from_data(data: &FitData, sample_count: usize) -> Self {
        Self {
            sample_count,
            iterations: 1,
            converged: true,
            random_state: data.random_state,
            reference: data.reference,
            z_name: data.z_name.clone(),
            nmad_before: f64::NAN,
            nmad_after: f64::NAN,
        }
    }
}

/// Immutable result of a successful fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTransformation {
    /// Name of the estimator that produced it.
    pub method: String,
    /// The correction itself.
    pub transform: Transform,
    /// Fit diagnostics.
    pub metadata: FitMetadata,
}

impl FittedTransformation {
    /// Named scalar parameters of the correction.
    pub fn parameters(&self) -> BTreeMap<String, f64> {
        self.transform.parameters()
    }

    /// Apply to a surface.
    pub fn apply(&self, surface: &ElevationSurface, mode: ApplyMode) -> Result<ElevationSurface> {
        let out = self.transform.apply(surface, mode)?;
        metrics::histogram!(
            demreg_metrics::metric_defs::COREG_APPLY_CELLS.name,
            "method" => self.method.clone()
        )
        .record(out.valid_count() as f64);
        Ok(out)
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CoregError::InvalidParameter(format!("cannot serialize transform: {}", e)))
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| CoregError::InvalidParameter(format!("invalid transform JSON: {}", e)))
    }
}

impl fmt::Display for FittedTransformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fitted parameters:")?;
        for (name, value) in self.parameters() {
            writeln!(f, "  {:<12} {:>12.4}", name, value)?;
        }
        let meta = &self.metadata;
        writeln!(
            f,
            "Samples: {} from {}{} (seed {})",
            meta.sample_count,
            meta.reference.as_str(),
            meta.z_name
                .as_deref()
                .map(|z| format!(" column '{}'", z))
                .unwrap_or_default(),
            meta.random_state
        )?;
        writeln!(
            f,
            "Iterations: {}{}",
            meta.iterations,
            if meta.converged { "" } else { " (not converged)" }
        )?;
        write!(
            f,
            "Residual NMAD: {:.3} -> {:.3}",
            meta.nmad_before, meta.nmad_after
        )
    }
}
