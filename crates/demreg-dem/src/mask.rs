//! Boolean inlier masks congruent with an elevation surface.

use crate::crs::Crs;
use crate::geotransform::GeoTransform;
use crate::surface::ElevationSurface;
use crate::{DemError, Result};

/// Marks which cells of a surface are trusted as stable terrain.
///
/// `true` cells take part in fitting; `false` cells (glaciers, water, steep
/// slopes, outliers) are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct InlierMask {
    data: Vec<bool>,
    width: usize,
    height: usize,
    transform: GeoTransform,
}

impl InlierMask {
    /// Create a mask from row-major values.
    pub fn new(data: Vec<bool>, width: usize, height: usize, transform: GeoTransform) -> Result<Self> {
        let expected = width * height;
        if data.len() != expected {
            return Err(DemError::SizeMismatch {
                what: "inlier mask",
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            transform,
        })
    }

    /// A mask on the surface's grid with every cell set to `value`.
    pub fn filled_like(surface: &ElevationSurface, value: bool) -> Self {
        Self {
            data: vec![value; surface.width() * surface.height()],
            width: surface.width(),
            height: surface.height(),
            transform: *surface.transform(),
        }
    }

    /// A mask keeping every cell of the surface.
    pub fn all_inliers(surface: &ElevationSurface) -> Self {
        Self::filled_like(surface, true)
    }

    /// Interpret a raster as a mask: non-zero finite cells are `true`.
    pub fn from_surface(surface: &ElevationSurface) -> Self {
        Self {
            data: surface
                .data()
                .iter()
                .map(|&v| v.is_finite() && v != 0.0)
                .collect(),
            width: surface.width(),
            height: surface.height(),
            transform: *surface.transform(),
        }
    }

    /// Encode as a `0`/`1` raster for writing to disk.
    pub fn to_surface(&self, crs: Crs) -> ElevationSurface {
        ElevationSurface::from_fn(self.width, self.height, self.transform, crs, |x, y| {
            if self.at(x, y) {
                1.0
            } else {
                0.0
            }
        })
    }

    /// Row-major values.
    pub fn data(&self) -> &[bool] {
        &self.data
    }

    /// Grid dimensions `(width, height)`.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Cell-to-world mapping.
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Value at a cell; outside the grid counts as an outlier.
    #[inline]
    pub fn get(&self, col: usize, row: usize) -> bool {
        col < self.width && row < self.height && self.data[row * self.width + col]
    }

    /// Value of the cell containing a world coordinate.
    pub fn at(&self, x: f64, y: f64) -> bool {
        self.transform
            .cell_index(x, y, self.width, self.height)
            .is_some_and(|(col, row)| self.get(col, row))
    }

    /// Number of inlier cells.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Whether no cell is an inlier.
    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|&v| v)
    }

    /// Fail unless the mask shares the surface's shape and geotransform.
    pub fn check_congruent(&self, surface: &ElevationSurface) -> Result<()> {
        if surface.same_grid(&self.transform, self.width, self.height) {
            Ok(())
        } else {
            Err(DemError::GridMismatch(format!(
                "mask is {}x{} {:?}, surface is {}x{} {:?}",
                self.width,
                self.height,
                self.transform,
                surface.width(),
                surface.height(),
                surface.transform()
            )))
        }
    }

    /// Cell-wise AND with another mask on the same grid.
    pub fn and(&self, other: &InlierMask) -> Result<Self> {
        self.check_same_shape(other)?;
        Ok(Self {
            data: self.data.iter().zip(&other.data).map(|(a, b)| *a && *b).collect(),
            ..self.clone()
        })
    }

    /// Cell-wise negation.
    pub fn not(&self) -> Self {
        Self {
            data: self.data.iter().map(|v| !v).collect(),
            ..self.clone()
        }
    }

    /// Keep only cells where `keep(index)` also holds.
    pub fn retain<F: Fn(usize) -> bool>(&mut self, keep: F) {
        for (idx, value) in self.data.iter_mut().enumerate() {
            *value = *value && keep(idx);
        }
    }

    fn check_same_shape(&self, other: &InlierMask) -> Result<()> {
        if self.width == other.width
            && self.height == other.height
            && self.transform.approx_eq(&other.transform)
        {
            Ok(())
        } else {
            Err(DemError::GridMismatch(format!(
                "masks are {}x{} and {}x{}",
                self.width, self.height, other.width, other.height
            )))
        }
    }
}
