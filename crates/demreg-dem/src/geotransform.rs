//! Affine mapping between grid cells and world coordinates.

use crate::{DemError, Result};
use serde::{Deserialize, Serialize};

/// North-up affine geotransform (no rotation terms).
///
/// `origin_x`/`origin_y` locate the outer corner of the top-left cell.
/// `pixel_height` is negative for the usual north-up layout where row 0 is
/// the northernmost row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// World x of the top-left corner.
    pub origin_x: f64,
    /// World y of the top-left corner.
    pub origin_y: f64,
    /// Cell size along x (world units per column).
    pub pixel_width: f64,
    /// Cell size along y (world units per row, usually negative).
    pub pixel_height: f64,
}

/// Tolerance used when comparing geotransforms, relative to the cell size.
const GRID_TOLERANCE: f64 = 1e-6;

impl GeoTransform {
    /// Create a geotransform, rejecting degenerate cell sizes.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Result<Self> {
        let transform = Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        };
        transform.validate()?;
        Ok(transform)
    }

    /// North-up transform with square cells of `resolution` world units.
    pub fn north_up(origin_x: f64, origin_y: f64, resolution: f64) -> Result<Self> {
        Self::new(origin_x, origin_y, resolution, -resolution)
    }

    fn validate(&self) -> Result<()> {
        let finite = [self.origin_x, self.origin_y, self.pixel_width, self.pixel_height]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(DemError::InvalidTransform(format!("non-finite term in {:?}", self)));
        }
        if self.pixel_width == 0.0 || self.pixel_height == 0.0 {
            return Err(DemError::InvalidTransform(format!("zero cell size in {:?}", self)));
        }
        Ok(())
    }

    /// World coordinate of the centre of cell (`col`, `row`).
    #[inline]
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional cell index of a world coordinate, measured between cell centres.
    ///
    /// `(0.0, 0.0)` is the centre of the top-left cell.
    #[inline]
    pub fn world_to_grid(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width - 0.5,
            (y - self.origin_y) / self.pixel_height - 0.5,
        )
    }

    /// Index of the cell containing a world coordinate, if inside a `width` x `height` grid.
    pub fn cell_index(&self, x: f64, y: f64, width: usize, height: usize) -> Option<(usize, usize)> {
        let col = ((x - self.origin_x) / self.pixel_width).floor();
        let row = ((y - self.origin_y) / self.pixel_height).floor();
        if col < 0.0 || row < 0.0 || col >= width as f64 || row >= height as f64 {
            return None;
        }
        Some((col as usize, row as usize))
    }

    /// Absolute cell sizes `(x, y)`.
    pub fn resolution(&self) -> (f64, f64) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }

    /// Mean absolute cell size, used to express offsets in pixels.
    pub fn mean_resolution(&self) -> f64 {
        let (rx, ry) = self.resolution();
        (rx + ry) / 2.0
    }

    /// The same grid moved by `(dx, dy)` world units.
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            origin_x: self.origin_x + dx,
            origin_y: self.origin_y + dy,
            ..*self
        }
    }

    /// Footprint of a `width` x `height` grid.
    pub fn bounds(&self, width: usize, height: usize) -> Bounds {
        let x0 = self.origin_x;
        let x1 = self.origin_x + width as f64 * self.pixel_width;
        let y0 = self.origin_y;
        let y1 = self.origin_y + height as f64 * self.pixel_height;
        Bounds {
            min_x: x0.min(x1),
            max_x: x0.max(x1),
            min_y: y0.min(y1),
            max_y: y0.max(y1),
        }
    }

    /// Whether two transforms describe the same cell lattice.
    pub fn approx_eq(&self, other: &GeoTransform) -> bool {
        let tol = GRID_TOLERANCE * self.mean_resolution();
        (self.origin_x - other.origin_x).abs() <= tol
            && (self.origin_y - other.origin_y).abs() <= tol
            && (self.pixel_width - other.pixel_width).abs() <= tol
            && (self.pixel_height - other.pixel_height).abs() <= tol
    }
}

/// Axis-aligned footprint in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Western edge.
    pub min_x: f64,
    /// Eastern edge.
    pub max_x: f64,
    /// Southern edge.
    pub min_y: f64,
    /// Northern edge.
    pub max_y: f64,
}

impl Bounds {
    /// Check if a coordinate is within the bounds.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Whether two footprints share any area.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// Smallest bounds enclosing a set of coordinates, `None` when empty.
    pub fn from_coords(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let mut iter = xs
            .iter()
            .zip(ys)
            .filter(|(x, y)| x.is_finite() && y.is_finite());
        let (&x0, &y0) = iter.next()?;
        let mut bounds = Bounds {
            min_x: x0,
            max_x: x0,
            min_y: y0,
            max_y: y0,
        };
        for (&x, &y) in iter {
            bounds.min_x = bounds.min_x.min(x);
            bounds.max_x = bounds.max_x.max(x);
            bounds.min_y = bounds.min_y.min(y);
            bounds.max_y = bounds.max_y.max(y);
        }
        Some(bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_center_round_trip() {
        let gt = GeoTransform::north_up(500_000.0, 8_700_000.0, 20.0).unwrap();
        let (x, y) = gt.cell_center(3, 7);
        assert_eq!((x, y), (500_070.0, 8_699_850.0));

        let (col, row) = gt.world_to_grid(x, y);
        assert!((col - 3.0).abs() < 1e-12);
        assert!((row - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_cell_index() {
        let gt = GeoTransform::north_up(0.0, 100.0, 10.0).unwrap();
        assert_eq!(gt.cell_index(5.0, 95.0, 10, 10), Some((0, 0)));
        assert_eq!(gt.cell_index(99.9, 0.1, 10, 10), Some((9, 9)));
        assert_eq!(gt.cell_index(-0.1, 50.0, 10, 10), None);
        assert_eq!(gt.cell_index(50.0, 100.1, 10, 10), None);
    }

    #[test]
    fn test_bounds() {
        let gt = GeoTransform::north_up(0.0, 100.0, 10.0).unwrap();
        let bounds = gt.bounds(5, 4);
        assert_eq!(bounds.min_x, 0.0);
        assert_eq!(bounds.max_x, 50.0);
        assert_eq!(bounds.min_y, 60.0);
        assert_eq!(bounds.max_y, 100.0);
        assert!(bounds.contains(25.0, 75.0));
        assert!(!bounds.contains(55.0, 75.0));
    }

    #[test]
    fn test_rejects_zero_resolution() {
        assert!(GeoTransform::new(0.0, 0.0, 0.0, -1.0).is_err());
        assert!(GeoTransform::new(f64::NAN, 0.0, 1.0, -1.0).is_err());
    }

    #[test]
    fn test_translated_grid_differs() {
        let gt = GeoTransform::north_up(0.0, 100.0, 10.0).unwrap();
        assert!(gt.approx_eq(&gt.translated(1e-9, 0.0)));
        assert!(!gt.approx_eq(&gt.translated(2.5, 0.0)));
    }

    #[test]
    fn test_bounds_from_coords() {
        let bounds = Bounds::from_coords(&[1.0, f64::NAN, -2.0], &[5.0, 0.0, 3.0]).unwrap();
        assert_eq!(bounds.min_x, -2.0);
        assert_eq!(bounds.max_x, 1.0);
        assert_eq!(bounds.min_y, 3.0);
        assert_eq!(bounds.max_y, 5.0);
        assert!(Bounds::from_coords(&[], &[]).is_none());
    }
}
