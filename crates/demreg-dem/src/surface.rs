//! Gridded elevation surface.

use crate::crs::{Crs, VerticalCrs};
use crate::geotransform::{Bounds, GeoTransform};
use crate::{DemError, Result};
use rayon::prelude::*;

/// A gridded elevation raster with georeferencing.
///
/// Values are stored in row-major order (north to south, west to east).
/// Missing cells are NaN; a declared no-data value is only kept so that it can
/// be written back out.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationSurface {
    /// Elevation data in row-major order.
    data: Vec<f32>,
    /// Width of the grid in cells.
    width: usize,
    /// Height of the grid in cells.
    height: usize,
    /// Cell-to-world mapping.
    transform: GeoTransform,
    /// Horizontal reference system.
    crs: Crs,
    /// Vertical reference system, if known.
    vertical_crs: Option<VerticalCrs>,
    /// No-data value used on disk.
    nodata: Option<f32>,
}

impl ElevationSurface {
    /// Create a surface from row-major data.
    pub fn new(
        data: Vec<f32>,
        width: usize,
        height: usize,
        transform: GeoTransform,
        crs: Crs,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DemError::EmptyGrid { width, height });
        }
        let expected = width * height;
        if data.len() != expected {
            return Err(DemError::SizeMismatch {
                what: "elevation surface",
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
            crs,
            vertical_crs: None,
            nodata: None,
        })
    }

    /// Create a surface with every cell set to `value`.
    pub fn filled(width: usize, height: usize, transform: GeoTransform, crs: Crs, value: f32) -> Self {
        Self {
            data: vec![value; width * height],
            width,
            height,
            transform,
            crs,
            vertical_crs: None,
            nodata: None,
        }
    }

    /// Create a surface by evaluating `f(x, y)` at every cell centre.
    pub fn from_fn<F>(width: usize, height: usize, transform: GeoTransform, crs: Crs, f: F) -> Self
    where
        F: Fn(f64, f64) -> f64 + Sync,
    {
        let data = (0..width * height)
            .into_par_iter()
            .map(|idx| {
                let (x, y) = transform.cell_center(idx % width, idx / width);
                f(x, y) as f32
            })
            .collect();
        Self {
            data,
            width,
            height,
            transform,
            crs,
            vertical_crs: None,
            nodata: None,
        }
    }

    /// Attach a vertical reference system.
    pub fn with_vertical_crs(mut self, vertical_crs: Option<VerticalCrs>) -> Self {
        self.vertical_crs = vertical_crs;
        self
    }

    /// Declare a no-data value; matching cells become NaN.
    pub fn with_nodata(mut self, nodata: Option<f32>) -> Self {
        if let Some(nd) = nodata.filter(|v| v.is_finite()) {
            for value in &mut self.data {
                if (*value - nd).abs() < 1e-3 {
                    *value = f32::NAN;
                }
            }
        }
        self.nodata = nodata;
        self
    }

    /// A surface on the same grid and reference systems with new values.
    pub fn with_data(&self, data: Vec<f32>) -> Result<Self> {
        let mut surface = Self::new(data, self.width, self.height, self.transform, self.crs)?;
        surface.vertical_crs = self.vertical_crs.clone();
        surface.nodata = self.nodata;
        Ok(surface)
    }

    /// Same grid with values computed in-crate, where the length is known to match.
    pub(crate) fn derived(&self, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), self.width * self.height);
        Self {
            data,
            width: self.width,
            height: self.height,
            transform: self.transform,
            crs: self.crs,
            vertical_crs: self.vertical_crs.clone(),
            nodata: self.nodata,
        }
    }

    /// Apply `f` to every valid cell; NaN cells stay NaN.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f32) -> f32 + Sync,
    {
        let data = self
            .data
            .par_iter()
            .map(|&v| if v.is_nan() { v } else { f(v) })
            .collect();
        Self { data, ..self.clone() }
    }

    /// Raw values in row-major order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Get the dimensions of this surface in cells `(width, height)`.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Grid width in cells.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height in cells.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Cell-to-world mapping.
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Horizontal reference system.
    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// Vertical reference system, if known.
    pub fn vertical_crs(&self) -> Option<&VerticalCrs> {
        self.vertical_crs.as_ref()
    }

    /// Declared no-data value.
    pub fn nodata(&self) -> Option<f32> {
        self.nodata
    }

    /// Footprint in world coordinates.
    pub fn bounds(&self) -> Bounds {
        self.transform.bounds(self.width, self.height)
    }

    /// Absolute cell size `(x, y)` in world units.
    pub fn resolution(&self) -> (f64, f64) {
        self.transform.resolution()
    }

    /// Number of finite cells.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }

    /// Elevation at a cell, `None` outside the grid or on missing data.
    #[inline]
    pub fn value(&self, col: usize, row: usize) -> Option<f64> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let v = self.data[row * self.width + col];
        v.is_finite().then_some(v as f64)
    }

    /// Elevation at a world coordinate using bilinear interpolation between
    /// the four nearest cell centres.
    ///
    /// Returns `None` outside the grid or when any contributing cell is missing.
    pub fn sample(&self, x: f64, y: f64) -> Option<f64> {
        let last_col = self.width.checked_sub(1)?;
        let last_row = self.height.checked_sub(1)?;
        let (gx, gy) = self.transform.world_to_grid(x, y);
        if !(gx >= 0.0 && gy >= 0.0 && gx <= last_col as f64 && gy <= last_row as f64) {
            return None;
        }

        let x0 = gx.floor() as usize;
        let y0 = gy.floor() as usize;
        let x1 = (x0 + 1).min(last_col);
        let y1 = (y0 + 1).min(last_row);

        let fx = gx - x0 as f64;
        let fy = gy - y0 as f64;

        let v00 = self.value(x0, y0)?;
        let v10 = self.value(x1, y0)?;
        let v01 = self.value(x0, y1)?;
        let v11 = self.value(x1, y1)?;

        Some(
            v00 * (1.0 - fx) * (1.0 - fy)
                + v10 * fx * (1.0 - fy)
                + v01 * (1.0 - fx) * fy
                + v11 * fx * fy,
        )
    }

    /// Elevation of the cell containing a world coordinate (no interpolation).
    pub fn sample_nearest(&self, x: f64, y: f64) -> Option<f64> {
        let (col, row) = self.transform.cell_index(x, y, self.width, self.height)?;
        self.value(col, row)
    }

    /// Bilinear samples at many coordinates; misses are NaN.
    ///
    /// Work is split across threads but the output keeps the input order, so
    /// results do not depend on the thread count.
    pub fn sample_points(&self, xs: &[f64], ys: &[f64]) -> Vec<f64> {
        xs.par_iter()
            .zip(ys.par_iter())
            .map(|(&x, &y)| self.sample(x, y).unwrap_or(f64::NAN))
            .collect()
    }

    /// The same values with georeferencing moved by `(dx, dy)` world units.
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            transform: self.transform.translated(dx, dy),
            ..self.clone()
        }
    }

    /// Whether another raster shares this grid exactly.
    pub fn same_grid(&self, transform: &GeoTransform, width: usize, height: usize) -> bool {
        self.width == width && self.height == height && self.transform.approx_eq(transform)
    }

    /// Fail unless `other` is on the same grid.
    pub fn check_same_grid(&self, other: &ElevationSurface) -> Result<()> {
        if self.same_grid(&other.transform, other.width, other.height) {
            Ok(())
        } else {
            Err(DemError::GridMismatch(format!(
                "{}x{} {:?} vs {}x{} {:?}",
                self.width, self.height, self.transform, other.width, other.height, other.transform
            )))
        }
    }

    /// Resample onto another grid with bilinear interpolation.
    ///
    /// The target grid is assumed to be in this surface's CRS.
    pub fn resample_to(&self, transform: GeoTransform, width: usize, height: usize) -> Self {
        let data = (0..width * height)
            .into_par_iter()
            .map(|idx| {
                let (x, y) = transform.cell_center(idx % width, idx / width);
                self.sample(x, y).map_or(f32::NAN, |v| v as f32)
            })
            .collect();
        Self {
            data,
            width,
            height,
            transform,
            crs: self.crs,
            vertical_crs: self.vertical_crs.clone(),
            nodata: self.nodata,
        }
    }

    /// Cell-wise `self - other` on a shared grid.
    pub fn difference(&self, other: &ElevationSurface) -> Result<Self> {
        self.check_same_grid(other)?;
        let data = self
            .data
            .par_iter()
            .zip(other.data.par_iter())
            .map(|(a, b)| a - b)
            .collect();
        self.with_data(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane() -> ElevationSurface {
        let gt = GeoTransform::north_up(0.0, 100.0, 10.0).unwrap();
        ElevationSurface::from_fn(10, 10, gt, Crs::Local, |x, y| 2.0 * x + y)
    }

    #[test]
    fn test_empty_grid() {
        let gt = GeoTransform::north_up(0.0, 0.0, 1.0).unwrap();
        let err = ElevationSurface::new(Vec::new(), 0, 0, gt, Crs::Local).unwrap_err();
        assert!(matches!(err, DemError::EmptyGrid { width: 0, height: 0 }));
        assert!(ElevationSurface::new(Vec::new(), 4, 0, gt, Crs::Local).is_err());

        let empty = ElevationSurface::filled(0, 0, gt, Crs::Local, 1.0);
        assert_eq!(empty.sample(0.0, 0.0), None);
        assert!(empty.sample_points(&[0.0, 1.0], &[0.0, -1.0]).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_size_mismatch() {
        let gt = GeoTransform::north_up(0.0, 0.0, 1.0).unwrap();
        let err = ElevationSurface::new(vec![0.0; 5], 2, 3, gt, Crs::Local).unwrap_err();
        assert!(matches!(err, DemError::SizeMismatch { expected: 6, actual: 5, .. }));
    }

    #[test]
    fn test_bilinear_is_exact_on_plane() {
        let surface = plane();
        let v = surface.sample(33.0, 41.0).unwrap();
        assert!((v - (66.0 + 41.0)).abs() < 1e-4);
    }

    #[test]
    fn test_sample_outside_centres() {
        let surface = plane();
        // Outer half-cell has no neighbour to interpolate from
        assert!(surface.sample(1.0, 50.0).is_none());
        assert!(surface.sample(5.0, 95.0).is_some());
        assert!(surface.sample(-5.0, 50.0).is_none());
    }

    #[test]
    fn test_nodata_becomes_nan() {
        let gt = GeoTransform::north_up(0.0, 20.0, 10.0).unwrap();
        let surface = ElevationSurface::new(vec![1.0, -9999.0, 3.0, 4.0], 2, 2, gt, Crs::Local)
            .unwrap()
            .with_nodata(Some(-9999.0));
        assert_eq!(surface.valid_count(), 3);
        assert!(surface.value(1, 0).is_none());
        assert!(surface.sample(10.0, 10.0).is_none());
        assert_eq!(surface.nodata(), Some(-9999.0));
    }

    #[test]
    fn test_sample_points_keeps_order() {
        let surface = plane();
        let xs = [15.0, 85.0, -100.0];
        let ys = [85.0, 15.0, 50.0];
        let values = surface.sample_points(&xs, &ys);
        assert!((values[0] - 115.0).abs() < 1e-4);
        assert!((values[1] - 185.0).abs() < 1e-4);
        assert!(values[2].is_nan());
    }

    #[test]
    fn test_resample_to_translated_grid() {
        let surface = plane();
        let target = surface.transform().translated(5.0, 0.0);
        let resampled = surface.resample_to(target, 10, 10);
        let (x, y) = target.cell_center(2, 2);
        assert!((resampled.value(2, 2).unwrap() - (2.0 * x + y)).abs() < 1e-3);
        // Last column now falls past the final source centre
        assert!(resampled.value(9, 2).is_none());
    }

    #[test]
    fn test_difference_requires_same_grid() {
        let a = plane();
        let b = a.map(|v| v - 1.0);
        let dh = a.difference(&b).unwrap();
        assert!(dh.data().iter().all(|&v| (v - 1.0).abs() < 1e-6));

        let shifted = b.translated(10.0, 0.0);
        assert!(matches!(a.difference(&shifted), Err(DemError::GridMismatch(_))));
    }
}
