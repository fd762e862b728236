//! Terrain attributes derived from an elevation surface.

use crate::surface::ElevationSurface;
use rayon::prelude::*;

/// Elevation gradient along world x (east) and y (north).
#[derive(Debug, Clone)]
pub struct Gradient {
    /// dz/dx, per world unit eastwards.
    pub gx: ElevationSurface,
    /// dz/dy, per world unit northwards.
    pub gy: ElevationSurface,
}

impl Gradient {
    /// Horn (3x3 Sobel-weighted) gradient of a surface.
    ///
    /// Neighbours beyond the grid edge or missing are replaced by the centre
    /// value. Missing centre cells produce NaN.
    pub fn horn(surface: &ElevationSurface) -> Self {
        let (width, height) = surface.dimensions();
        let transform = surface.transform();
        let (pw, ph) = (transform.pixel_width, transform.pixel_height);

        let cells: Vec<(f32, f32)> = (0..width * height)
            .into_par_iter()
            .map(|idx| {
                let (col, row) = (idx % width, idx / width);
                let Some(centre) = surface.value(col, row) else {
                    return (f32::NAN, f32::NAN);
                };
                let z = |dc: isize, dr: isize| -> f64 {
                    let c = col as isize + dc;
                    let r = row as isize + dr;
                    if c < 0 || r < 0 {
                        return centre;
                    }
                    surface.value(c as usize, r as usize).unwrap_or(centre)
                };
                let (a, b, c) = (z(-1, -1), z(0, -1), z(1, -1));
                let (d, f) = (z(-1, 0), z(1, 0));
                let (g, h, i) = (z(-1, 1), z(0, 1), z(1, 1));

                let dz_dcol = ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / 8.0;
                let dz_drow = ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / 8.0;
                ((dz_dcol / pw) as f32, (dz_drow / ph) as f32)
            })
            .collect();

        let (gx, gy): (Vec<f32>, Vec<f32>) = cells.into_iter().unzip();
        Self {
            gx: surface.derived(gx),
            gy: surface.derived(gy),
        }
    }

    /// Gradient `(gx, gy)` at a world coordinate, bilinearly interpolated.
    pub fn sample(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        Some((self.gx.sample(x, y)?, self.gy.sample(x, y)?))
    }

    /// Slope in degrees at every cell.
    pub fn slope(&self) -> ElevationSurface {
        self.combine(|gx, gy| slope_degrees(gx as f64, gy as f64) as f32)
    }

    /// Aspect in degrees at every cell.
    pub fn aspect(&self) -> ElevationSurface {
        self.combine(|gx, gy| aspect_degrees(gx as f64, gy as f64) as f32)
    }

    fn combine<F: Fn(f32, f32) -> f32 + Sync>(&self, f: F) -> ElevationSurface {
        let data: Vec<f32> = self
            .gx
            .data()
            .par_iter()
            .zip(self.gy.data().par_iter())
            .map(|(&gx, &gy)| if gx.is_finite() && gy.is_finite() { f(gx, gy) } else { f32::NAN })
            .collect();
        self.gx.derived(data)
    }
}

/// Slope angle in degrees for a gradient.
#[inline]
pub fn slope_degrees(gx: f64, gy: f64) -> f64 {
    gx.hypot(gy).atan().to_degrees()
}

/// Downslope direction in degrees clockwise from north, in `[0, 360)`.
///
/// Flat cells have no aspect and return NaN.
#[inline]
pub fn aspect_degrees(gx: f64, gy: f64) -> f64 {
    if gx == 0.0 && gy == 0.0 {
        return f64::NAN;
    }
    (-gx).atan2(-gy).to_degrees().rem_euclid(360.0)
}

/// Slope of a surface in degrees.
pub fn slope(surface: &ElevationSurface) -> ElevationSurface {
    Gradient::horn(surface).slope()
}

/// Aspect of a surface in degrees clockwise from north.
pub fn aspect(surface: &ElevationSurface) -> ElevationSurface {
    Gradient::horn(surface).aspect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Crs, GeoTransform};
    use approx::assert_relative_eq;

    fn plane(a: f64, b: f64) -> ElevationSurface {
        let gt = GeoTransform::north_up(0.0, 200.0, 10.0).unwrap();
        ElevationSurface::from_fn(20, 20, gt, Crs::Local, move |x, y| a * x + b * y)
    }

    #[test]
    fn test_gradient_of_plane() {
        let g = Gradient::horn(&plane(0.5, -0.25));
        assert_relative_eq!(g.gx.value(10, 10).unwrap(), 0.5, epsilon = 1e-5);
        assert_relative_eq!(g.gy.value(10, 10).unwrap(), -0.25, epsilon = 1e-5);
        // Edge replication damps the gradient along the border but keeps its sign
        assert!(g.gx.value(0, 10).unwrap() > 0.0);
    }

    #[test]
    fn test_slope_and_aspect() {
        // Rising to the east, so downslope faces west
        let surface = plane(1.0, 0.0);
        let slope = slope(&surface);
        let aspect = aspect(&surface);
        assert_relative_eq!(slope.value(5, 5).unwrap(), 45.0, epsilon = 1e-3);
        assert_relative_eq!(aspect.value(5, 5).unwrap(), 270.0, epsilon = 1e-3);
    }

    #[test]
    fn test_aspect_directions() {
        assert_relative_eq!(aspect_degrees(0.0, -1.0), 0.0);
        assert_relative_eq!(aspect_degrees(-1.0, 0.0), 90.0);
        assert_relative_eq!(aspect_degrees(0.0, 1.0), 180.0);
        assert!(aspect_degrees(0.0, 0.0).is_nan());
    }

    #[test]
    fn test_missing_centre_is_nan() {
        let gt = GeoTransform::north_up(0.0, 30.0, 10.0).unwrap();
        let mut data = vec![1.0; 9];
        data[4] = f32::NAN;
        let surface = ElevationSurface::new(data, 3, 3, gt, Crs::Local).unwrap();
        let g = Gradient::horn(&surface);
        assert!(g.gx.value(1, 1).is_none());
        assert_eq!(g.gx.value(0, 0), Some(0.0));
    }
}
