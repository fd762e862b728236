//! Synthetic terrain shared by the integration tests.

#![allow(dead_code)]

use demreg_dem::{Crs, ElevationSurface, GeoTransform, PointCloud};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Grid spacing of the synthetic surfaces in metres.
pub const RESOLUTION: f64 = 10.0;

/// Smooth rolling hills with slopes in every direction.
pub fn hills(x: f64, y: f64) -> f64 {
    500.0
        + 40.0 * (x / 300.0).sin() * (y / 250.0).cos()
        + 25.0 * (x / 170.0 + y / 410.0).cos()
        + 0.01 * x
}

fn grid() -> GeoTransform {
    GeoTransform::north_up(0.0, 2000.0, RESOLUTION).unwrap()
}

/// The reference surface.
pub fn reference(size: usize) -> ElevationSurface {
    ElevationSurface::from_fn(size, size, grid(), Crs::Local, hills)
}

/// A copy of the reference displaced so that it is recovered by the shift
/// `(dx, dy, dz)`.
pub fn displaced(size: usize, dx: f64, dy: f64, dz: f64) -> ElevationSurface {
    ElevationSurface::from_fn(size, size, grid(), Crs::Local, |x, y| {
        hills(x + dx, y + dy) - dz
    })
}

/// Random points over the grid sampling the hills, with Gaussian noise.
pub fn noisy_points(count: usize, extent: f64, sigma: f64, seed: u64) -> PointCloud {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let noise = Normal::new(0.0, sigma).unwrap();
    let xs: Vec<f64> = (0..count).map(|_| rng.gen_range(50.0..extent - 50.0)).collect();
    let ys: Vec<f64> = (0..count)
        .map(|_| 2000.0 - rng.gen_range(50.0..extent - 50.0))
        .collect();
    let h: Vec<f64> = xs
        .iter()
        .zip(&ys)
        .map(|(&x, &y)| hills(x, y) + noise.sample(&mut rng))
        .collect();
    let quality: Vec<f64> = (0..count).map(|i| if i % 10 == 0 { 0.0 } else { 1.0 }).collect();
    PointCloud::new(xs, ys, Crs::Local)
        .unwrap()
        .with_column("h", h)
        .unwrap()
        .with_column("quality", quality)
        .unwrap()
}
