//! Benchmarks of the sampling hot path.
//!
//! ```bash
//! cargo bench -p demreg-coreg
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use demreg_coreg::{FitData, FitOptions, Reference};
use demreg_dem::{Crs, ElevationSurface, GeoTransform};

fn hills(size: usize) -> ElevationSurface {
    let gt = GeoTransform::north_up(0.0, size as f64 * 10.0, 10.0).unwrap();
    ElevationSurface::from_fn(size, size, gt, Crs::Local, |x, y| {
        500.0 + 40.0 * (x / 300.0).sin() * (y / 250.0).cos()
    })
}

/// Bilinear sampling of every cell centre at a sub-pixel offset.
fn bench_residuals(c: &mut Criterion) {
    let mut group = c.benchmark_group("residuals");

    for size in [250usize, 500, 1000].iter() {
        let surface = hills(*size);
        let data = FitData::prepare(
            &Reference::Surface(&surface),
            &surface,
            None,
            &FitOptions::seeded(0),
        )
        .expect("benchmark surface is valid");
        group.throughput(Throughput::Elements(data.len() as u64));

        group.bench_with_input(BenchmarkId::new("shifted", size), &data, |b, data| {
            b.iter(|| black_box(data.residuals(&surface, 3.3, -1.7)));
        });
    }

    group.finish();
}

/// Validation, filtering and seeded subsampling of a surface reference.
fn bench_prepare(c: &mut Criterion) {
    let mut group = c.benchmark_group("prepare");
    group.sample_size(20);

    for size in [500usize, 1000].iter() {
        let surface = hills(*size);
        let options = FitOptions {
            subsample: 100_000,
            ..FitOptions::seeded(0)
        };
        group.bench_with_input(BenchmarkId::new("subsample", size), &surface, |b, surface| {
            b.iter(|| {
                black_box(
                    FitData::prepare(&Reference::Surface(surface), surface, None, &options)
                        .expect("benchmark surface is valid"),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_residuals, bench_prepare);
criterion_main!(benches);
