//! Example: Print elevation, slope and aspect at a world coordinate.
//!
//! Usage: cargo run --example sample_surface -- <dem.tif> <x> <y>

use demreg_dem::terrain::{self, Gradient};
use demreg_dem::read_geotiff;
use std::env;
use std::time::Instant;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 4 {
        eprintln!("Usage: {} <dem.tif> <x> <y>", args[0]);
        std::process::exit(1);
    }

    let x: f64 = args[2].parse().expect("Invalid x");
    let y: f64 = args[3].parse().expect("Invalid y");

    let start = Instant::now();
    let dem = read_geotiff(&args[1]).expect("Failed to read DEM");
    let (width, height) = dem.dimensions();
    println!(
        "Loaded {}x{} grid ({}) in {:.3}s",
        width,
        height,
        dem.crs(),
        start.elapsed().as_secs_f64()
    );

    let bounds = dem.bounds();
    println!(
        "Coverage: x {:.2} to {:.2}, y {:.2} to {:.2}",
        bounds.min_x, bounds.max_x, bounds.min_y, bounds.max_y
    );

    match dem.sample(x, y) {
        Some(z) => println!("Elevation at ({}, {}): {:.2}", x, y, z),
        None => println!("No data at ({}, {})", x, y),
    }

    let gradient = Gradient::horn(&dem);
    if let Some((gx, gy)) = gradient.sample(x, y) {
        println!(
            "Slope {:.2} deg, aspect {:.1} deg",
            terrain::slope_degrees(gx, gy),
            terrain::aspect_degrees(gx, gy)
        );
    }
}
