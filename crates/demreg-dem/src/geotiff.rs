//! GeoTIFF reading and writing.
//!
//! Only the tags needed for a north-up single-band elevation grid are
//! handled: ModelTiepoint (33922), ModelPixelScale (33550), the GeoKey
//! directory (34735) for EPSG codes, and GDAL_NODATA (42113).

use crate::crs::{Crs, VerticalCrs};
use crate::geotransform::GeoTransform;
use crate::surface::ElevationSurface;
use crate::{DemError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const VERTICAL_CS_TYPE_KEY: u16 = 4096;
const RASTER_TYPE_KEY: u16 = 1025;
const MODEL_TYPE_KEY: u16 = 1024;

/// Load an elevation surface from a GeoTIFF file.
///
/// Files without GeoKeys get [`Crs::Local`].
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<ElevationSurface> {
    let path = path.as_ref();
    let file = BufReader::new(File::open(path)?);
    let mut decoder = Decoder::new(file)?;

    // Large DEMs exceed the default decoding limits
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024; // 1 GB
    limits.intermediate_buffer_size = 1024 * 1024 * 1024; // 1 GB
    limits.ifd_value_size = 1024 * 1024 * 1024;
    decoder = decoder.with_limits(limits);

    let (width, height) = decoder.dimensions()?;
    let transform = read_geotransform(&mut decoder, width, height, path)?;
    let (crs, vertical_crs) = read_geokeys(&mut decoder);
    let nodata = read_nodata_value(&mut decoder);
    let data = decode_elevation_data(&mut decoder)?;

    log::debug!(
        "Read {}x{} grid from {} ({}, nodata {:?})",
        width,
        height,
        path.display(),
        crs,
        nodata
    );

    Ok(
        ElevationSurface::new(data, width as usize, height as usize, transform, crs)?
            .with_vertical_crs(vertical_crs)
            .with_nodata(nodata),
    )
}

/// Write an elevation surface as a single-band float GeoTIFF.
///
/// NaN cells are written as the surface's no-data value when one is declared.
pub fn write_geotiff<P: AsRef<Path>>(surface: &ElevationSurface, path: P) -> Result<()> {
    let path = path.as_ref();
    let (width, height) = surface.dimensions();
    let data: Vec<f32> = match surface.nodata() {
        Some(nd) => surface
            .data()
            .iter()
            .map(|&v| if v.is_nan() { nd } else { v })
            .collect(),
        None => surface.data().to_vec(),
    };

    let transform = surface.transform();
    let scale = [transform.pixel_width.abs(), transform.pixel_height.abs(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
    let geokeys = geokey_directory(surface.crs(), surface.vertical_crs())?;

    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    let mut image = encoder.new_image::<colortype::Gray32Float>(width as u32, height as u32)?;
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE), &scale[..])?;
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(MODEL_TIEPOINT), &tiepoint[..])?;
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY), &geokeys[..])?;
    if let Some(nd) = surface.nodata() {
        let text = nd.to_string();
        image
            .encoder()
            .write_tag(Tag::from_u16_exhaustive(GDAL_NODATA), text.as_str())?;
    }
    image.write_data(&data)?;

    log::debug!("Wrote {}x{} grid to {}", width, height, path.display());
    Ok(())
}

/// Read the geotransform from ModelTiepoint and ModelPixelScale.
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    width: u32,
    height: u32,
    path: &Path,
) -> Result<GeoTransform> {
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT));
    let pixel_scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE));

    match (tiepoint, pixel_scale) {
        (Ok(tiepoint), Ok(scale)) if tiepoint.len() >= 6 && scale.len() >= 2 => {
            // Tiepoint format: [i, j, k, x, y, z] maps raster (i, j) to world (x, y)
            let (i, j) = (tiepoint[0], tiepoint[1]);
            let (scale_x, scale_y) = (scale[0], scale[1]);
            let origin_x = tiepoint[3] - i * scale_x;
            let origin_y = tiepoint[4] + j * scale_y;
            GeoTransform::new(origin_x, origin_y, scale_x, -scale_y)
        }
        _ => {
            log::warn!(
                "{} has no georeferencing tags, using a unit grid for its {}x{} cells",
                path.display(),
                width,
                height
            );
            GeoTransform::new(0.0, height as f64, 1.0, -1.0)
        }
    }
}

/// Read horizontal and vertical EPSG codes from the GeoKey directory.
fn read_geokeys<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> (Crs, Option<VerticalCrs>) {
    let Ok(keys) = decoder.get_tag_u16_vec(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY)) else {
        return (Crs::Local, None);
    };

    let mut crs = Crs::Local;
    let mut vertical = None;
    // Header is 4 shorts, followed by [key, location, count, value] entries
    for entry in keys.get(4..).unwrap_or_default().chunks_exact(4) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 {
            continue;
        }
        match key {
            PROJECTED_CS_TYPE_KEY | GEOGRAPHIC_TYPE_KEY if value != 0 && value != 32767 => {
                // A projected code wins over the underlying geographic one
                if key == PROJECTED_CS_TYPE_KEY || crs == Crs::Local {
                    crs = Crs::Epsg(value as u32);
                }
            }
            VERTICAL_CS_TYPE_KEY if value != 0 && value != 32767 => {
                vertical = Some(vertical_from_epsg(value));
            }
            _ => {}
        }
    }
    (crs, vertical)
}

fn vertical_from_epsg(code: u16) -> VerticalCrs {
    match code {
        5773 => VerticalCrs::Geoid("EGM96".to_string()),
        3855 => VerticalCrs::Geoid("EGM2008".to_string()),
        5703 => VerticalCrs::Geoid("NAVD88".to_string()),
        other => VerticalCrs::Geoid(format!("EPSG:{}", other)),
    }
}

fn vertical_to_epsg(vertical: &VerticalCrs) -> Option<u16> {
    match vertical {
        VerticalCrs::Geoid(name) => match name.as_str() {
            "EGM96" => Some(5773),
            "EGM2008" => Some(3855),
            "NAVD88" => Some(5703),
            other => other.strip_prefix("EPSG:").and_then(|c| c.parse().ok()),
        },
        VerticalCrs::Ellipsoid => None,
    }
}

/// Build a minimal GeoKey directory for a CRS.
///
/// GeoKey values are 16-bit, so larger EPSG codes cannot be written.
fn geokey_directory(crs: Crs, vertical: Option<&VerticalCrs>) -> Result<Vec<u16>> {
    let short_code = |code: u32| {
        u16::try_from(code).map_err(|_| {
            DemError::InvalidGeoTiff(format!("EPSG:{} does not fit in a 16-bit GeoKey", code))
        })
    };
    let mut entries: Vec<[u16; 4]> = Vec::new();
    match crs {
        Crs::Epsg(code) if crs.is_geographic() => {
            entries.push([MODEL_TYPE_KEY, 0, 1, 2]);
            entries.push([RASTER_TYPE_KEY, 0, 1, 1]);
            entries.push([GEOGRAPHIC_TYPE_KEY, 0, 1, short_code(code)?]);
        }
        Crs::Epsg(code) => {
            entries.push([MODEL_TYPE_KEY, 0, 1, 1]);
            entries.push([RASTER_TYPE_KEY, 0, 1, 1]);
            entries.push([PROJECTED_CS_TYPE_KEY, 0, 1, short_code(code)?]);
        }
        Crs::Local => {
            entries.push([RASTER_TYPE_KEY, 0, 1, 1]);
        }
    }
    if let Some(code) = vertical.and_then(vertical_to_epsg) {
        entries.push([VERTICAL_CS_TYPE_KEY, 0, 1, code]);
    }

    let mut directory = vec![1, 1, 0, entries.len() as u16];
    for entry in entries {
        directory.extend_from_slice(&entry);
    }
    Ok(directory)
}

/// Try to read the no-data value from the GDAL_NODATA tag.
fn read_nodata_value<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f32> {
    decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse().ok())
}

/// Decode elevation data from the TIFF decoder.
fn decode_elevation_data<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<Vec<f32>> {
    let result = decoder.read_image()?;

    #[allow(unreachable_patterns)]
    match result {
        DecodingResult::F32(data) => Ok(data),
        DecodingResult::F64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I16(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I32(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U16(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U32(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U8(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I8(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        _ => Err(DemError::UnsupportedDataType("unknown sample format".to_string())),
    }
}
