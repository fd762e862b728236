//! Sparse reference elevation samples.

use crate::crs::{Crs, CrsTransformer, VerticalCrs};
use crate::geotransform::Bounds;
use crate::{DemError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// An ordered set of points with named attribute columns.
///
/// One of the columns holds the elevation (for example `h_li` for ICESat-2
/// land-ice heights); the others carry quality or confidence attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    x: Vec<f64>,
    y: Vec<f64>,
    columns: BTreeMap<String, Vec<f64>>,
    crs: Crs,
    vertical_crs: Option<VerticalCrs>,
}

/// Keeps points whose `column` value lies within `[min, max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityFilter {
    /// Attribute column to test.
    pub column: String,
    /// Inclusive lower limit.
    #[serde(default)]
    pub min: Option<f64>,
    /// Inclusive upper limit.
    #[serde(default)]
    pub max: Option<f64>,
}

impl QualityFilter {
    /// Keep points where `column == value`.
    pub fn equals(column: impl Into<String>, value: f64) -> Self {
        Self {
            column: column.into(),
            min: Some(value),
            max: Some(value),
        }
    }

    /// Keep points where `min <= column <= max`.
    pub fn range(column: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            column: column.into(),
            min: Some(min),
            max: Some(max),
        }
    }

    fn accepts(&self, value: f64) -> bool {
        value.is_finite()
            && self.min.map_or(true, |min| value >= min)
            && self.max.map_or(true, |max| value <= max)
    }
}

/// Options for reading points from CSV.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Name of the easting/longitude column.
    pub x_column: String,
    /// Name of the northing/latitude column.
    pub y_column: String,
    /// Field separator.
    pub delimiter: u8,
    /// Lines starting with this byte are skipped.
    pub comment: Option<u8>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            x_column: "x".to_string(),
            y_column: "y".to_string(),
            delimiter: b',',
            comment: Some(b'#'),
        }
    }
}

impl PointCloud {
    /// Create a point set from coordinates.
    pub fn new(x: Vec<f64>, y: Vec<f64>, crs: Crs) -> Result<Self> {
        if x.len() != y.len() {
            return Err(DemError::SizeMismatch {
                what: "point y coordinates",
                width: x.len(),
                height: 1,
                expected: x.len(),
                actual: y.len(),
            });
        }
        Ok(Self {
            x,
            y,
            columns: BTreeMap::new(),
            crs,
            vertical_crs: None,
        })
    }

    /// Add (or replace) a named attribute column.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        if values.len() != self.x.len() {
            return Err(DemError::SizeMismatch {
                what: "point attribute column",
                width: self.x.len(),
                height: 1,
                expected: self.x.len(),
                actual: values.len(),
            });
        }
        self.columns.insert(name.into(), values);
        Ok(self)
    }

    /// Attach a vertical reference system.
    pub fn with_vertical_crs(mut self, vertical_crs: Option<VerticalCrs>) -> Self {
        self.vertical_crs = vertical_crs;
        self
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Whether the set has no points.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Easting (or longitude) of each point.
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    /// Northing (or latitude) of each point.
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// Horizontal reference system.
    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// Vertical reference system, if known.
    pub fn vertical_crs(&self) -> Option<&VerticalCrs> {
        self.vertical_crs.as_ref()
    }

    /// Values of a named column.
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.columns
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| DemError::MissingColumn(name.to_string()))
    }

    /// Names of all attribute columns.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Footprint of the finite coordinates.
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_coords(&self.x, &self.y)
    }

    /// Keep only the points at the given indices, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        let pick = |values: &[f64]| indices.iter().map(|&i| values[i]).collect::<Vec<_>>();
        Self {
            x: pick(&self.x),
            y: pick(&self.y),
            columns: self
                .columns
                .iter()
                .map(|(name, values)| (name.clone(), pick(values)))
                .collect(),
            crs: self.crs,
            vertical_crs: self.vertical_crs.clone(),
        }
    }

    /// Keep only points passing every filter.
    pub fn filter(&self, filters: &[QualityFilter]) -> Result<Self> {
        if filters.is_empty() {
            return Ok(self.clone());
        }
        let columns = filters
            .iter()
            .map(|f| self.column(&f.column).map(|values| (f, values)))
            .collect::<Result<Vec<_>>>()?;
        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| columns.iter().all(|(f, values)| f.accepts(values[i])))
            .collect();
        log::debug!(
            "Quality filters kept {} of {} points",
            keep.len(),
            self.len()
        );
        Ok(self.select(&keep))
    }

    /// Reproject coordinates into `target` using `transformer`.
    pub fn reproject(&self, target: Crs, transformer: &dyn CrsTransformer) -> Result<Self> {
        let mut out = self.clone();
        transformer.transform(self.crs, target, &mut out.x, &mut out.y)?;
        out.crs = target;
        Ok(out)
    }

    /// Read points from a delimited text file with a header row.
    ///
    /// Every column other than the coordinates becomes a numeric attribute.
    /// Empty or `nan` fields are read as NaN.
    pub fn from_csv<P: AsRef<Path>>(path: P, crs: Crs, options: &CsvOptions) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::read_csv(BufReader::new(file), crs, options)
    }

    /// Parse delimited text with a header row.
    pub fn parse_csv(content: &str, crs: Crs, options: &CsvOptions) -> Result<Self> {
        Self::read_csv(content.as_bytes(), crs, options)
    }

    fn read_csv<R: Read>(reader: R, crs: Crs, options: &CsvOptions) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(options.delimiter)
            .comment(options.comment)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let names: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(str::to_string)
            .collect();
        if names.iter().all(|n| n.is_empty()) {
            return Err(DemError::Csv {
                line: 1,
                reason: "missing header row".to_string(),
            });
        }
        let find = |name: &str| {
            names.iter().position(|n| n == name).ok_or(DemError::Csv {
                line: 1,
                reason: format!("no '{}' column in header", name),
            })
        };
        let x_idx = find(&options.x_column)?;
        let y_idx = find(&options.y_column)?;

        let mut values: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            let line = record.position().map_or(0, |p| p.line() as usize);
            for (column, field) in values.iter_mut().zip(record.iter()) {
                let value = if field.is_empty() || field.eq_ignore_ascii_case("nan") {
                    f64::NAN
                } else {
                    field.parse().map_err(|_| DemError::Csv {
                        line,
                        reason: format!("'{}' is not a number", field),
                    })?
                };
                column.push(value);
            }
        }

        let x = std::mem::take(&mut values[x_idx]);
        let y = std::mem::take(&mut values[y_idx]);
        let mut cloud = Self::new(x, y, crs)?;
        for (idx, (name, column)) in names.into_iter().zip(values).enumerate() {
            if idx != x_idx && idx != y_idx {
                cloud = cloud.with_column(name, column)?;
            }
        }
        Ok(cloud)
    }
}

fn csv_error(err: csv::Error) -> DemError {
    let line = err.position().map_or(0, |p| p.line() as usize);
    let reason = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(err) => DemError::Io(err),
        _ => DemError::Csv { line, reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
# ICESat-2 subset
x,y,h_li,atl06_quality_summary
10.5,20.5,1005.0,0
11.5,21.5,1006.5,1
12.5,22.5,nan,0
";

    #[test]
    fn test_parse_csv() {
        let cloud = PointCloud::parse_csv(CSV, Crs::Epsg(32633), &CsvOptions::default()).unwrap();
        assert_eq!(cloud.len(), 3);
        assert_eq!(cloud.x(), &[10.5, 11.5, 12.5]);
        assert_eq!(cloud.column("h_li").unwrap()[1], 1006.5);
        assert!(cloud.column("h_li").unwrap()[2].is_nan());
        let names: Vec<&str> = cloud.column_names().collect();
        assert_eq!(names, vec!["atl06_quality_summary", "h_li"]);
    }

    #[test]
    fn test_parse_csv_bad_field() {
        let err = PointCloud::parse_csv("x,y,z\n1,2,abc\n", Crs::Local, &CsvOptions::default())
            .unwrap_err();
        assert!(matches!(err, DemError::Csv { line: 2, .. }));
    }

    #[test]
    fn test_parse_csv_quoted_fields() {
        let csv = "x,y,\"beam, pair\",h\n1,2,\"3\",5\n";
        let cloud = PointCloud::parse_csv(csv, Crs::Local, &CsvOptions::default()).unwrap();
        assert_eq!(cloud.column("beam, pair").unwrap(), &[3.0]);
        assert_eq!(cloud.column("h").unwrap(), &[5.0]);
    }

    #[test]
    fn test_parse_csv_ragged_row() {
        let err = PointCloud::parse_csv("x,y,h\n1,2,3\n4,5\n", Crs::Local, &CsvOptions::default())
            .unwrap_err();
        assert!(matches!(err, DemError::Csv { line: 3, .. }));
    }

    #[test]
    fn test_parse_csv_semicolons() {
        let options = CsvOptions {
            delimiter: b';',
            ..CsvOptions::default()
        };
        let err = PointCloud::parse_csv("x;y;h\n1,5;2;3\n", Crs::Local, &options).unwrap_err();
        assert!(matches!(err, DemError::Csv { line: 2, .. }));

        let cloud = PointCloud::parse_csv("x;y;h\n1.5;2;3\n", Crs::Local, &options).unwrap();
        assert_eq!(cloud.x(), &[1.5]);
    }

    #[test]
    fn test_quality_filter() {
        let cloud = PointCloud::parse_csv(CSV, Crs::Local, &CsvOptions::default()).unwrap();
        let filtered = cloud
            .filter(&[QualityFilter::equals("atl06_quality_summary", 0.0)])
            .unwrap();
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered.x(), &[10.5, 12.5]);

        let err = cloud.filter(&[QualityFilter::equals("missing", 0.0)]).unwrap_err();
        assert!(matches!(err, DemError::MissingColumn(_)));
    }

    #[test]
    fn test_column_length_checked() {
        let cloud = PointCloud::new(vec![0.0, 1.0], vec![0.0, 1.0], Crs::Local).unwrap();
        assert!(cloud.with_column("z", vec![1.0]).is_err());
    }

    #[test]
    fn test_reproject_with_custom_transformer() {
        struct Offset;
        impl CrsTransformer for Offset {
            fn transform(&self, _: Crs, _: Crs, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
                xs.iter_mut().for_each(|x| *x += 100.0);
                ys.iter_mut().for_each(|y| *y -= 50.0);
                Ok(())
            }
        }

        let cloud = PointCloud::new(vec![1.0], vec![2.0], Crs::WGS84).unwrap();
        let projected = cloud.reproject(Crs::Epsg(32633), &Offset).unwrap();
        assert_eq!(projected.crs(), Crs::Epsg(32633));
        assert_eq!(projected.x(), &[101.0]);
        assert_eq!(projected.y(), &[-48.0]);
    }
}
