//! Table I/O: Polars DataFrames to and from Parquet/CSV files
//!
//! Input tables need a value column and either an x and a y column or a
//! point geometry column (WKB as written by GeoParquet, or WKT text). Column
//! names are configurable; any numeric dtype is accepted and cast to f64.
//! For Parquet inputs the coordinate reference is taken from the GeoParquet
//! `geo` file metadata when present.
//!
//! Output grids carry one row per populated cell:
//! `Grid_ID, grid_ix, grid_iy, x_min, y_min, x_max, y_max, geometry` followed
//! by `value` (per-dataset grids) or `orig_<method>, dl_<method>, difference`
//! (comparison grid). `geometry` is the cell rectangle as WKT.

use crate::aggregate::{Aggregation, CellComparison, CellValue};
use crate::error::{CompareError, Result};
use crate::grid::CellPolygon;
use crate::points::{Dataset, Point};
use geozero::wkb::Wkb;
use geozero::wkt::Wkt;
use geozero::ToGeo;
use polars::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Names of the input columns holding coordinates and value
///
/// `x`/`y` are used when both exist, otherwise points come from `geometry`.
#[derive(Debug, Clone, PartialEq)]
pub struct PointColumns {
    pub x: String,
    pub y: String,
    pub geometry: String,
    pub value: String,
}

impl Default for PointColumns {
    fn default() -> Self {
        Self {
            x: "x".to_string(),
            y: "y".to_string(),
            geometry: "geometry".to_string(),
            value: "Te_ppm".to_string(),
        }
    }
}

/// Points of one dataset plus the coordinate reference found in the file
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    pub points: Vec<Point>,
    pub reference: Option<String>,
}

/// On-disk table format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableFormat {
    #[default]
    Parquet,
    Csv,
}

impl TableFormat {
    /// Parse from property value
    ///
    /// Validation happens in PropertyReader::get_enum()
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "csv" => Self::Csv,
            _ => Self::Parquet,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Csv => "csv",
        }
    }

    /// Infer the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "parquet" | "pq" | "geoparquet" => Ok(Self::Parquet),
            "csv" => Ok(Self::Csv),
            _ => Err(CompareError::Config(format!(
                "Cannot infer table format of '{}' (expected .parquet or .csv)",
                path.display()
            ))),
        }
    }
}

/// Read a table from a local Parquet or CSV file
pub fn read_table(path: &Path) -> Result<DataFrame> {
    let df = match TableFormat::from_path(path)? {
        TableFormat::Parquet => {
            let file = std::fs::File::open(path)?;
            ParquetReader::new(file).finish()?
        }
        TableFormat::Csv => CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
    };
    Ok(df)
}

/// Write a table to a local file in the given format
pub fn write_table(path: &Path, df: &mut DataFrame, format: TableFormat) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    match format {
        TableFormat::Parquet => {
            ParquetWriter::new(&mut file).finish(df)?;
        }
        TableFormat::Csv => {
            CsvWriter::new(&mut file).include_header(true).finish(df)?;
        }
    }
    Ok(())
}

/// Extract a column as non-null f64 values
fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df.column(name).map_err(|_| {
        let available: Vec<&str> = df.get_column_names().iter().map(|s| s.as_str()).collect();
        CompareError::Schema(format!(
            "missing column '{}' (available: {})",
            name,
            available.join(", ")
        ))
    })?;

    let series = column
        .as_materialized_series()
        .cast(&DataType::Float64)
        .map_err(|e| CompareError::Schema(format!("column '{}' is not numeric: {}", name, e)))?;

    series
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, opt)| {
            opt.ok_or_else(|| {
                CompareError::Schema(format!("null or non-numeric value in '{}' at row {}", name, row))
            })
        })
        .collect()
}

/// Decode one point geometry; anything but a `POINT` is a schema error
fn point_coords(geometry: geo_types::Geometry<f64>, name: &str, row: usize) -> Result<(f64, f64)> {
    match geometry {
        geo_types::Geometry::Point(p) => Ok((p.x(), p.y())),
        _ => Err(CompareError::Schema(format!(
            "'{}' at row {} is not a point geometry",
            name, row
        ))),
    }
}

/// Extract point coordinates from a WKB (binary) or WKT (string) column
fn geometry_columns(df: &DataFrame, name: &str) -> Result<(Vec<f64>, Vec<f64>)> {
    let series = df.column(name)?.as_materialized_series();
    let decode_error = |row: usize, e: geozero::error::GeozeroError| {
        CompareError::Schema(format!("cannot decode '{}' at row {}: {}", name, row, e))
    };
    let null_error =
        |row: usize| CompareError::Schema(format!("null geometry in '{}' at row {}", name, row));

    let coords: Vec<(f64, f64)> = match series.dtype() {
        DataType::Binary => series
            .binary()?
            .into_iter()
            .enumerate()
            .map(|(row, opt)| {
                let bytes = opt.ok_or_else(|| null_error(row))?;
                let geometry = Wkb(bytes.to_vec()).to_geo().map_err(|e| decode_error(row, e))?;
                point_coords(geometry, name, row)
            })
            .collect::<Result<_>>()?,
        DataType::String => series
            .str()?
            .into_iter()
            .enumerate()
            .map(|(row, opt)| {
                let text = opt.ok_or_else(|| null_error(row))?;
                let geometry = Wkt(text.to_string()).to_geo().map_err(|e| decode_error(row, e))?;
                point_coords(geometry, name, row)
            })
            .collect::<Result<_>>()?,
        other => {
            return Err(CompareError::Schema(format!(
                "geometry column '{}' has dtype {} (expected WKB binary or WKT text)",
                name, other
            )))
        }
    };
    Ok(coords.into_iter().unzip())
}

/// Convert a DataFrame into points of one dataset
pub fn points_from_dataframe(
    df: &DataFrame,
    columns: &PointColumns,
    dataset: Dataset,
) -> Result<Vec<Point>> {
    let has = |name: &str| df.get_column_index(name).is_some();
    let (xs, ys) = if !(has(&columns.x) && has(&columns.y)) && has(&columns.geometry) {
        geometry_columns(df, &columns.geometry)?
    } else {
        (f64_column(df, &columns.x)?, f64_column(df, &columns.y)?)
    };
    let values = f64_column(df, &columns.value)?;
    if let Some(row) = values.iter().position(|v| !v.is_finite()) {
        return Err(CompareError::Schema(format!(
            "non-finite value {} in '{}' at row {}",
            values[row], columns.value, row
        )));
    }

    Ok(xs
        .into_iter()
        .zip(ys)
        .zip(values)
        .map(|((x, y), value)| Point::new(x, y, value, dataset))
        .collect())
}

/// GeoParquet `geo` file metadata, reduced to what is read here
#[derive(Debug, Deserialize)]
struct GeoMetadata {
    primary_column: String,
    #[serde(default)]
    columns: HashMap<String, serde_json::Map<String, serde_json::Value>>,
}

/// Coordinate reference label of a GeoParquet column's `crs` entry
///
/// A missing entry means OGC:CRS84, an explicit `null` an unknown CRS.
/// PROJJSON objects are reduced to `AUTHORITY:CODE`, or their name.
fn crs_label(column: &serde_json::Map<String, serde_json::Value>) -> Option<String> {
    use serde_json::Value;

    match column.get("crs") {
        None => Some("OGC:CRS84".to_string()),
        Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(crs) => {
            let id = &crs["id"];
            let code = match &id["code"] {
                Value::Number(n) => Some(n.to_string()),
                Value::String(s) => Some(s.clone()),
                _ => None,
            };
            match (id["authority"].as_str(), code) {
                (Some(authority), Some(code)) => Some(format!("{}:{}", authority, code)),
                _ => crs["name"].as_str().map(str::to_string),
            }
        }
    }
}

/// Coordinate reference from the GeoParquet `geo` metadata JSON
///
/// Uses the entry of `geometry_column`, falling back to the primary column.
pub fn reference_from_geo_metadata(json: &str, geometry_column: &str) -> Result<Option<String>> {
    let meta: GeoMetadata = serde_json::from_str(json)?;
    Ok(meta
        .columns
        .get(geometry_column)
        .or_else(|| meta.columns.get(&meta.primary_column))
        .and_then(crs_label))
}

/// Raw `geo` key-value metadata of a Parquet file, if any
fn geo_metadata(path: &Path) -> Result<Option<String>> {
    let file = std::fs::File::open(path)?;
    let mut reader = ParquetReader::new(file);
    let metadata = reader.get_metadata()?;
    Ok(metadata
        .key_value_metadata
        .as_ref()
        .and_then(|kvs| kvs.iter().find(|kv| kv.key == "geo"))
        .and_then(|kv| kv.value.clone()))
}

/// `read_points(path)`: read one dataset from a Parquet/CSV file
pub fn read_points(path: &Path, columns: &PointColumns, dataset: Dataset) -> Result<PointSet> {
    let df = read_table(path)?;
    let points = points_from_dataframe(&df, columns, dataset)?;

    let reference = match TableFormat::from_path(path)? {
        TableFormat::Parquet => match geo_metadata(path)? {
            Some(json) => reference_from_geo_metadata(&json, &columns.geometry)?,
            None => None,
        },
        TableFormat::Csv => None,
    };
    Ok(PointSet { points, reference })
}

/// Cell geometry columns shared by every output grid
struct GeometryColumns {
    ids: Vec<i64>,
    cols: Vec<i64>,
    rows: Vec<i64>,
    x_min: Vec<f64>,
    y_min: Vec<f64>,
    x_max: Vec<f64>,
    y_max: Vec<f64>,
    wkt: Vec<String>,
}

impl GeometryColumns {
    fn with_capacity(n: usize) -> Self {
        Self {
            ids: Vec::with_capacity(n),
            cols: Vec::with_capacity(n),
            rows: Vec::with_capacity(n),
            x_min: Vec::with_capacity(n),
            y_min: Vec::with_capacity(n),
            x_max: Vec::with_capacity(n),
            y_max: Vec::with_capacity(n),
            wkt: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, id: usize, col: usize, row: usize, polygon: &CellPolygon) {
        self.ids.push(id as i64);
        self.cols.push(col as i64);
        self.rows.push(row as i64);
        self.x_min.push(polygon.x0);
        self.y_min.push(polygon.y0);
        self.x_max.push(polygon.x1);
        self.y_max.push(polygon.y1);
        self.wkt.push(polygon.to_wkt());
    }

    fn into_dataframe(self) -> Result<DataFrame> {
        let df = df! {
            "Grid_ID" => self.ids,
            "grid_ix" => self.cols,
            "grid_iy" => self.rows,
            "x_min" => self.x_min,
            "y_min" => self.y_min,
            "x_max" => self.x_max,
            "y_max" => self.y_max,
            "geometry" => self.wkt
        }?;
        Ok(df)
    }
}

/// Per-dataset grid as a DataFrame
pub fn cells_to_dataframe(cells: &[CellValue]) -> Result<DataFrame> {
    let mut geometry = GeometryColumns::with_capacity(cells.len());
    let mut values = Vec::with_capacity(cells.len());
    for cell in cells {
        geometry.push(cell.id, cell.col, cell.row, &cell.polygon);
        values.push(cell.value);
    }

    let mut df = geometry.into_dataframe()?;
    df.with_column(Column::new("value".into(), values))?;
    Ok(df)
}

/// Comparison grid as a DataFrame; absent sides are nulls
pub fn comparison_to_dataframe(
    cells: &[CellComparison],
    method: Aggregation,
) -> Result<DataFrame> {
    let mut geometry = GeometryColumns::with_capacity(cells.len());
    let mut orig = Vec::with_capacity(cells.len());
    let mut dl = Vec::with_capacity(cells.len());
    let mut difference = Vec::with_capacity(cells.len());
    for cell in cells {
        geometry.push(cell.id, cell.col, cell.row, &cell.polygon);
        orig.push(cell.orig);
        dl.push(cell.dl);
        difference.push(cell.difference);
    }

    let mut df = geometry.into_dataframe()?;
    df.with_column(Column::new(
        format!("{}_{}", Dataset::Original.label(), method.name()).into(),
        orig,
    ))?;
    df.with_column(Column::new(
        format!("{}_{}", Dataset::Dl.label(), method.name()).into(),
        dl,
    ))?;
    df.with_column(Column::new("difference".into(), difference))?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::compare;
    use crate::assign::assign;
    use crate::grid::{build_grid, Bounds};

    #[test]
    fn test_points_from_dataframe() {
        let df = df! {
            "x" => [50.0, 150.0],
            "y" => [50i64, 10],
            "Te_ppm" => [10.0f32, 2.5]
        }
        .unwrap();

        let points = points_from_dataframe(&df, &PointColumns::default(), Dataset::Dl).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], Point::new(50.0, 50.0, 10.0, Dataset::Dl));
        assert_eq!(points[1].y, 10.0);
        assert_eq!(points[1].value, 2.5);
    }

    /// Little-endian ISO WKB point
    fn wkb_point(x: f64, y: f64) -> Vec<u8> {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&x.to_le_bytes());
        bytes.extend_from_slice(&y.to_le_bytes());
        bytes
    }

    #[test]
    fn test_points_from_wkb_geometry() {
        let mut df = df! { "Te_ppm" => [10.0, 4.0] }.unwrap();
        df.with_column(
            BinaryChunked::from_slice(
                "geometry".into(),
                &[wkb_point(50.0, 50.0), wkb_point(150.5, -10.0)],
            )
            .into_series(),
        )
        .unwrap();

        let points =
            points_from_dataframe(&df, &PointColumns::default(), Dataset::Original).unwrap();
        assert_eq!(points[0], Point::new(50.0, 50.0, 10.0, Dataset::Original));
        assert_eq!((points[1].x, points[1].y), (150.5, -10.0));
    }

    #[test]
    fn test_points_from_wkt_geometry() {
        let df = df! {
            "geometry" => ["POINT (1 2)", "POINT (3.5 4)"],
            "Te_ppm" => [1.0, 2.0]
        }
        .unwrap();

        let points = points_from_dataframe(&df, &PointColumns::default(), Dataset::Dl).unwrap();
        assert_eq!((points[1].x, points[1].y), (3.5, 4.0));
    }

    #[test]
    fn test_xy_columns_take_precedence_over_geometry() {
        let df = df! {
            "x" => [7.0],
            "y" => [8.0],
            "geometry" => ["POINT (1 2)"],
            "Te_ppm" => [1.0]
        }
        .unwrap();

        let points = points_from_dataframe(&df, &PointColumns::default(), Dataset::Dl).unwrap();
        assert_eq!((points[0].x, points[0].y), (7.0, 8.0));
    }

    #[test]
    fn test_non_point_geometry_is_schema_error() {
        let df = df! {
            "geometry" => ["POINT (1 2)", "LINESTRING (0 0, 1 1)"],
            "Te_ppm" => [1.0, 2.0]
        }
        .unwrap();

        match points_from_dataframe(&df, &PointColumns::default(), Dataset::Dl) {
            Err(CompareError::Schema(msg)) => assert!(msg.contains("row 1")),
            other => panic!("unexpected result: {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn test_reference_from_geo_metadata() {
        let projjson = r#"{
            "version": "1.0.0",
            "primary_column": "geometry",
            "columns": {
                "geometry": {
                    "encoding": "WKB",
                    "crs": {"name": "ETRS89-extended / LAEA Europe", "id": {"authority": "EPSG", "code": 3035}}
                }
            }
        }"#;
        assert_eq!(
            reference_from_geo_metadata(projjson, "geometry").unwrap().as_deref(),
            Some("EPSG:3035")
        );

        let named = r#"{"primary_column": "geom", "columns": {"geom": {"crs": {"name": "Local grid"}}}}"#;
        // Unknown column name falls back to the primary column
        assert_eq!(
            reference_from_geo_metadata(named, "geometry").unwrap().as_deref(),
            Some("Local grid")
        );

        let default_crs = r#"{"primary_column": "geometry", "columns": {"geometry": {"encoding": "WKB"}}}"#;
        assert_eq!(
            reference_from_geo_metadata(default_crs, "geometry").unwrap().as_deref(),
            Some("OGC:CRS84")
        );

        let unknown = r#"{"primary_column": "geometry", "columns": {"geometry": {"crs": null}}}"#;
        assert_eq!(reference_from_geo_metadata(unknown, "geometry").unwrap(), None);

        assert!(matches!(
            reference_from_geo_metadata("not json", "geometry"),
            Err(CompareError::Json(_))
        ));
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let df = df! {
            "easting" => [1.0],
            "y" => [1.0],
            "Te_ppm" => [1.0]
        }
        .unwrap();

        let err = points_from_dataframe(&df, &PointColumns::default(), Dataset::Original)
            .unwrap_err();
        match err {
            CompareError::Schema(msg) => {
                assert!(msg.contains("'x'"));
                assert!(msg.contains("easting"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_null_value_is_schema_error() {
        let df = df! {
            "x" => [1.0, 2.0],
            "y" => [1.0, 2.0],
            "Te_ppm" => [Some(1.0), None]
        }
        .unwrap();

        assert!(matches!(
            points_from_dataframe(&df, &PointColumns::default(), Dataset::Original),
            Err(CompareError::Schema(_))
        ));
    }

    #[test]
    fn test_non_finite_value_is_schema_error() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let df = df! {
                "x" => [1.0, 2.0],
                "y" => [1.0, 2.0],
                "Te_ppm" => [1.0, bad]
            }
            .unwrap();

            match points_from_dataframe(&df, &PointColumns::default(), Dataset::Original) {
                Err(CompareError::Schema(msg)) => assert!(msg.contains("row 1")),
                other => panic!("unexpected result: {:?}", other.map(|p| p.len())),
            }
        }
    }

    #[test]
    fn test_comparison_dataframe_layout() {
        let grid = build_grid(Bounds::new(0.0, 0.0, 200.0, 100.0), 100.0, None).unwrap();
        let o = assign(&[Point::new(50.0, 50.0, 10.0, Dataset::Original)], &grid);
        let d = assign(&[Point::new(150.0, 60.0, 4.0, Dataset::Dl)], &grid);
        let grids = compare(o.as_slice(), d.as_slice(), &grid, Aggregation::Max).unwrap();

        let df = comparison_to_dataframe(&grids.comparison, grids.method).unwrap();
        assert_eq!(df.height(), 2);
        let names: Vec<&str> = df.get_column_names().iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Grid_ID", "grid_ix", "grid_iy", "x_min", "y_min", "x_max", "y_max", "geometry",
                "orig_max", "dl_max", "difference"
            ]
        );
        assert_eq!(df.column("difference").unwrap().null_count(), 2);
        assert_eq!(df.column("dl_max").unwrap().null_count(), 1);

        let per_dataset = cells_to_dataframe(&grids.orig).unwrap();
        assert_eq!(per_dataset.height(), 1);
        assert_eq!(per_dataset.width(), 9);
    }

    #[test]
    fn test_empty_grid_dataframe() {
        let df = cells_to_dataframe(&[]).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 9);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(TableFormat::from_path(Path::new("a/b.parquet")).unwrap(), TableFormat::Parquet);
        assert_eq!(TableFormat::from_path(Path::new("b.CSV")).unwrap(), TableFormat::Csv);
        assert!(TableFormat::from_path(Path::new("b.xlsx")).is_err());
        assert_eq!(TableFormat::parse("csv").extension(), "csv");
    }
}
