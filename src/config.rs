//! Run configuration from properties
//!
//! Defaults come from comparison.json via the property registry. User values
//! come from an optional JSON config file and from CLI flags (CLI wins).
//! Input and output locations are not properties; the CLI always supplies them.

use crate::aggregate::Aggregation;
use crate::error::{CompareError, Result};
use crate::properties::PropertyReader;
use crate::table_io::{PointColumns, TableFormat};
use std::path::PathBuf;

/// Metres per kilometre (cell sizes are configured in km, coordinates are in m)
const METRES_PER_KM: f64 = 1000.0;

/// Input and output locations of one run
#[derive(Debug, Clone)]
pub struct RunPaths {
    /// Original dataset (Parquet/CSV)
    pub orig: PathBuf,
    /// DL dataset (Parquet/CSV)
    pub dl: PathBuf,
    /// Output directory
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ComparisonConfig {
    pub paths: RunPaths,

    /// Cell edge length in coordinate units (metres)
    pub cell_size: f64,

    /// Per-cell aggregation
    pub method: Aggregation,

    /// Input column names
    pub columns: PointColumns,

    /// Format of the three output grids
    pub output_format: TableFormat,

    /// Configured coordinate reference; takes precedence over input metadata
    pub reference: Option<String>,
}

impl ComparisonConfig {
    /// Create config from properties
    ///
    /// Unlike other enumerated properties, an unknown `method` is an error
    /// rather than a fallback to the default, and so is an unparsable
    /// `cell.size.km`.
    pub fn from_properties(props: &PropertyReader, paths: RunPaths) -> Result<Self> {
        check_local_location(&paths.orig)?;
        check_local_location(&paths.dl)?;
        check_local_location(&paths.output_dir)?;

        let cell_km = props.get_f64("cell.size.km")?;
        let cell_size = cell_km * METRES_PER_KM;
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(CompareError::InvalidCellSize(cell_size));
        }

        let method = Aggregation::parse(&props.get_string("method"))?;

        let columns = PointColumns {
            x: props.get_string("x.column"),
            y: props.get_string("y.column"),
            geometry: props.get_string("geometry.column"),
            value: props.get_string("value.column"),
        };

        let output_format = TableFormat::parse(&props.get_enum("output.format"));
        let reference = props.get_optional_string("crs");

        Ok(Self {
            paths,
            cell_size,
            method,
            columns,
            output_format,
            reference,
        })
    }

    /// Output path of a named grid, e.g. `<out>/orig_grid.parquet`
    pub fn output_path(&self, stem: &str) -> PathBuf {
        self.paths
            .output_dir
            .join(format!("{}.{}", stem, self.output_format.extension()))
    }
}

/// Reject URI locations (s3://, gs://, file://); only plain local paths are read or written
fn check_local_location(path: &std::path::Path) -> Result<()> {
    let s = path.to_string_lossy();
    if s.contains("://") {
        return Err(CompareError::Config(format!(
            "URI location '{}' is not supported (only local paths)",
            s
        )));
    }
    Ok(())
}
