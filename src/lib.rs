//! Grid Compare Library
//!
//! Bins two geolocated point datasets ("orig" and "dl") onto one shared
//! regular grid and compares their per-cell maxima.
//!
//! Module organization:
//! - `grid`: regular grid construction
//! - `assign`: point-to-cell assignment
//! - `aggregate`: per-cell aggregation and comparison
//! - `pipeline`: orchestration and file output
//! - `table_io`: Parquet/CSV tables via Polars
//! - `config` / `properties`: run configuration

pub mod aggregate;
pub mod assign;
pub mod config;
pub mod error;
pub mod grid;
pub mod memprof;
pub mod pipeline;
pub mod points;
pub mod properties;
pub mod table_io;

pub use error::{CompareError, Result};
