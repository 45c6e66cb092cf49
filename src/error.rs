use thiserror::Error;

/// Errors that can occur while gridding and comparing point datasets
#[derive(Debug, Error)]
pub enum CompareError {
    /// Degenerate, inverted or non-finite extent
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    /// Non-positive or non-finite cell edge length
    #[error("Invalid cell size: {0} (must be a positive, finite length)")]
    InvalidCellSize(f64),

    /// Extent and cell size would produce more cells than a grid may hold
    #[error("Grid over {bounds} with cell size {cell_size} exceeds the cell limit")]
    GridTooLarge { bounds: String, cell_size: f64 },

    /// Unknown aggregation kind
    #[error("Unsupported comparison method '{0}'")]
    UnsupportedMethod(String),

    /// Input table is missing a required column or holds nulls in it
    #[error("Schema error: {0}")]
    Schema(String),

    /// Both datasets are empty
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Assignment refers to a cell id outside the grid
    #[error("Cell id {id} is outside the grid (nx={nx}, ny={ny})")]
    CellOutOfRange { id: usize, nx: usize, ny: usize },

    /// Configuration error (unreadable config file, unsupported output location, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Table read/write or conversion error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Type alias for Results using CompareError
pub type Result<T> = std::result::Result<T, CompareError>;
