//! Regular rectangular grid construction
//!
//! A grid covers an axis-aligned extent with square cells of a fixed edge
//! length. Cells are numbered row-major (`id = row * nx + col`) starting at
//! the extent's minimum corner.
//!
//! Sizing uses the ceiling convention: `nx = ceil((max_x - min_x) / cell_size)`
//! (at least 1), grown by one if floating-point rounding would leave the
//! extent's maximum uncovered. Cell rectangles are half-open
//! (`[x0, x1) × [y0, y1)`), except that the last column and the last row
//! include their outer edge so the extent's own maximum is always covered.

use crate::error::{CompareError, Result};
use serde::Serialize;

/// Axis-aligned bounding rectangle `(min_x, min_y, max_x, max_y)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Bounding rectangle of a set of coordinates (None if empty)
    pub fn from_coords<I>(coords: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        coords.into_iter().fold(None, |acc, (x, y)| {
            Some(match acc {
                None => Bounds::new(x, y, x, y),
                Some(b) => Bounds::new(
                    b.min_x.min(x),
                    b.min_y.min(y),
                    b.max_x.max(x),
                    b.max_y.max(y),
                ),
            })
        })
    }

    /// Smallest rectangle covering both extents
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    fn validate(&self) -> Result<()> {
        let all_finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(CompareError::InvalidBounds(format!(
                "non-finite extent {}",
                self
            )));
        }
        if self.max_x <= self.min_x || self.max_y <= self.min_y {
            return Err(CompareError::InvalidBounds(format!(
                "degenerate or inverted extent {}",
                self
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// Grid dimensions, produced once by [`build_grid`] and passed explicitly
/// to every downstream step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridDims {
    /// Number of columns
    pub nx: usize,
    /// Number of rows
    pub ny: usize,
}

impl GridDims {
    /// Total number of cells
    pub fn len(&self) -> usize {
        self.nx.saturating_mul(self.ny)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_id(&self, id: usize) -> bool {
        id < self.len()
    }

    /// `(col, row)` of a row-major cell id
    pub fn col_row(&self, id: usize) -> (usize, usize) {
        (id % self.nx, id / self.nx)
    }

    /// Row-major cell id of `(col, row)`
    pub fn id_of(&self, col: usize, row: usize) -> usize {
        row * self.nx + col
    }
}

/// Rectangle of one cell
///
/// `contains` is half-open on both axes; `closed_x`/`closed_y` mark the
/// grid's outermost column/row whose max edge is inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellPolygon {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    closed_x: bool,
    closed_y: bool,
}

impl CellPolygon {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let in_x = x >= self.x0 && (x < self.x1 || (self.closed_x && x == self.x1));
        let in_y = y >= self.y0 && (y < self.y1 || (self.closed_y && y == self.y1));
        in_x && in_y
    }

    /// Closed ring as WKT, counter-clockwise from the min corner
    pub fn to_wkt(&self) -> String {
        format!(
            "POLYGON (({x0} {y0}, {x1} {y0}, {x1} {y1}, {x0} {y1}, {x0} {y0}))",
            x0 = self.x0,
            y0 = self.y0,
            x1 = self.x1,
            y1 = self.y1
        )
    }
}

/// One grid cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub id: usize,
    pub col: usize,
    pub row: usize,
    pub polygon: CellPolygon,
}

/// Regular grid of square cells
#[derive(Debug, Clone)]
pub struct Grid {
    origin_x: f64,
    origin_y: f64,
    cell_size: f64,
    reference: Option<String>,
    dims: GridDims,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Coordinate reference label the grid was built for, if any
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// Minimum corner of the grid
    pub fn origin(&self) -> (f64, f64) {
        (self.origin_x, self.origin_y)
    }

    /// Extent actually covered by the cells (may exceed the requested bounds)
    pub fn extent(&self) -> Bounds {
        Bounds::new(
            self.origin_x,
            self.origin_y,
            self.origin_x + self.dims.nx as f64 * self.cell_size,
            self.origin_y + self.dims.ny as f64 * self.cell_size,
        )
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, id: usize) -> Option<&Cell> {
        self.cells.get(id)
    }

    pub fn cell_at(&self, col: usize, row: usize) -> Option<&Cell> {
        if col >= self.dims.nx || row >= self.dims.ny {
            return None;
        }
        self.cells.get(self.dims.id_of(col, row))
    }
}

/// Upper bound on the number of cells a grid may hold
pub const MAX_CELLS: usize = 50_000_000;

/// Number of cells of `size` needed along one axis to cover `[min, max]`,
/// or `None` when that exceeds [`MAX_CELLS`]
fn axis_cells(min: f64, max: f64, size: f64) -> Option<usize> {
    let ratio = ((max - min) / size).ceil().max(1.0);
    if !ratio.is_finite() || ratio > MAX_CELLS as f64 {
        return None;
    }
    let mut n = ratio as usize;
    while min + n as f64 * size < max {
        n += 1;
        if n > MAX_CELLS {
            return None;
        }
    }
    Some(n)
}

/// Build a regular grid covering `bounds` with square cells of `cell_size`
///
/// Fails with `InvalidCellSize` for non-positive sizes, with
/// `InvalidBounds` for degenerate or inverted extents and with
/// `GridTooLarge` when the cell count would exceed [`MAX_CELLS`].
pub fn build_grid(bounds: Bounds, cell_size: f64, reference: Option<&str>) -> Result<Grid> {
    if !(cell_size.is_finite() && cell_size > 0.0) {
        return Err(CompareError::InvalidCellSize(cell_size));
    }
    bounds.validate()?;

    let too_large = || CompareError::GridTooLarge {
        bounds: bounds.to_string(),
        cell_size,
    };
    let nx = axis_cells(bounds.min_x, bounds.max_x, cell_size).ok_or_else(too_large)?;
    let ny = axis_cells(bounds.min_y, bounds.max_y, cell_size).ok_or_else(too_large)?;
    match nx.checked_mul(ny) {
        Some(total) if total <= MAX_CELLS => {}
        _ => return Err(too_large()),
    }
    let dims = GridDims { nx, ny };

    let mut cells = Vec::with_capacity(dims.len());
    for row in 0..ny {
        for col in 0..nx {
            let x0 = bounds.min_x + col as f64 * cell_size;
            let y0 = bounds.min_y + row as f64 * cell_size;
            cells.push(Cell {
                id: dims.id_of(col, row),
                col,
                row,
                polygon: CellPolygon {
                    x0,
                    y0,
                    x1: bounds.min_x + (col + 1) as f64 * cell_size,
                    y1: bounds.min_y + (row + 1) as f64 * cell_size,
                    closed_x: col + 1 == nx,
                    closed_y: row + 1 == ny,
                },
            });
        }
    }

    Ok(Grid {
        origin_x: bounds.min_x,
        origin_y: bounds.min_y,
        cell_size,
        reference: reference.map(str::to_string),
        dims,
        cells,
    })
}
