//! Per-cell aggregation and two-dataset comparison
//!
//! Assignments are grouped by cell id, each group is reduced to one value
//! per dataset, and the comparison grid is built over the union of the
//! populated cells. The difference is always `dl - orig`.

use crate::assign::Assignment;
use crate::error::{CompareError, Result};
use crate::grid::{CellPolygon, Grid, GridDims};
use std::collections::BTreeMap;

/// How to reduce all point values falling in one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregation {
    /// Maximum of the cell's values
    #[default]
    Max,
}

impl Aggregation {
    /// Names accepted by [`Aggregation::parse`]
    pub const SUPPORTED: &'static [&'static str] = &["max"];

    /// Parse from a method name (case-insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "max" => Ok(Self::Max),
            _ => Err(CompareError::UnsupportedMethod(s.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Max => "max",
        }
    }

    fn accumulator(&self) -> Accumulator {
        match self {
            Self::Max => Accumulator::Max(None),
        }
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Running state of one cell's reduction
///
/// Values are pushed in input order, so order-sensitive methods stay
/// reproducible. NaN values are skipped; a group with nothing else
/// finishes as `None`.
#[derive(Debug, Clone)]
enum Accumulator {
    Max(Option<f64>),
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        match self {
            Accumulator::Max(current) => {
                *current = Some(current.map_or(value, |c| c.max(value)));
            }
        }
    }

    fn finish(self) -> Option<f64> {
        match self {
            Accumulator::Max(current) => current,
        }
    }
}

/// Aggregate of one dataset in one populated cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellValue {
    pub id: usize,
    pub col: usize,
    pub row: usize,
    pub polygon: CellPolygon,
    pub value: f64,
}

/// Comparison record for a cell populated by at least one dataset
///
/// A side with no points is `None`, never zero. `difference` is `dl - orig`
/// and only present when both sides are.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellComparison {
    pub id: usize,
    pub col: usize,
    pub row: usize,
    pub polygon: CellPolygon,
    pub orig: Option<f64>,
    pub dl: Option<f64>,
    pub difference: Option<f64>,
}

/// The three output grids of a comparison, each ordered by cell id
#[derive(Debug, Clone)]
pub struct ComparisonGrids {
    pub method: Aggregation,
    pub dims: GridDims,
    pub orig: Vec<CellValue>,
    pub dl: Vec<CellValue>,
    pub comparison: Vec<CellComparison>,
}

impl ComparisonGrids {
    /// Number of cells populated by both datasets
    pub fn n_overlapping(&self) -> usize {
        self.comparison
            .iter()
            .filter(|c| c.difference.is_some())
            .count()
    }
}

/// Group assignments by cell id and reduce each group
fn reduce_by_cell(
    assignments: &[Assignment],
    dims: GridDims,
    method: Aggregation,
) -> Result<BTreeMap<usize, f64>> {
    let mut groups: BTreeMap<usize, Accumulator> = BTreeMap::new();

    for a in assignments {
        if !dims.contains_id(a.id) {
            return Err(CompareError::CellOutOfRange {
                id: a.id,
                nx: dims.nx,
                ny: dims.ny,
            });
        }
        groups
            .entry(a.id)
            .or_insert_with(|| method.accumulator())
            .push(a.point.value);
    }

    Ok(groups
        .into_iter()
        .filter_map(|(id, acc)| acc.finish().map(|value| (id, value)))
        .collect())
}

fn to_cell_values(reduced: &BTreeMap<usize, f64>, grid: &Grid) -> Vec<CellValue> {
    reduced
        .iter()
        .filter_map(|(&id, &value)| {
            grid.cell(id).map(|cell| CellValue {
                id,
                col: cell.col,
                row: cell.row,
                polygon: cell.polygon,
                value,
            })
        })
        .collect()
}

/// Aggregate both datasets per cell and compare them
///
/// `grid` must be the grid both assignment lists were produced from; its
/// dimensions are used as-is. Cells without points produce no records.
pub fn compare(
    orig: &[Assignment],
    dl: &[Assignment],
    grid: &Grid,
    method: Aggregation,
) -> Result<ComparisonGrids> {
    let dims = grid.dims();
    let orig_reduced = reduce_by_cell(orig, dims, method)?;
    let dl_reduced = reduce_by_cell(dl, dims, method)?;

    let mut union: BTreeMap<usize, (Option<f64>, Option<f64>)> = BTreeMap::new();
    for (&id, &value) in &orig_reduced {
        union.entry(id).or_default().0 = Some(value);
    }
    for (&id, &value) in &dl_reduced {
        union.entry(id).or_default().1 = Some(value);
    }

    let comparison = union
        .into_iter()
        .filter_map(|(id, (orig_value, dl_value))| {
            grid.cell(id).map(|cell| CellComparison {
                id,
                col: cell.col,
                row: cell.row,
                polygon: cell.polygon,
                orig: orig_value,
                dl: dl_value,
                difference: match (orig_value, dl_value) {
                    (Some(o), Some(d)) => Some(d - o),
                    _ => None,
                },
            })
        })
        .collect();

    Ok(ComparisonGrids {
        method,
        dims,
        orig: to_cell_values(&orig_reduced, grid),
        dl: to_cell_values(&dl_reduced, grid),
        comparison,
    })
}
