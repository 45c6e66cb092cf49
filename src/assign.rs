//! Point-to-cell assignment
//!
//! Each point is looked up in a uniform bucket index: the candidate
//! `(col, row)` comes from `floor((coord - origin) / cell_size)`, then the
//! candidate cell's polygon confirms membership. When rounding puts the
//! candidate one cell off, the adjacent cells are tried too, so the polygons
//! stay the source of truth while lookup stays O(1) per point.

use crate::grid::{Cell, Grid, GridDims};
use crate::points::Point;

/// A point tagged with the cell that contains it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub point: Point,
    pub id: usize,
    pub col: usize,
    pub row: usize,
}

/// Result of assigning one dataset to a grid
#[derive(Debug, Clone, Default)]
pub struct Assignments {
    /// Points contained in some cell, in input order
    pub assigned: Vec<Assignment>,
    /// Number of points contained in no cell
    pub dropped: usize,
}

impl Assignments {
    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }

    pub fn as_slice(&self) -> &[Assignment] {
        &self.assigned
    }
}

/// Uniform bucket lookup over a grid's cells
struct CellIndex<'a> {
    grid: &'a Grid,
    dims: GridDims,
    origin: (f64, f64),
    cell_size: f64,
}

impl<'a> CellIndex<'a> {
    fn new(grid: &'a Grid) -> Self {
        Self {
            grid,
            dims: grid.dims(),
            origin: grid.origin(),
            cell_size: grid.cell_size(),
        }
    }

    /// Candidate indices along one axis: the arithmetic bucket first, then
    /// its neighbours, restricted to `[0, n)`
    fn axis_candidates(&self, coord: f64, origin: f64, n: usize) -> Vec<usize> {
        let k = ((coord - origin) / self.cell_size).floor();
        if !k.is_finite() {
            return Vec::new();
        }
        // Far-away coordinates collapse to a bucket just outside the axis
        let k = k.clamp(-2.0, n as f64 + 1.0) as i64;
        [k, k - 1, k + 1]
            .into_iter()
            .filter(|&i| i >= 0 && (i as usize) < n)
            .map(|i| i as usize)
            .collect()
    }

    /// The unique cell whose polygon contains `(x, y)`
    fn locate(&self, x: f64, y: f64) -> Option<&'a Cell> {
        let cols = self.axis_candidates(x, self.origin.0, self.dims.nx);
        let rows = self.axis_candidates(y, self.origin.1, self.dims.ny);

        for &row in &rows {
            for &col in &cols {
                if let Some(cell) = self.grid.cell_at(col, row) {
                    if cell.polygon.contains(x, y) {
                        return Some(cell);
                    }
                }
            }
        }
        None
    }
}

/// Assign each point to the grid cell containing it
///
/// Points outside every cell are dropped and counted. `(col, row)` is
/// recovered from the cell id with the grid's own `nx`.
pub fn assign(points: &[Point], grid: &Grid) -> Assignments {
    let index = CellIndex::new(grid);
    let dims = grid.dims();

    let mut assigned = Vec::with_capacity(points.len());
    let mut dropped = 0usize;

    for point in points {
        match index.locate(point.x, point.y) {
            Some(cell) => {
                let (col, row) = dims.col_row(cell.id);
                assigned.push(Assignment {
                    point: *point,
                    id: cell.id,
                    col,
                    row,
                });
            }
            None => dropped += 1,
        }
    }

    Assignments { assigned, dropped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{build_grid, Bounds};
    use crate::points::Dataset;

    /// Reference O(points × cells) scan
    fn assign_exhaustive(points: &[Point], grid: &Grid) -> Vec<Option<usize>> {
        points
            .iter()
            .map(|p| {
                let hits: Vec<usize> = grid
                    .cells()
                    .iter()
                    .filter(|c| c.polygon.contains(p.x, p.y))
                    .map(|c| c.id)
                    .collect();
                assert!(hits.len() <= 1, "point {:?} in {} cells", p, hits.len());
                hits.first().copied()
            })
            .collect()
    }

    fn pt(x: f64, y: f64) -> Point {
        Point::new(x, y, 1.0, Dataset::Original)
    }

    #[test]
    fn test_interior_point() {
        let grid = build_grid(Bounds::new(0.0, 0.0, 200.0, 100.0), 100.0, None).unwrap();
        let result = assign(&[pt(50.0, 50.0), pt(150.0, 10.0)], &grid);
        assert_eq!(result.dropped, 0);
        assert_eq!(result.assigned[0].id, 0);
        assert_eq!(result.assigned[1].id, 1);
        assert_eq!((result.assigned[1].col, result.assigned[1].row), (1, 0));
    }

    #[test]
    fn test_shared_edge_goes_to_upper_cell() {
        let grid = build_grid(Bounds::new(0.0, 0.0, 200.0, 100.0), 100.0, None).unwrap();
        let result = assign(&[pt(100.0, 50.0)], &grid);
        assert_eq!(result.len(), 1);
        assert_eq!(result.assigned[0].id, 1);
    }

    #[test]
    fn test_horizontal_edge_goes_to_upper_row() {
        let grid = build_grid(Bounds::new(0.0, 0.0, 20.0, 20.0), 10.0, None).unwrap();
        let result = assign(&[pt(5.0, 10.0), pt(10.0, 10.0)], &grid);
        assert_eq!(result.assigned[0].id, 2);
        assert_eq!(result.assigned[1].id, 3);
    }

    #[test]
    fn test_extent_corners_assigned() {
        let grid = build_grid(Bounds::new(0.0, 0.0, 200.0, 100.0), 100.0, None).unwrap();
        let result = assign(&[pt(0.0, 0.0), pt(200.0, 100.0)], &grid);
        assert_eq!(result.dropped, 0);
        assert_eq!(result.assigned[0].id, 0);
        assert_eq!(result.assigned[1].id, 1);
    }

    #[test]
    fn test_outside_points_dropped() {
        let grid = build_grid(Bounds::new(0.0, 0.0, 200.0, 100.0), 100.0, None).unwrap();
        let points = [pt(-0.5, 50.0), pt(50.0, 250.0), pt(f64::NAN, 1.0), pt(10.0, 10.0)];
        let result = assign(&points, &grid);
        assert_eq!(result.dropped, 3);
        assert_eq!(result.len(), 1);
        assert_eq!(result.len() + result.dropped, points.len());
    }

    #[test]
    fn test_far_away_coordinates_dropped() {
        let grid = build_grid(Bounds::new(0.0, 0.0, 200.0, 100.0), 100.0, None).unwrap();
        let points = [
            pt(1e300, 50.0),
            pt(-1e300, 50.0),
            pt(50.0, 1e300),
            pt(50.0, -1e300),
            pt(f64::MAX, f64::MIN),
            pt(50.0, 50.0),
        ];
        let result = assign(&points, &grid);
        assert_eq!(result.dropped, 5);
        assert_eq!(result.assigned[0].id, 0);
    }

    #[test]
    fn test_non_square_grid_col_row() {
        // 7 columns x 2 rows; a sqrt-based nx guess would get this wrong
        let grid = build_grid(Bounds::new(0.0, 0.0, 70.0, 20.0), 10.0, None).unwrap();
        assert_eq!(grid.dims().nx, 7);
        let result = assign(&[pt(65.0, 15.0)], &grid);
        let a = result.assigned[0];
        assert_eq!(a.id, 13);
        assert_eq!((a.col, a.row), (6, 1));
    }

    #[test]
    fn test_matches_exhaustive_scan() {
        let grid = build_grid(Bounds::new(-3.3, 1.7, 41.9, 29.2), 0.7, None).unwrap();
        let mut points = Vec::new();
        let mut x = -3.3;
        while x <= 41.9 {
            let mut y = 1.7;
            while y <= 29.2 {
                points.push(pt(x, y));
                y += 0.35;
            }
            x += 0.35;
        }
        // Points exactly on grid lines
        for k in 0..20 {
            points.push(pt(-3.3 + k as f64 * 0.7, 1.7 + k as f64 * 0.7));
        }

        let expected = assign_exhaustive(&points, &grid);
        let result = assign(&points, &grid);

        let mut assigned = result.assigned.iter();
        for (point, expected_id) in points.iter().zip(expected) {
            if let Some(id) = expected_id {
                let a = assigned.next().unwrap();
                assert_eq!(a.point, *point);
                assert_eq!(a.id, id);
            }
        }
        assert!(assigned.next().is_none());
        assert_eq!(result.dropped, 0);
    }
}
