//! Point measurements read from the input datasets

use crate::grid::Bounds;
use serde::Serialize;

/// Which input a point (or aggregate) came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    /// Original measurements
    Original,
    /// DL-derived measurements
    Dl,
}

impl Dataset {
    /// Short label used in output file names and log lines
    pub fn label(&self) -> &'static str {
        match self {
            Dataset::Original => "orig",
            Dataset::Dl => "dl",
        }
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A geolocated scalar measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub value: f64,
    pub dataset: Dataset,
}

impl Point {
    pub fn new(x: f64, y: f64, value: f64, dataset: Dataset) -> Self {
        Self {
            x,
            y,
            value,
            dataset,
        }
    }
}

/// Extent of a point set (None if empty)
pub fn extent(points: &[Point]) -> Option<Bounds> {
    Bounds::from_coords(points.iter().map(|p| (p.x, p.y)))
}

/// Summary statistics for a point set, used for progress output
#[derive(Debug, Clone)]
pub struct PointSummary {
    pub dataset: Dataset,
    pub total: usize,
    pub extent: Option<Bounds>,
    pub value_min: f64,
    pub value_max: f64,
}

impl PointSummary {
    pub fn of(dataset: Dataset, points: &[Point]) -> Self {
        Self {
            dataset,
            total: points.len(),
            extent: extent(points),
            value_min: points.iter().map(|p| p.value).fold(f64::INFINITY, f64::min),
            value_max: points
                .iter()
                .map(|p| p.value)
                .fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

impl std::fmt::Display for PointSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.extent {
            Some(extent) => write!(
                f,
                "{}: {} points, extent {}, values [{:.3}, {:.3}]",
                self.dataset, self.total, extent, self.value_min, self.value_max
            ),
            None => write!(f, "{}: 0 points", self.dataset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent() {
        let points = vec![
            Point::new(3.0, 4.0, 1.0, Dataset::Original),
            Point::new(-1.0, 9.0, 2.0, Dataset::Original),
        ];
        assert_eq!(extent(&points), Some(Bounds::new(-1.0, 4.0, 3.0, 9.0)));
        assert_eq!(extent(&[]), None);
    }

    #[test]
    fn test_summary_display() {
        let points = vec![Point::new(0.0, 0.0, 2.5, Dataset::Dl)];
        let summary = PointSummary::of(Dataset::Dl, &points);
        assert_eq!(summary.total, 1);
        assert_eq!(summary.value_max, 2.5);
        assert!(summary.to_string().starts_with("dl: 1 points"));

        let empty = PointSummary::of(Dataset::Original, &[]);
        assert_eq!(empty.to_string(), "orig: 0 points");
    }
}
