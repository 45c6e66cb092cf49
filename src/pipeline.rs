//! Comparison pipeline
//!
//! [`compare_datasets`] is the in-memory orchestration:
//! 1. Joint extent of both datasets
//! 2. One shared grid built from that extent
//! 3. Both datasets assigned to the grid
//! 4. Per-cell aggregation and comparison
//!
//! [`run`] wraps it with file I/O: inputs are read, all three grids are
//! computed and serialized to temporary files, and only then renamed into
//! place, followed by `summary.json` and the `done.flag` marker.

use crate::aggregate::{compare, Aggregation, ComparisonGrids};
use crate::assign::assign;
use crate::config::ComparisonConfig;
use crate::error::{CompareError, Result};
use crate::grid::{build_grid, Bounds, GridDims};
use crate::memprof::PhaseLog;
use crate::points::{extent, Dataset, Point, PointSummary};
use crate::table_io::{cells_to_dataframe, comparison_to_dataframe, read_points, write_table};
use polars::prelude::DataFrame;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Name of the completion marker written after all outputs
pub const DONE_FLAG: &str = "done.flag";

/// Name of the run summary written next to the grids
pub const SUMMARY_FILE: &str = "summary.json";

/// Per-dataset counts of one comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatasetCounts {
    /// Points read
    pub points: usize,
    /// Points assigned to a cell
    pub assigned: usize,
    /// Points contained in no cell
    pub dropped: usize,
    /// Cells holding at least one point
    pub populated_cells: usize,
}

/// Result of comparing two in-memory datasets
#[derive(Debug, Clone)]
pub struct ComparisonOutput {
    /// Joint extent of both datasets
    pub extent: Bounds,
    /// Dimensions of the shared grid
    pub dims: GridDims,
    pub grids: ComparisonGrids,
    pub orig_counts: DatasetCounts,
    pub dl_counts: DatasetCounts,
}

/// Joint extent of both datasets; fails only if both are empty
fn joint_extent(orig: &[Point], dl: &[Point]) -> Result<Bounds> {
    match (extent(orig), extent(dl)) {
        (Some(a), Some(b)) => Ok(a.union(&b)),
        (Some(a), None) | (None, Some(a)) => Ok(a),
        (None, None) => Err(CompareError::EmptyInput(
            "both the orig and the dl dataset are empty".to_string(),
        )),
    }
}

/// Grid both datasets on one shared grid and compare them per cell
///
/// One empty dataset yields an empty grid for it; both empty is an error.
/// Component errors are returned unchanged.
pub fn compare_datasets(
    orig: &[Point],
    dl: &[Point],
    cell_size: f64,
    method: Aggregation,
    reference: Option<&str>,
) -> Result<ComparisonOutput> {
    let extent = joint_extent(orig, dl)?;
    let grid = build_grid(extent, cell_size, reference)?;
    let dims = grid.dims();

    let orig_assigned = assign(orig, &grid);
    let dl_assigned = assign(dl, &grid);

    let grids = compare(
        orig_assigned.as_slice(),
        dl_assigned.as_slice(),
        &grid,
        method,
    )?;

    let orig_counts = DatasetCounts {
        points: orig.len(),
        assigned: orig_assigned.len(),
        dropped: orig_assigned.dropped,
        populated_cells: grids.orig.len(),
    };
    let dl_counts = DatasetCounts {
        points: dl.len(),
        assigned: dl_assigned.len(),
        dropped: dl_assigned.dropped,
        populated_cells: grids.dl.len(),
    };

    Ok(ComparisonOutput {
        extent,
        dims,
        grids,
        orig_counts,
        dl_counts,
    })
}

/// Summary of a completed run, also written as summary.json
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub method: String,
    pub cell_size: f64,
    pub reference: Option<String>,
    pub extent: Bounds,
    pub nx: usize,
    pub ny: usize,
    pub orig: DatasetCounts,
    pub dl: DatasetCounts,
    pub comparison_cells: usize,
    pub overlapping_cells: usize,
    pub outputs: Vec<PathBuf>,
    pub elapsed_secs: f64,
}

impl RunSummary {
    /// Total points dropped across both datasets
    pub fn dropped(&self) -> usize {
        self.orig.dropped + self.dl.dropped
    }
}

/// Temporary sibling path for a staged output
fn staging_path(target: &Path, run_id: &uuid::Uuid) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.{}.tmp", name, run_id))
}

/// Best-effort removal of staged files after a failure
fn discard_staged(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        if let Err(e) = std::fs::remove_file(tmp) {
            eprintln!("⚠ Failed to remove staged file {}: {}", tmp.display(), e);
        }
    }
}

/// Write every table to a staging file, then rename them all into place
///
/// Nothing is renamed unless every table was written. If a rename fails,
/// the outputs already renamed and the files still staged are removed.
fn write_outputs(
    config: &ComparisonConfig,
    tables: Vec<(&str, DataFrame)>,
) -> Result<Vec<PathBuf>> {
    let run_id = uuid::Uuid::new_v4();
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(tables.len());

    for (stem, mut df) in tables {
        let target = config.output_path(stem);
        let tmp = staging_path(&target, &run_id);
        if let Err(e) = write_table(&tmp, &mut df, config.output_format) {
            // The failed file may exist partially
            let _ = std::fs::remove_file(&tmp);
            discard_staged(&staged);
            return Err(e);
        }
        println!("  Staged {} ({} cells)", target.display(), df.height());
        staged.push((tmp, target));
    }

    let mut outputs: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for (i, (tmp, target)) in staged.iter().enumerate() {
        if let Err(e) = std::fs::rename(tmp, target) {
            for published in &outputs {
                if let Err(e) = std::fs::remove_file(published) {
                    eprintln!("⚠ Failed to remove output {}: {}", published.display(), e);
                }
            }
            discard_staged(&staged[i..]);
            return Err(e.into());
        }
        outputs.push(target.clone());
    }
    Ok(outputs)
}

/// Coordinate reference of the run: the configured one, else the Original
/// input's, else the DL input's
///
/// Inputs declaring different references are compared as-is with a warning.
fn resolve_reference(
    configured: Option<&str>,
    orig: Option<&str>,
    dl: Option<&str>,
) -> Option<String> {
    if let (Some(o), Some(d)) = (orig, dl) {
        if o != d {
            eprintln!(
                "⚠ Inputs declare different coordinate references ({} vs {}), using {}",
                o,
                d,
                configured.unwrap_or(o)
            );
        }
    }
    configured.or(orig).or(dl).map(str::to_string)
}

/// Remove a completion marker left by a previous run
fn clear_done_flag(output_dir: &Path) -> Result<()> {
    match std::fs::remove_file(output_dir.join(DONE_FLAG)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Run the full comparison: read, grid, compare, write
pub fn run(config: &ComparisonConfig) -> Result<RunSummary> {
    let mut log = PhaseLog::start("run START");

    println!("\n[1/4] Reading inputs...");
    let orig_set = read_points(&config.paths.orig, &config.columns, Dataset::Original)?;
    let dl_set = read_points(&config.paths.dl, &config.columns, Dataset::Dl)?;
    let reference = resolve_reference(
        config.reference.as_deref(),
        orig_set.reference.as_deref(),
        dl_set.reference.as_deref(),
    );
    let (orig, dl) = (orig_set.points, dl_set.points);
    if let Some(reference) = &reference {
        println!("  CRS: {}", reference);
    }
    println!("  {}", PointSummary::of(Dataset::Original, &orig));
    println!("  {}", PointSummary::of(Dataset::Dl, &dl));
    for (dataset, points) in [(Dataset::Original, &orig), (Dataset::Dl, &dl)] {
        if points.is_empty() {
            eprintln!("⚠ {} dataset is empty, its grid will be empty", dataset);
        }
    }
    log.checkpoint("After reading inputs");

    println!("\n[2/4] Gridding and comparing...");
    let output = compare_datasets(
        &orig,
        &dl,
        config.cell_size,
        config.method,
        reference.as_deref(),
    )?;
    println!(
        "  Grid: {} columns × {} rows = {} cells of {} m over {}",
        output.dims.nx,
        output.dims.ny,
        output.dims.len(),
        config.cell_size,
        output.extent
    );
    for (dataset, counts) in [
        (Dataset::Original, &output.orig_counts),
        (Dataset::Dl, &output.dl_counts),
    ] {
        println!(
            "  {}: {} assigned, {} dropped, {} populated cells",
            dataset, counts.assigned, counts.dropped, counts.populated_cells
        );
        if counts.dropped > 0 {
            eprintln!(
                "⚠ {} {} points fell outside every grid cell",
                counts.dropped, dataset
            );
        }
    }
    println!(
        "  Comparison: {} cells, {} populated by both",
        output.grids.comparison.len(),
        output.grids.n_overlapping()
    );
    log.checkpoint("After comparison");

    println!("\n[3/4] Writing outputs...");
    let tables = vec![
        ("orig_grid", cells_to_dataframe(&output.grids.orig)?),
        ("dl_grid", cells_to_dataframe(&output.grids.dl)?),
        (
            "comp_grid",
            comparison_to_dataframe(&output.grids.comparison, output.grids.method)?,
        ),
    ];
    std::fs::create_dir_all(&config.paths.output_dir)?;
    clear_done_flag(&config.paths.output_dir)?;
    let outputs = write_outputs(config, tables)?;
    log.checkpoint("After writing outputs");

    let summary = RunSummary {
        method: output.grids.method.name().to_string(),
        cell_size: config.cell_size,
        reference,
        extent: output.extent,
        nx: output.dims.nx,
        ny: output.dims.ny,
        orig: output.orig_counts,
        dl: output.dl_counts,
        comparison_cells: output.grids.comparison.len(),
        overlapping_cells: output.grids.n_overlapping(),
        outputs,
        elapsed_secs: log.elapsed_secs(),
    };

    println!("\n[4/4] Writing summary and done flag...");
    let summary_file = std::fs::File::create(config.paths.output_dir.join(SUMMARY_FILE))?;
    serde_json::to_writer_pretty(summary_file, &summary)?;
    std::fs::write(config.paths.output_dir.join(DONE_FLAG), "done")?;
    log.checkpoint("run COMPLETE");

    Ok(summary)
}
