//! Grid Compare - command-line entry point
//!
//! Reads the Original and DL point datasets, grids both onto one shared
//! regular grid, and writes the per-dataset max grids, the comparison grid,
//! a run summary and a done flag into the output directory.
//!
//! Usage:
//! ```bash
//! grid_compare --orig orig.parquet --dl dl.parquet --out results/ --cell-km 100 --method max
//! ```

use anyhow::Context;
use clap::Parser;
use grid_compare::config::{ComparisonConfig, RunPaths};
use grid_compare::pipeline;
use grid_compare::properties::PropertyReader;
use std::path::PathBuf;

#[cfg(feature = "jemalloc")]
use tikv_jemallocator::Jemalloc;

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(clap::Parser)]
#[command(version, about = "Compare per-cell maxima of two point datasets on a shared grid")]
struct ClArgs {
    /// Path to the Original dataset (Parquet or CSV)
    #[arg(long)]
    orig: PathBuf,

    /// Path to the DL dataset (Parquet or CSV)
    #[arg(long)]
    dl: PathBuf,

    /// Output directory
    #[arg(long)]
    out: PathBuf,

    /// Cell size in kilometres (default from comparison.json: 100)
    #[arg(long = "cell-km")]
    cell_km: Option<f64>,

    /// Comparison method (default: max)
    #[arg(long)]
    method: Option<String>,

    /// JSON file with property values, e.g. {"value.column": "Te_ppm"}
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    println!("Grid Compare v{}", env!("CARGO_PKG_VERSION"));

    let args = ClArgs::parse();

    match run(args) {
        Ok(()) => println!("\nPipeline finished"),
        Err(e) => {
            eprintln!("\n✗ Pipeline failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: ClArgs) -> anyhow::Result<()> {
    let mut props = match &args.config {
        Some(path) => PropertyReader::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PropertyReader::default(),
    };

    // CLI flags take precedence over the config file
    if let Some(cell_km) = args.cell_km {
        props.set("cell.size.km", cell_km.to_string());
    }
    if let Some(method) = &args.method {
        props.set("method", method.as_str());
    }

    let config = ComparisonConfig::from_properties(
        &props,
        RunPaths {
            orig: args.orig,
            dl: args.dl,
            output_dir: args.out,
        },
    )
    .context("Invalid configuration")?;

    println!("\nConfiguration:");
    println!("  Orig: {}", config.paths.orig.display());
    println!("  DL: {}", config.paths.dl.display());
    println!("  Output: {}", config.paths.output_dir.display());
    println!("  Cell size: {} m", config.cell_size);
    println!("  Method: {}", config.method);
    println!(
        "  Columns: x='{}', y='{}', value='{}'",
        config.columns.x, config.columns.y, config.columns.value
    );
    if let Some(reference) = &config.reference {
        println!("  CRS: {}", reference);
    }

    let summary = pipeline::run(&config).context("Comparison run failed")?;

    println!(
        "\n✓ {} comparison cells written ({} populated by both, {} points dropped) in {:.3}s",
        summary.comparison_cells,
        summary.overlapping_cells,
        summary.dropped(),
        summary.elapsed_secs
    );
    Ok(())
}
