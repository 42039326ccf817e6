//! GeoClaim CLI - satellite hazard assessment and claim decisions

mod scenario;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use geoclaim_algorithms::hazard::Hazard;
use geoclaim_algorithms::orchestrator::{AssessmentRequest, Orchestrator};
use geoclaim_algorithms::threshold::otsu_threshold;
use geoclaim_core::backend::{CachedBackend, LocalBackend, RasterBackend, MAX_HISTOGRAM_BUCKETS};
use geoclaim_core::io::{read_geotiff, write_geotiff};
use geoclaim_core::{Aoi, Image, Raster};
use scenario::Scenario;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "geoclaim")]
#[command(author, version, about = "Satellite hazard assessment and claim decisions", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess a scenario and print the decision as JSON
    Assess {
        /// Scenario TOML file
        scenario: PathBuf,
        /// Evaluate one hazard only: flood, wildfire, roof
        #[arg(long)]
        hazard: Option<String>,
        /// Reduction scale in meters, overriding every hazard's default
        #[arg(short, long)]
        scale: Option<f64>,
        /// Pretty-print the JSON output
        #[arg(short, long)]
        pretty: bool,
    },
    /// Otsu threshold of a change raster
    Otsu {
        /// Input raster file
        input: PathBuf,
        /// Number of histogram buckets
        #[arg(short, long, default_value_t = MAX_HISTOGRAM_BUCKETS)]
        buckets: usize,
        /// Write the 0/1 mask of `value > threshold` here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_raster(path: &Path) -> Result<Raster> {
    let pb = spinner("Reading raster...");
    let raster = read_geotiff(path).context("Failed to read raster")?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("Failed to serialize result")?;
    println!("{}", json);
    Ok(())
}

/// AOI covering a raster's full extent
fn raster_aoi(raster: &Raster) -> Result<Aoi> {
    let (min_x, min_y, max_x, max_y) = raster.bounds();
    Aoi::from_bbox([min_x, min_y, max_x, max_y]).context("Raster has no usable extent")
}

// ─── Commands ───────────────────────────────────────────────────────────

fn assess(path: &Path, hazard: Option<String>, scale: Option<f64>, pretty: bool) -> Result<()> {
    let hazard = hazard
        .map(|h| h.parse::<Hazard>())
        .transpose()
        .context("Invalid --hazard")?;

    let (scenario, base) = Scenario::load(path)?;
    let aoi = scenario.aoi().context("Invalid [aoi]")?;
    let (pre, post) = scenario.windows()?;

    let pb = spinner("Loading acquisitions...");
    let local = scenario.backend(&base)?;
    pb.finish_and_clear();
    info!(
        "Loaded {} acquisitions and {} layers",
        scenario.acquisitions.len(),
        scenario.layers.len()
    );

    let backend = CachedBackend::new(local, scenario.cache);
    let orchestrator = Orchestrator::new(&backend, scenario.params);
    let request = AssessmentRequest {
        aoi,
        pre,
        post,
        hazard,
        scale,
    };

    let pb = spinner("Assessing...");
    let start = Instant::now();
    let assessment = orchestrator.assess(&request);
    pb.finish_and_clear();
    let assessment = assessment.context("Assessment failed")?;
    info!(
        "{}: {} in {:.2?} ({} cached reductions)",
        assessment.best.claim.hazard,
        assessment.best.claim.claim_status,
        start.elapsed(),
        backend.len()
    );

    print_json(&assessment, pretty)
}

fn otsu(input: &Path, buckets: usize, output: Option<&Path>) -> Result<()> {
    let raster = read_raster(input)?;
    let aoi = raster_aoi(&raster)?;

    // One CRS unit per meter keeps reductions at native resolution
    let backend = LocalBackend::new()
        .with_meters_per_unit(1.0)
        .with_layer("input", "delta", raster.clone());
    let delta = Image::band("input", "delta");

    let start = Instant::now();
    let histogram = backend
        .histogram(&delta, &aoi, raster.cell_size(), buckets)
        .context("Failed to compute histogram")?
        .context("Raster has no valid cells")?;
    let threshold = otsu_threshold(&histogram, delta.name()).context("Otsu threshold failed")?;
    let elapsed = start.elapsed();

    let mask = raster.data().mapv(|v| {
        if v.is_nan() {
            f64::NAN
        } else if v > threshold {
            1.0
        } else {
            0.0
        }
    });
    let above = mask.iter().filter(|&&v| v == 1.0).count();
    let valid = histogram.total();

    println!("Threshold: {:.6}", threshold);
    println!("Buckets: {}", histogram.counts.len());
    println!(
        "Above threshold: {} of {} valid cells ({:.1}%)",
        above,
        valid,
        100.0 * above as f64 / valid as f64
    );
    println!("  Processing time: {:.2?}", elapsed);

    if let Some(path) = output {
        let pb = spinner("Writing output...");
        let mask = raster.with_data(mask)?;
        write_geotiff(&mask, path).context("Failed to write output")?;
        pb.finish_and_clear();
        println!("Mask saved to: {}", path.display());
    }
    Ok(())
}

fn raster_info(input: &Path) -> Result<()> {
    let raster = read_raster(input)?;
    let (rows, cols) = raster.shape();
    let bounds = raster.bounds();
    let stats = raster.statistics();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
    println!("Cell size: {}", raster.cell_size());
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    println!("\nStatistics:");
    if let Some(min) = stats.min {
        println!("  Min: {:.4}", min);
    }
    if let Some(max) = stats.max {
        println!("  Max: {:.4}", max);
    }
    if let Some(mean) = stats.mean {
        println!("  Mean: {:.4}", mean);
    }
    println!(
        "  Valid cells: {} ({:.1}%)",
        stats.valid_count,
        100.0 * stats.valid_count as f64 / raster.len() as f64
    );
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Assess {
            scenario,
            hazard,
            scale,
            pretty,
        } => assess(&scenario, hazard, scale, pretty),
        Commands::Otsu {
            input,
            buckets,
            output,
        } => otsu(&input, buckets, output.as_deref()),
        Commands::Info { input } => raster_info(&input),
    }
}
