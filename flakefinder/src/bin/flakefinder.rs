use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use flakefinder::{
    BatchOptions, BatchProgress, Pipeline, ProgressCallback, ReportFormat, RunConfig, ScanGrid,
    TileManifest, TileSource,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Detect and classify exfoliated TMD flakes in microscope tiles"
)]
struct Cli {
    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    /// Directory for daily rolling log files.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run detection on images or a tile manifest and write a report.
    Detect(DetectArgs),
    /// Write a serpentine scan manifest covering a rectangular area.
    Grid(GridArgs),
}

#[derive(Args, Debug)]
struct DetectArgs {
    /// Image files, processed as standalone tiles.
    #[arg(required_unless_present = "manifest", conflicts_with = "manifest")]
    images: Vec<PathBuf>,
    /// Tile manifest with stage offsets (YAML or JSON).
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Run configuration (YAML or JSON).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Signature table; overrides the one named in the config.
    #[arg(long)]
    signatures: Option<PathBuf>,
    /// Report path.
    #[arg(long, short, default_value = "flakes.csv")]
    output: PathBuf,
    /// Report format (csv, json, yaml). Defaults to the output extension.
    #[arg(long)]
    format: Option<ReportFormat>,
    /// Contrast threshold override.
    #[arg(long)]
    threshold: Option<f32>,
    /// Derive the threshold from the first tiles of the run.
    #[arg(long)]
    auto_threshold: bool,
    #[arg(long, requires = "auto_threshold")]
    calibration_samples: Option<usize>,
    #[arg(long, requires = "auto_threshold")]
    calibration_margin: Option<f32>,
    /// Write per-tile overlay and highlight PNGs here.
    #[arg(long)]
    overlay_dir: Option<PathBuf>,
    /// Micrometers per pixel for plain image inputs.
    #[arg(long)]
    pixel_scale: Option<f64>,
}

#[derive(Args, Debug)]
struct GridArgs {
    /// Scan area width in micrometers.
    #[arg(long)]
    width_um: f64,
    /// Scan area height in micrometers.
    #[arg(long)]
    height_um: f64,
    #[arg(long)]
    step_x_um: f64,
    #[arg(long)]
    step_y_um: f64,
    #[arg(long, default_value_t = 0.0)]
    origin_x_um: f64,
    #[arg(long, default_value_t = 0.0)]
    origin_y_um: f64,
    #[arg(long, default_value_t = flakefinder::DEFAULT_PIXEL_SCALE_UM)]
    pixel_scale: f64,
    /// File name template; `{index}` is replaced by the visit index.
    #[arg(long, default_value = "tile_{index}.png")]
    file_pattern: String,
    /// Manifest path (YAML or JSON).
    #[arg(long, short, default_value = "manifest.yaml")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    common::log_setup::setup_logging(&cli.log_level, cli.log_dir.as_deref())?;

    match cli.command {
        Command::Detect(args) => detect(args),
        Command::Grid(args) => grid(args),
    }
}

fn detect(args: DetectArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("Failed to load run config '{}'", path.display()))?,
        None => RunConfig::default(),
    };
    if let Some(path) = args.signatures {
        config.signature_table = Some(path);
    }
    if let Some(threshold) = args.threshold {
        config.detection.contrast_threshold = threshold;
    }
    if let Some(scale) = args.pixel_scale {
        config.pixel_scale_um = scale;
    }
    if args.auto_threshold {
        config.calibration.enabled = true;
    }
    if let Some(samples) = args.calibration_samples {
        config.calibration.sample_count = samples;
    }
    if let Some(margin) = args.calibration_margin {
        config.calibration.margin = margin;
    }

    let pipeline = Pipeline::new(&config).context("Invalid configuration")?;

    let (sources, pixel_scale_um) = match &args.manifest {
        Some(path) => {
            let manifest = TileManifest::load(path)
                .with_context(|| format!("Failed to load manifest '{}'", path.display()))?;
            (manifest.sources(), manifest.pixel_scale_um)
        }
        None => (TileSource::from_paths(&args.images), config.pixel_scale_um),
    };

    let format = match args.format {
        Some(format) => format,
        None => ReportFormat::from_path(&args.output)
            .with_context(|| format!("Cannot infer report format from '{}'", args.output.display()))?,
    };

    let options = BatchOptions {
        pixel_scale_um,
        progress: ProgressCallback::new(Arc::new(|p: BatchProgress| {
            tracing::info!(tile = %p.tile_id, "{}/{} tiles", p.completed, p.total);
        })),
        overlay_dir: args.overlay_dir,
        ..Default::default()
    };

    let report = pipeline.run(&sources, &options).context("Detection failed")?;
    let written = report
        .write(&args.output, format)
        .context("Failed to write report")?;

    for path in written {
        println!("{}", path.display());
    }
    tracing::info!(
        detections = report.detections.len(),
        threshold = report.contrast_threshold,
        "Done"
    );
    Ok(())
}

fn grid(args: GridArgs) -> anyhow::Result<()> {
    if !(args.step_x_um > 0.0 && args.step_y_um > 0.0) {
        anyhow::bail!("Scan steps must be positive");
    }

    let mut grid = ScanGrid::covering(args.width_um, args.height_um, args.step_x_um, args.step_y_um);
    grid.origin_x_um = args.origin_x_um;
    grid.origin_y_um = args.origin_y_um;
    grid.file_pattern = args.file_pattern;

    let manifest = grid.to_manifest(args.pixel_scale);
    common::save_file(&manifest, &args.output)
        .with_context(|| format!("Failed to write manifest '{}'", args.output.display()))?;

    tracing::info!(
        columns = grid.columns,
        rows = grid.rows,
        tiles = grid.tile_count(),
        path = %args.output.display(),
        "Wrote scan manifest"
    );
    Ok(())
}
