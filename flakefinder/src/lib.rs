//! Flakefinder - detection of exfoliated TMD flakes in optical microscope tiles.
//!
//! Each tile goes through background estimation, contrast thresholding,
//! connected component labeling and shape filtering. Surviving regions are
//! assigned a thickness class from a substrate-specific signature table, and
//! detections from overlapping tiles are merged in the global stage frame.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use flakefinder::{BatchOptions, Pipeline, ReportFormat, RunConfig, TileSource};
//!
//! let config = RunConfig::load("run.yaml".as_ref())?;
//! let pipeline = Pipeline::new(&config)?;
//!
//! let sources = TileSource::from_paths(&["tile_0000.png", "tile_0001.png"]);
//! let report = pipeline.run(&sources, &BatchOptions::default())?;
//! report.write("flakes.csv".as_ref(), ReportFormat::Csv)?;
//!
//! println!("Found {} flakes", report.detections.len());
//! ```

mod aggregate;
mod batch;
mod classification;
pub(crate) mod common;
mod error;
pub mod flake_detection;
mod image_source;
pub(crate) mod math;
mod pipeline;
mod report;
mod run_config;

#[cfg(test)]
pub mod testing;

// ============================================================================
// Core image types
// ============================================================================

pub use crate::common::{Buffer2, Rgb};
pub use image_source::{
    MicroscopeImage, OffsetUnit, ScanGrid, TileEntry, TileInfo, TileManifest, TileSource,
    DEFAULT_PIXEL_SCALE_UM,
};
pub use crate::math::GlobalBox;

// ============================================================================
// Detection
// ============================================================================

pub use flake_detection::{
    calibrate_threshold, BackgroundMethod, Connectivity, ContrastMaps, ContrastMetric,
    DetectionConfig, DetectionDiagnostics, FlakeDetector, Normalization, Region,
    ShapeFilterStats, TileDetection, TileSummary,
};

// ============================================================================
// Classification
// ============================================================================

pub use classification::{
    Classification, ClassifiedRegion, SignatureTable, ThicknessClass, ThicknessClassifier,
    ThicknessSignature, UNCLASSIFIED,
};

// ============================================================================
// Batch processing and aggregation
// ============================================================================

pub use aggregate::{aggregate, AggregationConfig, Detection};
pub use batch::{
    run_batch, run_images, BatchOptions, BatchProgress, BatchResult, ProgressCallback,
    TileFailure,
};
pub use pipeline::Pipeline;
pub use run_config::{CalibrationConfig, RunConfig};

// ============================================================================
// Reports
// ============================================================================

pub use report::{write_overlays, OverlayPaths, Report, ReportFormat, TileRecord, TileStatus};

// ============================================================================
// Errors
// ============================================================================

pub use error::{ConfigError, Error, InputError, OutputError, Result};
