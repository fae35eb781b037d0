//! End-to-end run: optional calibration, per-tile detection, aggregation.

use std::sync::Arc;

use crate::aggregate::{aggregate, AggregationConfig};
use crate::batch::{run_images, run_sources, BatchOptions, BatchResult, Preloaded};
use crate::classification::SignatureTable;
use crate::error::{ConfigError, Result};
use crate::flake_detection::{calibrate_threshold, FlakeDetector};
use crate::image_source::{MicroscopeImage, TileSource};
use crate::report::Report;
use crate::run_config::{CalibrationConfig, RunConfig};

#[derive(Debug, Clone)]
pub struct Pipeline {
    detector: FlakeDetector,
    aggregation: AggregationConfig,
    calibration: CalibrationConfig,
}

impl Pipeline {
    /// Validates the config and loads its signature table.
    pub fn new(config: &RunConfig) -> Result<Self, ConfigError> {
        let path = config
            .signature_table
            .as_deref()
            .ok_or(ConfigError::MissingSignatureTable)?;
        let table = SignatureTable::load(path)?;
        Self::with_table(config, table)
    }

    /// Builds a pipeline around an already loaded table.
    pub fn with_table(config: &RunConfig, table: SignatureTable) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            detector: FlakeDetector::new(config.detection.clone(), Arc::new(table))?,
            aggregation: config.aggregation.clone(),
            calibration: config.calibration.clone(),
        })
    }

    pub fn detector(&self) -> &FlakeDetector {
        &self.detector
    }

    /// Runs on image files.
    ///
    /// With calibration enabled the threshold comes from the first
    /// `sample_count` readable tiles; unreadable ones are left to the batch,
    /// which records them as failures.
    pub fn run(&self, sources: &[TileSource], options: &BatchOptions) -> Result<Report> {
        let (detector, preloaded) = if self.calibration.enabled {
            let preloaded = Preloaded::first_readable(
                sources,
                self.calibration.sample_count,
                options.pixel_scale_um,
            );
            if preloaded.images().is_empty() {
                tracing::warn!("No readable tiles to calibrate on, keeping configured threshold");
                (self.detector.clone(), preloaded)
            } else {
                (self.calibrated(preloaded.images())?, preloaded)
            }
        } else {
            (self.detector.clone(), Preloaded::default())
        };

        let batch = run_sources(sources, &preloaded, &detector, options)?;
        Ok(self.finish(&detector, &batch))
    }

    /// Runs on images already in memory.
    pub fn run_images(&self, images: &[MicroscopeImage], options: &BatchOptions) -> Result<Report> {
        let detector = if self.calibration.enabled && !images.is_empty() {
            self.calibrated(images)?
        } else {
            self.detector.clone()
        };

        let batch = run_images(images, &detector, options)?;
        Ok(self.finish(&detector, &batch))
    }

    fn calibrated(&self, samples: &[MicroscopeImage]) -> Result<FlakeDetector, ConfigError> {
        let mut config = self.detector.config().clone();
        config.contrast_threshold = calibrate_threshold(
            samples,
            &config,
            self.calibration.sample_count,
            self.calibration.margin,
        )?;
        FlakeDetector::new(config, Arc::new(self.detector.table().clone()))
    }

    fn finish(&self, detector: &FlakeDetector, batch: &BatchResult) -> Report {
        let detections = aggregate(&batch.tiles, &self.aggregation);
        tracing::info!(
            tiles = batch.tiles.len(),
            detections = detections.len(),
            "Run complete"
        );
        Report::new(detector.config().contrast_threshold, batch, detections)
    }
}
