//! Flake detection in a single microscope tile.
//!
//! Stages, in order:
//! 1. Optional Gaussian pre-blur of the raw image.
//! 2. Background estimation and removal, giving a per-pixel contrast vector.
//! 3. Contrast magnitude and thresholding at `magnitude >= τ`.
//! 4. Connected component labeling and region measurement.
//! 5. Shape filtering (area, aspect ratio, border proximity).
//! 6. Thickness classification against the signature table.

pub mod background;
mod calibration;
mod config;
pub mod labeling;
mod region;
mod shape_filter;
pub mod smoothing;
pub mod threshold;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::classification::{ClassifiedRegion, SignatureTable, ThicknessClassifier};
use crate::common::{Buffer2, Rgb};
use crate::error::ConfigError;
use crate::image_source::{MicroscopeImage, TileInfo};

use background::estimate_background;
use labeling::LabelMap;
use smoothing::gaussian_blur;
use threshold::{magnitude_map, threshold_mask};

pub use calibration::calibrate_threshold;
pub use config::{BackgroundMethod, Connectivity, ContrastMetric, DetectionConfig, Normalization};
pub use region::{extract_regions, Region};
pub(crate) use region::covariance_aspect_ratio;
pub use shape_filter::{filter_regions, ShapeFilterStats};

/// Contrast image of one tile with its magnitude map.
#[derive(Debug, Clone)]
pub struct ContrastMaps {
    pub contrast: Buffer2<Rgb>,
    pub magnitude: Buffer2<f32>,
    /// Global substrate color from the background estimate.
    pub substrate: Rgb,
}

/// Pre-blurs, removes the background and computes contrast magnitudes.
pub fn contrast_maps(image: &MicroscopeImage, config: &DetectionConfig) -> ContrastMaps {
    let smoothed = gaussian_blur(image.pixels(), config.smoothing_sigma);
    let estimate = estimate_background(&smoothed, config.background);
    let contrast = estimate.normalize(&smoothed, config.normalization);
    let magnitude = magnitude_map(&contrast, config.contrast_metric);
    ContrastMaps {
        contrast,
        magnitude,
        substrate: estimate.substrate,
    }
}

/// Per-tile flagging summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileSummary {
    /// Pixels at or above the contrast threshold.
    pub score: usize,
    /// `score > flag_min_pixels`.
    pub flagged: bool,
    pub peak_contrast: f32,
    pub peak_x: usize,
    pub peak_y: usize,
}

impl TileSummary {
    fn new(magnitude: &Buffer2<f32>, score: usize, flag_min_pixels: usize) -> Self {
        let mut peak_idx = 0;
        let mut peak = f32::NEG_INFINITY;
        for (idx, &m) in magnitude.pixels().iter().enumerate() {
            if m > peak {
                peak = m;
                peak_idx = idx;
            }
        }
        let (peak_x, peak_y) = magnitude.coords_of(peak_idx);
        Self {
            score,
            flagged: score > flag_min_pixels,
            peak_contrast: peak.max(0.0),
            peak_x,
            peak_y,
        }
    }
}

/// Stage counts for one tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionDiagnostics {
    pub pixels_above_threshold: usize,
    pub connected_components: usize,
    pub shape_filter: ShapeFilterStats,
    pub classified: usize,
    pub unclassified: usize,
}

/// Detection result for one tile.
#[derive(Debug, Clone)]
pub struct TileDetection {
    pub tile: TileInfo,
    pub width: usize,
    pub height: usize,
    pub pixel_scale_um: f64,
    pub substrate: Rgb,
    /// Surviving regions in discovery order.
    pub regions: Vec<ClassifiedRegion>,
    pub summary: TileSummary,
    pub diagnostics: DetectionDiagnostics,
}

/// Per-tile flake detector.
///
/// Holds the validated configuration and a shared signature table; cheap to
/// share across rayon workers by reference.
#[derive(Debug, Clone)]
pub struct FlakeDetector {
    config: DetectionConfig,
    table: Arc<SignatureTable>,
}

impl FlakeDetector {
    pub fn new(config: DetectionConfig, table: Arc<SignatureTable>) -> Result<Self, ConfigError> {
        config.validate()?;
        table.validate()?;
        if table.normalization != config.normalization {
            return Err(ConfigError::NormalizationMismatch {
                table: table.normalization.to_string(),
                detection: config.normalization.to_string(),
            });
        }
        Ok(Self { config, table })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn table(&self) -> &SignatureTable {
        &self.table
    }

    pub fn detect(&self, image: &MicroscopeImage) -> TileDetection {
        self.detect_with_maps(image).0
    }

    /// Like [`FlakeDetector::detect`], also returning the contrast maps.
    pub fn detect_with_maps(&self, image: &MicroscopeImage) -> (TileDetection, ContrastMaps) {
        let config = &self.config;
        let width = image.width();
        let height = image.height();

        let maps = contrast_maps(image, config);

        let mask = threshold_mask(&maps.magnitude, config.contrast_threshold);
        let summary = TileSummary::new(&maps.magnitude, mask.count, config.flag_min_pixels);

        let labels = LabelMap::from_mask(&mask.mask, config.connectivity);
        let regions = extract_regions(&labels, &maps.contrast, &maps.magnitude, image.pixels());

        let mut diagnostics = DetectionDiagnostics {
            pixels_above_threshold: mask.count,
            connected_components: regions.len(),
            ..Default::default()
        };

        let (regions, filter_stats) = filter_regions(regions, config, width, height);
        diagnostics.shape_filter = filter_stats;

        let regions = ThicknessClassifier::new(&self.table).classify_regions(regions);
        diagnostics.classified = regions
            .iter()
            .filter(|r| r.classification.class.is_classified())
            .count();
        diagnostics.unclassified = regions.len() - diagnostics.classified;

        tracing::debug!(
            tile = %image.tile().id,
            above_threshold = diagnostics.pixels_above_threshold,
            components = diagnostics.connected_components,
            rejected = filter_stats.rejected(),
            classified = diagnostics.classified,
            unclassified = diagnostics.unclassified,
            flagged = summary.flagged,
            "Detected flakes"
        );

        let detection = TileDetection {
            tile: image.tile().clone(),
            width,
            height,
            pixel_scale_um: image.pixel_scale_um(),
            substrate: maps.substrate,
            regions,
            summary,
            diagnostics,
        };
        (detection, maps)
    }
}
