//! Configuration types for flake detection.
//!
//! [`DetectionConfig`] is a flat struct grouped by pipeline stage. Every field
//! has a default so partial YAML/JSON files are accepted.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ============================================================================
// Enums
// ============================================================================

/// Pixel connectivity for connected component labeling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Connectivity {
    /// Only horizontal and vertical neighbors.
    Four,
    /// Diagonal neighbors too. Keeps thin, ragged flake edges in one piece.
    #[default]
    Eight,
}

/// How the per-pixel background estimate is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method")]
pub enum BackgroundMethod {
    /// Sigma-clipped median per tile, bilinearly interpolated between tile
    /// centers. Robust when flakes cover a sizeable part of a tile.
    TileMedian { tile_size: usize },
    /// Separable box mean with mirrored borders.
    BoxBlur { radius: usize },
}

impl Default for BackgroundMethod {
    fn default() -> Self {
        Self::TileMedian { tile_size: 64 }
    }
}

/// How the background estimate is removed from the raw image.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Normalization {
    /// `raw - background`: absolute color delta.
    #[default]
    Subtract,
    /// `raw / background - 1`: optical contrast, insensitive to lamp intensity.
    Divide,
}

/// Scalar magnitude of a per-pixel RGB contrast vector.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContrastMetric {
    /// Euclidean norm of the RGB delta.
    #[default]
    Euclidean,
    /// Absolute Rec. 709 luminance delta (monochrome cameras).
    Luminance,
    /// Largest absolute channel delta.
    MaxChannel,
}

// ============================================================================
// Detection configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    // -- Pre-processing --
    /// Gaussian pre-blur sigma in pixels. 0 disables the blur.
    pub smoothing_sigma: f32,

    // -- Background --
    pub background: BackgroundMethod,
    pub normalization: Normalization,

    // -- Segmentation --
    pub contrast_metric: ContrastMetric,
    /// Pixels with contrast magnitude >= this value are foreground.
    pub contrast_threshold: f32,
    pub connectivity: Connectivity,

    // -- Shape filter --
    /// Minimum region area in pixels.
    pub min_area: usize,
    /// Maximum major/minor axis ratio.
    pub max_aspect_ratio: f32,
    /// Regions whose bounding box comes within this many pixels of an image
    /// edge are rejected. At least 1, so regions cut by the edge never pass.
    pub border_margin: usize,

    // -- Tile flagging --
    /// A tile is flagged when more than this many pixels exceed the threshold.
    pub flag_min_pixels: usize,
    /// Width of the contrast band above the threshold drawn in highlight masks.
    pub highlight_band: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            smoothing_sigma: 0.8,

            background: BackgroundMethod::default(),
            normalization: Normalization::Subtract,

            contrast_metric: ContrastMetric::Euclidean,
            contrast_threshold: 0.055,
            connectivity: Connectivity::Eight,

            min_area: 25,
            max_aspect_ratio: 8.0,
            border_margin: 2,

            flag_min_pixels: 100,
            highlight_band: 0.09,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name: &'static str, reason: String| ConfigError::InvalidParameter {
            name,
            reason,
        };

        if !(self.smoothing_sigma.is_finite() && (0.0..=20.0).contains(&self.smoothing_sigma)) {
            return Err(invalid(
                "smoothing_sigma",
                format!("must be in [0, 20], got {}", self.smoothing_sigma),
            ));
        }

        match self.background {
            BackgroundMethod::TileMedian { tile_size } if !(8..=1024).contains(&tile_size) => {
                return Err(invalid(
                    "background.tile_size",
                    format!("must be in [8, 1024], got {tile_size}"),
                ));
            }
            BackgroundMethod::BoxBlur { radius } if !(1..=512).contains(&radius) => {
                return Err(invalid(
                    "background.radius",
                    format!("must be in [1, 512], got {radius}"),
                ));
            }
            _ => {}
        }

        if !(self.contrast_threshold.is_finite() && self.contrast_threshold > 0.0) {
            return Err(invalid(
                "contrast_threshold",
                format!("must be positive, got {}", self.contrast_threshold),
            ));
        }
        if self.min_area == 0 {
            return Err(invalid("min_area", "must be at least 1".to_string()));
        }
        if self.border_margin == 0 {
            return Err(invalid(
                "border_margin",
                "must be at least 1 so edge-truncated regions are rejected".to_string(),
            ));
        }
        if !(self.max_aspect_ratio.is_finite() && self.max_aspect_ratio >= 1.0) {
            return Err(invalid(
                "max_aspect_ratio",
                format!("must be >= 1, got {}", self.max_aspect_ratio),
            ));
        }
        if !(self.highlight_band.is_finite() && self.highlight_band >= 0.0) {
            return Err(invalid(
                "highlight_band",
                format!("must be non-negative, got {}", self.highlight_band),
            ));
        }
        Ok(())
    }
}
