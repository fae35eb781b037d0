use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::aggregate::AggregationConfig;
use crate::error::ConfigError;
use crate::flake_detection::DetectionConfig;
use crate::image_source::DEFAULT_PIXEL_SCALE_UM;

/// Automatic threshold selection from the first tiles of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub enabled: bool,
    /// Number of leading tiles sampled.
    pub sample_count: usize,
    /// Added to the median peak contrast of the samples.
    pub margin: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_count: 10,
            margin: 0.02,
        }
    }
}

/// Everything a run needs besides the images themselves.
///
/// ```yaml
/// pixel_scale_um: 0.422
/// signature_table: signatures/wse2_90nm.yaml
/// detection:
///   contrast_threshold: 0.055
///   min_area: 40
/// aggregation:
///   iou_merge_threshold: 0.3
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Micrometers per pixel for plain image inputs. Manifests carry their own.
    pub pixel_scale_um: f64,
    /// Signature table file. Relative paths are resolved against the
    /// directory of the config file.
    pub signature_table: Option<PathBuf>,
    pub detection: DetectionConfig,
    pub aggregation: AggregationConfig,
    pub calibration: CalibrationConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            pixel_scale_um: DEFAULT_PIXEL_SCALE_UM,
            signature_table: None,
            detection: DetectionConfig::default(),
            aggregation: AggregationConfig::default(),
            calibration: CalibrationConfig::default(),
        }
    }
}

impl RunConfig {
    /// Loads a YAML or JSON config, picked by extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config: RunConfig =
            common::load_file(path).map_err(|source| ConfigError::ConfigFile {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(table) = config.signature_table.as_mut() {
            if table.is_relative() {
                let base = path.parent().unwrap_or_else(|| Path::new(""));
                *table = base.join(&*table);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.pixel_scale_um.is_finite() && self.pixel_scale_um > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "pixel_scale_um",
                reason: format!("must be positive, got {}", self.pixel_scale_um),
            });
        }
        if self.calibration.enabled && self.calibration.sample_count == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "calibration.sample_count",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.calibration.margin.is_finite() && self.calibration.margin >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "calibration.margin",
                reason: format!("must be non-negative, got {}", self.calibration.margin),
            });
        }
        self.detection.validate()?;
        self.aggregation.validate()
    }
}
