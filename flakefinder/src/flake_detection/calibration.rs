//! Threshold calibration from sample tiles.

use super::config::DetectionConfig;
use super::contrast_maps;
use crate::error::ConfigError;
use crate::image_source::MicroscopeImage;
use crate::math::median_f32_mut;

/// Picks a contrast threshold from the first `sample_count` images.
///
/// Each sample contributes its largest contrast magnitude after pre-blur and
/// background removal; the threshold is the median of those peaks plus
/// `margin`. Works best when most sample tiles show bare substrate.
pub fn calibrate_threshold(
    images: &[MicroscopeImage],
    config: &DetectionConfig,
    sample_count: usize,
    margin: f32,
) -> Result<f32, ConfigError> {
    if !(margin.is_finite() && margin >= 0.0) {
        return Err(ConfigError::InvalidParameter {
            name: "calibration_margin",
            reason: format!("must be non-negative, got {margin}"),
        });
    }
    let samples = &images[..sample_count.min(images.len())];
    if samples.is_empty() {
        return Err(ConfigError::NoCalibrationImages);
    }

    let mut peaks: Vec<f32> = samples
        .iter()
        .map(|image| {
            let maps = contrast_maps(image, config);
            maps.magnitude
                .pixels()
                .iter()
                .copied()
                .fold(0.0f32, f32::max)
        })
        .collect();

    let threshold = median_f32_mut(&mut peaks) + margin;
    if !(threshold.is_finite() && threshold > 0.0) {
        return Err(ConfigError::InvalidParameter {
            name: "contrast_threshold",
            reason: format!("calibration produced {threshold}; increase the margin"),
        });
    }

    tracing::info!(
        samples = samples.len(),
        threshold,
        "Calibrated contrast threshold"
    );
    Ok(threshold)
}
