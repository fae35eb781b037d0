//! Contrast magnitude and binarization.

use rayon::prelude::*;

use super::config::ContrastMetric;
use crate::common::{luminance, Buffer2, Rgb};

/// Scalar magnitude of one contrast vector.
#[inline]
pub fn contrast_magnitude(delta: Rgb, metric: ContrastMetric) -> f32 {
    match metric {
        ContrastMetric::Euclidean => {
            (delta[0] * delta[0] + delta[1] * delta[1] + delta[2] * delta[2]).sqrt()
        }
        ContrastMetric::Luminance => luminance(delta).abs(),
        ContrastMetric::MaxChannel => delta[0].abs().max(delta[1].abs()).max(delta[2].abs()),
    }
}

/// Per-pixel contrast magnitude map.
pub fn magnitude_map(contrast: &Buffer2<Rgb>, metric: ContrastMetric) -> Buffer2<f32> {
    let pixels = contrast
        .pixels()
        .par_iter()
        .map(|&d| contrast_magnitude(d, metric))
        .collect();
    Buffer2::new(contrast.width(), contrast.height(), pixels)
}

/// Foreground mask: `true` where the magnitude is at or above the threshold.
#[derive(Debug, Clone)]
pub struct ThresholdMask {
    pub mask: Buffer2<bool>,
    /// Number of foreground pixels.
    pub count: usize,
}

pub fn threshold_mask(magnitude: &Buffer2<f32>, threshold: f32) -> ThresholdMask {
    let pixels: Vec<bool> = magnitude
        .pixels()
        .par_iter()
        .map(|&m| m >= threshold)
        .collect();
    let count = pixels.iter().filter(|&&b| b).count();
    ThresholdMask {
        mask: Buffer2::new(magnitude.width(), magnitude.height(), pixels),
        count,
    }
}

/// Pixels whose magnitude lies in `[low, low + band]`.
pub fn band_mask(magnitude: &Buffer2<f32>, low: f32, band: f32) -> Buffer2<bool> {
    let high = low + band;
    magnitude.map(|&m| m >= low && m <= high)
}
