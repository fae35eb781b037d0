//! Shared pixel containers.

mod buffer2;

pub use buffer2::Buffer2;

/// One RGB sample, channels normalized to `[0, 1]` for raw images and
/// signed deltas for contrast images.
pub type Rgb = [f32; 3];

/// Rec. 709 luma weights.
pub const LUMA_WEIGHTS: Rgb = [0.2126, 0.7152, 0.0722];

#[inline]
pub fn luminance(rgb: Rgb) -> f32 {
    rgb[0] * LUMA_WEIGHTS[0] + rgb[1] * LUMA_WEIGHTS[1] + rgb[2] * LUMA_WEIGHTS[2]
}
