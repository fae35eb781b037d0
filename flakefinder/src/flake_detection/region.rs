//! Connected flake candidates and their measurements.

use glam::DVec2;
use rayon::prelude::*;

use super::labeling::LabelMap;
use crate::common::{Buffer2, Rgb};
use crate::math::{median_f32_mut, Aabb};

/// Variance of a unit pixel's extent along one axis.
const PIXEL_VARIANCE: f64 = 1.0 / 12.0;

/// A connected region of above-threshold pixels in one tile.
///
/// Pixels are stored as linear indices into the tile (`y * width + x`),
/// in raster order.
#[derive(Debug, Clone)]
pub struct Region {
    /// Component label, 1-based, in raster discovery order.
    pub label: u32,
    pub pixels: Vec<u32>,
    pub bbox: Aabb,
    /// Number of pixels.
    pub area: usize,
    /// Boundary length in pixel edges.
    pub perimeter: usize,
    /// Pixel-center centroid.
    pub centroid: DVec2,
    /// Major/minor axis ratio from second moments. 1 for a disc or square.
    pub aspect_ratio: f32,
    /// Mean contrast vector over the region.
    pub mean_contrast: Rgb,
    /// Per-channel median contrast.
    pub median_contrast: Rgb,
    /// Mean raw color.
    pub mean_color: Rgb,
    /// Largest contrast magnitude in the region.
    pub peak_contrast: f32,
}

impl Region {
    #[inline]
    pub fn area_um2(&self, pixel_scale_um: f64) -> f64 {
        self.area as f64 * pixel_scale_um * pixel_scale_um
    }

    #[inline]
    pub fn perimeter_um(&self, pixel_scale_um: f64) -> f64 {
        self.perimeter as f64 * pixel_scale_um
    }
}

/// Measures every labeled component. Output order equals label order.
pub fn extract_regions(
    labels: &LabelMap,
    contrast: &Buffer2<Rgb>,
    magnitude: &Buffer2<f32>,
    raw: &Buffer2<Rgb>,
) -> Vec<Region> {
    labels
        .components()
        .into_par_iter()
        .enumerate()
        .map(|(i, pixels)| measure(i as u32 + 1, pixels, labels, contrast, magnitude, raw))
        .collect()
}

fn measure(
    label: u32,
    pixels: Vec<u32>,
    labels: &LabelMap,
    contrast: &Buffer2<Rgb>,
    magnitude: &Buffer2<f32>,
    raw: &Buffer2<Rgb>,
) -> Region {
    let width = labels.width();
    let height = labels.height();
    let area = pixels.len();
    let n = area as f64;

    let mut bbox = Aabb::empty();
    let mut perimeter = 0;
    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    let mut contrast_sum = [0.0f64; 3];
    let mut color_sum = [0.0f64; 3];
    let mut peak_contrast = 0.0f32;

    let same = |x: usize, y: usize| labels[y * width + x] == label;

    for &idx in &pixels {
        let idx = idx as usize;
        let (x, y) = (idx % width, idx / width);
        bbox.include(x, y);

        // Edges shared with the image border count as boundary.
        perimeter += usize::from(x == 0 || !same(x - 1, y))
            + usize::from(x + 1 == width || !same(x + 1, y))
            + usize::from(y == 0 || !same(x, y - 1))
            + usize::from(y + 1 == height || !same(x, y + 1));

        sum_x += x as f64;
        sum_y += y as f64;
        let c = contrast[idx];
        let p = raw[idx];
        for ch in 0..3 {
            contrast_sum[ch] += c[ch] as f64;
            color_sum[ch] += p[ch] as f64;
        }
        peak_contrast = peak_contrast.max(magnitude[idx]);
    }

    let centroid = DVec2::new(sum_x / n, sum_y / n);

    // Central second moments.
    let (mut sxx, mut syy, mut sxy) = (0.0f64, 0.0f64, 0.0f64);
    for &idx in &pixels {
        let dx = (idx as usize % width) as f64 - centroid.x;
        let dy = (idx as usize / width) as f64 - centroid.y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    let aspect_ratio = covariance_aspect_ratio(sxx / n, syy / n, sxy / n);

    let mut values = Vec::with_capacity(area);
    let mut median_contrast = [0.0f32; 3];
    for (ch, slot) in median_contrast.iter_mut().enumerate() {
        values.clear();
        values.extend(pixels.iter().map(|&i| contrast[i as usize][ch]));
        *slot = median_f32_mut(&mut values);
    }

    Region {
        label,
        pixels,
        bbox,
        area,
        perimeter,
        centroid,
        aspect_ratio,
        mean_contrast: contrast_sum.map(|s| (s / n) as f32),
        median_contrast,
        mean_color: color_sum.map(|s| (s / n) as f32),
        peak_contrast,
    }
}

/// Aspect ratio of a pixel set from the covariance of its pixel centers.
pub(crate) fn covariance_aspect_ratio(cxx: f64, cyy: f64, cxy: f64) -> f32 {
    axis_ratio(cxx + PIXEL_VARIANCE, cyy + PIXEL_VARIANCE, cxy)
}

/// sqrt(λ_max / λ_min) of the 2x2 covariance matrix.
fn axis_ratio(cxx: f64, cyy: f64, cxy: f64) -> f32 {
    let half_trace = 0.5 * (cxx + cyy);
    let det = cxx * cyy - cxy * cxy;
    let disc = (half_trace * half_trace - det).max(0.0).sqrt();
    let major = half_trace + disc;
    let minor = (half_trace - disc).max(f64::EPSILON);
    (major / minor).sqrt() as f32
}
