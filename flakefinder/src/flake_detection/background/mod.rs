//! Substrate background estimation and removal.
//!
//! The background is estimated per channel with a low-pass model of the
//! substrate (tiled sigma-clipped medians or a wide box mean), then removed
//! from the raw image to produce a contrast image where bare substrate trends
//! to zero.


use rayon::prelude::*;

use super::config::{BackgroundMethod, Normalization};
use crate::common::{Buffer2, Rgb};
use crate::math::{median_f32_mut, sigma_clipped_median};

/// Rows handed to a rayon task at once.
const ROWS_PER_CHUNK: usize = 8;

/// Clip level and iteration count for per-tile statistics.
const CLIP_KAPPA: f32 = 3.0;
const CLIP_ITERATIONS: usize = 3;

/// Smallest divisor used by [`Normalization::Divide`].
const MIN_DIVISOR: f32 = 1e-6;

/// Per-pixel background estimate and the global substrate color.
#[derive(Debug, Clone)]
pub struct BackgroundEstimate {
    pub background: Buffer2<Rgb>,
    /// Per-channel median of the background estimate.
    pub substrate: Rgb,
}

impl BackgroundEstimate {
    /// Removes the background from `image`, yielding the contrast image.
    pub fn normalize(&self, image: &Buffer2<Rgb>, normalization: Normalization) -> Buffer2<Rgb> {
        debug_assert_eq!(image.width(), self.background.width());
        debug_assert_eq!(image.height(), self.background.height());

        let pixels = image
            .pixels()
            .par_iter()
            .zip(self.background.pixels().par_iter())
            .map(|(raw, bg)| contrast_of(*raw, *bg, normalization))
            .collect();
        Buffer2::new(image.width(), image.height(), pixels)
    }
}

#[inline]
pub(crate) fn contrast_of(raw: Rgb, bg: Rgb, normalization: Normalization) -> Rgb {
    match normalization {
        Normalization::Subtract => [raw[0] - bg[0], raw[1] - bg[1], raw[2] - bg[2]],
        Normalization::Divide => [
            raw[0] / bg[0].max(MIN_DIVISOR) - 1.0,
            raw[1] / bg[1].max(MIN_DIVISOR) - 1.0,
            raw[2] / bg[2].max(MIN_DIVISOR) - 1.0,
        ],
    }
}

/// Estimates the substrate background of an RGB image.
pub fn estimate_background(image: &Buffer2<Rgb>, method: BackgroundMethod) -> BackgroundEstimate {
    let background = match method {
        BackgroundMethod::TileMedian { tile_size } => tile_median(image, tile_size),
        BackgroundMethod::BoxBlur { radius } => box_blur(image, radius),
    };
    let substrate = channel_medians(&background);

    tracing::debug!(
        ?method,
        substrate_r = substrate[0],
        substrate_g = substrate[1],
        substrate_b = substrate[2],
        "Estimated background"
    );

    BackgroundEstimate {
        background,
        substrate,
    }
}

fn channel_medians(buffer: &Buffer2<Rgb>) -> Rgb {
    let mut values = Vec::with_capacity(buffer.len());
    let mut out = [0.0; 3];
    for (c, slot) in out.iter_mut().enumerate() {
        values.clear();
        values.extend(buffer.pixels().iter().map(|p| p[c]));
        *slot = median_f32_mut(&mut values);
    }
    out
}

// ============================================================================
// Tile median
// ============================================================================

/// Tile medians with precomputed centers for interpolation.
struct TileGrid {
    medians: Vec<Rgb>,
    centers_x: Vec<f32>,
    centers_y: Vec<f32>,
    tiles_x: usize,
    tiles_y: usize,
}

impl TileGrid {
    fn new(image: &Buffer2<Rgb>, tile_size: usize) -> Self {
        let width = image.width();
        let height = image.height();
        let tiles_x = width.div_ceil(tile_size);
        let tiles_y = height.div_ceil(tile_size);
        let max_tile_pixels = tile_size * tile_size;

        let medians: Vec<Rgb> = (0..tiles_x * tiles_y)
            .into_par_iter()
            .map_init(
                || {
                    (
                        Vec::with_capacity(max_tile_pixels),
                        Vec::with_capacity(max_tile_pixels),
                    )
                },
                |(values, deviations), idx| {
                    let x_start = (idx % tiles_x) * tile_size;
                    let y_start = (idx / tiles_x) * tile_size;
                    let x_end = (x_start + tile_size).min(width);
                    let y_end = (y_start + tile_size).min(height);

                    let mut median = [0.0; 3];
                    for (c, slot) in median.iter_mut().enumerate() {
                        values.clear();
                        for y in y_start..y_end {
                            values.extend(image.row(y)[x_start..x_end].iter().map(|p| p[c]));
                        }
                        *slot = sigma_clipped_median(
                            values,
                            deviations,
                            CLIP_KAPPA,
                            CLIP_ITERATIONS,
                        )
                        .0;
                    }
                    median
                },
            )
            .collect();

        let centers = |count: usize, extent: usize| -> Vec<f32> {
            (0..count)
                .map(|t| {
                    let start = t * tile_size;
                    let end = (start + tile_size).min(extent);
                    // Center of pixel centers in [start, end).
                    (start + end - 1) as f32 * 0.5
                })
                .collect()
        };

        Self {
            medians,
            centers_x: centers(tiles_x, width),
            centers_y: centers(tiles_y, height),
            tiles_x,
            tiles_y,
        }
    }

    #[inline]
    fn get(&self, tx: usize, ty: usize) -> Rgb {
        self.medians[ty * self.tiles_x + tx]
    }
}

/// Lower neighbor index and interpolation weight along one axis.
///
/// Positions before the first or after the last center clamp to that center.
#[inline]
fn axis_weight(pos: f32, centers: &[f32]) -> (usize, usize, f32) {
    let last = centers.len() - 1;
    let lower = centers.iter().rposition(|&c| c <= pos).unwrap_or(0);
    let upper = (lower + 1).min(last);
    if upper == lower {
        return (lower, upper, 0.0);
    }
    let t = ((pos - centers[lower]) / (centers[upper] - centers[lower])).clamp(0.0, 1.0);
    (lower, upper, t)
}

#[inline]
fn lerp(a: Rgb, b: Rgb, t: f32) -> Rgb {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

fn tile_median(image: &Buffer2<Rgb>, tile_size: usize) -> Buffer2<Rgb> {
    let width = image.width();
    let grid = TileGrid::new(image, tile_size);

    // Column weights are shared by every row.
    let columns: Vec<(usize, usize, f32)> = (0..width)
        .map(|x| axis_weight(x as f32, &grid.centers_x))
        .collect();

    let mut background = vec![[0.0f32; 3]; image.len()];
    background
        .par_chunks_mut(width * ROWS_PER_CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            for (local_y, row) in chunk.chunks_mut(width).enumerate() {
                let y = chunk_idx * ROWS_PER_CHUNK + local_y;
                let (ty0, ty1, wy) = axis_weight(y as f32, &grid.centers_y);
                debug_assert!(ty1 < grid.tiles_y);

                for (px, &(tx0, tx1, wx)) in row.iter_mut().zip(&columns) {
                    let top = lerp(grid.get(tx0, ty0), grid.get(tx1, ty0), wx);
                    let bottom = lerp(grid.get(tx0, ty1), grid.get(tx1, ty1), wx);
                    *px = lerp(top, bottom, wy);
                }
            }
        });

    Buffer2::new(width, image.height(), background)
}

// ============================================================================
// Box blur
// ============================================================================

/// Mirrors an out-of-range index back into `[0, len)` (edge pixel repeated).
#[inline]
fn reflect(i: isize, len: usize) -> usize {
    let len = len as isize;
    let period = 2 * len;
    let m = i.rem_euclid(period);
    (if m < len { m } else { period - 1 - m }) as usize
}

/// Sliding window mean of width `2 * radius + 1` over one line.
fn box_line(src: &[Rgb], dst: &mut [Rgb], radius: usize) {
    let len = src.len();
    let r = radius as isize;
    let norm = 1.0 / (2 * radius + 1) as f64;

    // f64 accumulator keeps the running sum exact enough over long rows.
    let mut sum = [0.0f64; 3];
    for k in -r..=r {
        let p = src[reflect(k, len)];
        for c in 0..3 {
            sum[c] += p[c] as f64;
        }
    }

    for x in 0..len {
        dst[x] = [
            (sum[0] * norm) as f32,
            (sum[1] * norm) as f32,
            (sum[2] * norm) as f32,
        ];
        let add = src[reflect(x as isize + r + 1, len)];
        let sub = src[reflect(x as isize - r, len)];
        for c in 0..3 {
            sum[c] += add[c] as f64 - sub[c] as f64;
        }
    }
}

fn box_blur(image: &Buffer2<Rgb>, radius: usize) -> Buffer2<Rgb> {
    let width = image.width();
    let height = image.height();

    // Horizontal pass.
    let mut horizontal = vec![[0.0f32; 3]; image.len()];
    horizontal
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, dst)| box_line(image.row(y), dst, radius));

    // Vertical pass on the transposed layout keeps both passes row-contiguous.
    let mut transposed = vec![[0.0f32; 3]; image.len()];
    for y in 0..height {
        for x in 0..width {
            transposed[x * height + y] = horizontal[y * width + x];
        }
    }
    let mut vertical = vec![[0.0f32; 3]; image.len()];
    vertical
        .par_chunks_mut(height)
        .zip(transposed.par_chunks(height))
        .for_each(|(dst, src)| box_line(src, dst, radius));

    Buffer2::from_fn(width, height, |x, y| vertical[x * height + y])
}
