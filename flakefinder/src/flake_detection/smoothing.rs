//! Gaussian pre-blur of the raw image.
//!
//! Suppresses hot pixels and sensor noise before background estimation so
//! single bright pixels never reach the threshold on their own.

use rayon::prelude::*;

use crate::common::{Buffer2, Rgb};

/// Normalized 1D Gaussian kernel of radius `ceil(3 * sigma)`.
pub fn gaussian_kernel_1d(sigma: f32) -> Vec<f32> {
    assert!(sigma > 0.0, "Sigma must be positive");

    let radius = (3.0 * sigma).ceil() as usize;
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut kernel: Vec<f32> = (0..2 * radius + 1)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Separable Gaussian blur with clamped borders. `sigma <= 0` returns a copy.
pub fn gaussian_blur(image: &Buffer2<Rgb>, sigma: f32) -> Buffer2<Rgb> {
    if sigma <= 0.0 {
        return image.clone();
    }

    let kernel = gaussian_kernel_1d(sigma);
    let width = image.width();
    let height = image.height();

    let mut horizontal = vec![[0.0f32; 3]; image.len()];
    horizontal
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, out)| convolve_line(image.row(y), out, &kernel));

    let mut output = vec![[0.0f32; 3]; image.len()];
    output
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, out)| {
            let radius = kernel.len() / 2;
            for (x, px) in out.iter_mut().enumerate() {
                let mut acc = [0.0f32; 3];
                for (k, &w) in kernel.iter().enumerate() {
                    let sy = (y + k).saturating_sub(radius).min(height - 1);
                    let p = horizontal[sy * width + x];
                    acc[0] += p[0] * w;
                    acc[1] += p[1] * w;
                    acc[2] += p[2] * w;
                }
                *px = acc;
            }
        });

    Buffer2::new(width, height, output)
}

fn convolve_line(src: &[Rgb], dst: &mut [Rgb], kernel: &[f32]) {
    let radius = kernel.len() / 2;
    let last = src.len() - 1;
    for (x, out) in dst.iter_mut().enumerate() {
        let mut acc = [0.0f32; 3];
        for (k, &w) in kernel.iter().enumerate() {
            let p = src[(x + k).saturating_sub(radius).min(last)];
            acc[0] += p[0] * w;
            acc[1] += p[1] * w;
            acc[2] += p[2] * w;
        }
        *out = acc;
    }
}
