//! Synthetic tiles for unit tests.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::classification::{SignatureTable, ThicknessSignature};
use crate::common::Rgb;
use crate::flake_detection::DetectionConfig;
use crate::image_source::{MicroscopeImage, TileInfo};

pub use common::log_setup::init_test_tracing as init_tracing;

pub const SUBSTRATE: Rgb = [0.55, 0.45, 0.60];
/// Contrast of a synthetic monolayer relative to [`SUBSTRATE`].
pub const MONOLAYER: Rgb = [-0.04, -0.07, -0.03];
/// Contrast of a synthetic bilayer relative to [`SUBSTRATE`].
pub const BILAYER: Rgb = [-0.10, -0.14, -0.07];

/// Rectangular flake with a constant contrast.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticFlake {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub contrast: Rgb,
}

impl SyntheticFlake {
    pub fn square(x: usize, y: usize, side: usize, contrast: Rgb) -> Self {
        Self {
            x,
            y,
            width: side,
            height: side,
            contrast,
        }
    }

    fn contains(&self, x: usize, y: usize) -> bool {
        (self.x..self.x + self.width).contains(&x) && (self.y..self.y + self.height).contains(&y)
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticTile {
    pub width: usize,
    pub height: usize,
    pub substrate: Rgb,
    /// Added to every channel, left edge to right edge.
    pub gradient: f32,
    /// Standard deviation of uniform-equivalent noise per channel.
    pub noise: f32,
    pub seed: u64,
    pub flakes: Vec<SyntheticFlake>,
}

impl SyntheticTile {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            substrate: SUBSTRATE,
            gradient: 0.0,
            noise: 0.0,
            seed: 7,
            flakes: Vec::new(),
        }
    }

    pub fn with_flake(mut self, flake: SyntheticFlake) -> Self {
        self.flakes.push(flake);
        self
    }

    pub fn with_noise(mut self, noise: f32, seed: u64) -> Self {
        self.noise = noise;
        self.seed = seed;
        self
    }

    pub fn with_gradient(mut self, gradient: f32) -> Self {
        self.gradient = gradient;
        self
    }

    pub fn pixels(&self) -> Vec<Rgb> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        // Uniform noise in [-a, a] has sigma a / sqrt(3).
        let amplitude = self.noise * 3f32.sqrt();

        let mut pixels = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let ramp = self.gradient * x as f32 / self.width.max(1) as f32;
                let mut p = self.substrate.map(|v| v + ramp);
                if let Some(flake) = self.flakes.iter().find(|f| f.contains(x, y)) {
                    for c in 0..3 {
                        p[c] += flake.contrast[c];
                    }
                }
                if amplitude > 0.0 {
                    for v in &mut p {
                        *v += rng.random_range(-amplitude..=amplitude);
                    }
                }
                pixels.push(p.map(|v| v.clamp(0.0, 1.0)));
            }
        }
        pixels
    }

    pub fn image(&self, tile: TileInfo) -> MicroscopeImage {
        MicroscopeImage::from_pixels(self.width, self.height, self.pixels(), 0.5, tile)
            .expect("synthetic tile dimensions match")
    }

    pub fn write_png(&self, path: &std::path::Path) {
        let pixels = self.pixels();
        let img = image::RgbImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let p = pixels[y as usize * self.width + x as usize];
            image::Rgb(p.map(|v| (v * 255.0).round() as u8))
        });
        img.save(path).expect("write synthetic png");
    }
}

/// Two-class table matching [`MONOLAYER`] and [`BILAYER`].
pub fn signature_table() -> SignatureTable {
    let around = |name: &str, layers: u32, c: Rgb, color: [u8; 3]| ThicknessSignature {
        name: name.to_string(),
        layers: Some(layers),
        min: c.map(|v| v - 0.02),
        max: c.map(|v| v + 0.02),
        color: Some(color),
    };
    SignatureTable {
        material: "WSe2".into(),
        substrate: "90nm SiO2".into(),
        normalization: Default::default(),
        tolerance: 0.02,
        classes: vec![
            around("monolayer", 1, MONOLAYER, [0, 255, 0]),
            around("bilayer", 2, BILAYER, [255, 160, 0]),
        ],
    }
}

/// Detection settings for clean synthetic tiles.
pub fn detection_config() -> DetectionConfig {
    DetectionConfig {
        smoothing_sigma: 0.0,
        contrast_threshold: 0.05,
        min_area: 20,
        ..Default::default()
    }
}
