//! Loading microscope tiles into normalized RGB buffers.
//!
//! Every image is converted to `f32` RGB in `[0, 1]` regardless of the source
//! bit depth, so thresholds and signature tables stay comparable between
//! 8-bit JPEG captures and 16-bit TIFF exports.

mod manifest;
mod scan_grid;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::common::{Buffer2, Rgb};
use crate::error::InputError;

pub use manifest::{OffsetUnit, TileEntry, TileManifest};
pub use scan_grid::ScanGrid;

/// Default camera calibration in micrometers per pixel (10x objective).
pub const DEFAULT_PIXEL_SCALE_UM: f64 = 0.422;

/// Where a tile sits in the scanned area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileInfo {
    /// Stable identifier used in reports.
    pub id: String,
    /// Source file, if the tile came from disk.
    pub path: Option<PathBuf>,
    /// Offset of the tile's top-left pixel in the global pixel frame.
    /// `None` for independent images that are not part of a stitched scan;
    /// detections in such tiles are never merged with other tiles.
    pub offset_px: Option<DVec2>,
}

impl TileInfo {
    /// An independent image with no placement in a scan.
    pub fn standalone(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: None,
            offset_px: None,
        }
    }

    /// A tile placed at `offset_px` in the global frame.
    pub fn placed(id: impl Into<String>, offset_px: DVec2) -> Self {
        Self {
            id: id.into(),
            path: None,
            offset_px: Some(offset_px),
        }
    }

    /// Integer pixel offset used to map tile coordinates into the global frame.
    pub fn global_offset(&self) -> (i64, i64) {
        self.offset_px
            .map(|o| (o.x.round() as i64, o.y.round() as i64))
            .unwrap_or((0, 0))
    }
}

/// A tile to be read from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSource {
    pub info: TileInfo,
    pub path: PathBuf,
}

impl TileSource {
    /// Builds standalone sources for plain image paths, ids taken from file stems.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Vec<TileSource> {
        paths
            .iter()
            .map(|p| {
                let path = p.as_ref().to_path_buf();
                let id = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("image")
                    .to_string();
                TileSource {
                    info: TileInfo {
                        id,
                        path: Some(path.clone()),
                        offset_px: None,
                    },
                    path,
                }
            })
            .collect()
    }
}

/// An RGB microscope image with its calibration. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct MicroscopeImage {
    pixels: Buffer2<Rgb>,
    pixel_scale_um: f64,
    tile: TileInfo,
}

impl MicroscopeImage {
    /// Wraps an already decoded pixel buffer.
    pub fn from_pixels(
        width: usize,
        height: usize,
        pixels: Vec<Rgb>,
        pixel_scale_um: f64,
        tile: TileInfo,
    ) -> Result<Self, InputError> {
        if pixels.len() != width * height {
            return Err(InputError::BufferSize {
                expected: width * height,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            pixels: Buffer2::new(width, height, pixels),
            pixel_scale_um,
            tile,
        })
    }

    /// Reads and decodes a raster file (PNG, JPEG, TIFF, BMP).
    pub fn from_file(path: &Path, pixel_scale_um: f64, tile: TileInfo) -> Result<Self, InputError> {
        let reader = image::ImageReader::open(path)
            .and_then(|r| r.with_guessed_format())
            .map_err(|source| InputError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let decoded = reader.decode().map_err(|source| InputError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

        let width = decoded.width() as usize;
        let height = decoded.height() as usize;
        if width == 0 || height == 0 {
            return Err(InputError::Empty {
                path: path.to_path_buf(),
            });
        }

        let rgb = decoded.to_rgb32f();
        let pixels: Vec<Rgb> = rgb.pixels().map(|p| p.0).collect();

        tracing::debug!(
            path = %path.display(),
            width,
            height,
            tile = %tile.id,
            "Loaded tile"
        );

        Self::from_pixels(width, height, pixels, pixel_scale_um, tile)
    }

    /// Loads a tile described by a [`TileSource`].
    pub fn load(source: &TileSource, pixel_scale_um: f64) -> Result<Self, InputError> {
        Self::from_file(&source.path, pixel_scale_um, source.info.clone())
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.pixels.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.pixels.height()
    }

    #[inline]
    pub fn pixels(&self) -> &Buffer2<Rgb> {
        &self.pixels
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> Rgb {
        self.pixels[(x, y)]
    }

    /// Micrometers per pixel.
    #[inline]
    pub fn pixel_scale_um(&self) -> f64 {
        self.pixel_scale_um
    }

    #[inline]
    pub fn tile(&self) -> &TileInfo {
        &self.tile
    }
}
