//! Annotated PNG output for manual review.

use std::path::{Path, PathBuf};

use image::{Luma, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::classification::{SignatureTable, ThicknessClass};
use crate::error::OutputError;
use crate::flake_detection::threshold::band_mask;
use crate::flake_detection::{ContrastMaps, TileDetection};
use crate::image_source::MicroscopeImage;

const UNCLASSIFIED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const DEFAULT_CLASS_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
/// Half size of the review crop around the contrast peak.
const CROP_HALF_WIDTH: u32 = 200;
const CROP_HALF_HEIGHT: u32 = 160;

/// Paths of the images written for one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayPaths {
    pub overlay: PathBuf,
    pub highlight: PathBuf,
    /// Only written for flagged tiles.
    pub crop: Option<PathBuf>,
}

fn class_color(class: &ThicknessClass, table: &SignatureTable) -> Rgb<u8> {
    match class {
        ThicknessClass::Unclassified => UNCLASSIFIED_COLOR,
        ThicknessClass::Class(name) => table
            .class(name)
            .and_then(|c| c.color)
            .map_or(DEFAULT_CLASS_COLOR, Rgb),
    }
}

fn to_rgb8(image: &MicroscopeImage) -> RgbImage {
    let width = image.width();
    RgbImage::from_fn(width as u32, image.height() as u32, |x, y| {
        let p = image.pixels()[y as usize * width + x as usize];
        Rgb(p.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8))
    })
}

/// Window of at most `2 * half` around `center`, clamped to `[0, len)`.
fn crop_span(center: usize, half: u32, len: u32) -> (u32, u32) {
    let center = (center as u32).min(len.saturating_sub(1));
    let start = center.saturating_sub(half);
    let end = (center + half).min(len);
    (start, end - start)
}

fn save_png<P, C>(image: &image::ImageBuffer<P, C>, path: &Path) -> Result<(), OutputError>
where
    P: image::PixelWithColorType,
    [P::Subpixel]: image::EncodableLayout,
    C: std::ops::Deref<Target = [P::Subpixel]>,
{
    image.save(path).map_err(|source| OutputError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `<tile>_overlay.png` (detection boxes colored by class) and
/// `<tile>_highlight.png` (pixels with contrast in `[threshold, threshold + band]`).
/// Flagged tiles also get `<tile>_crop.png`, the raw image around the
/// contrast peak.
pub fn write_overlays(
    dir: &Path,
    image: &MicroscopeImage,
    detection: &TileDetection,
    maps: &ContrastMaps,
    table: &SignatureTable,
    threshold: f32,
    band: f32,
) -> Result<OverlayPaths, OutputError> {
    std::fs::create_dir_all(dir).map_err(|source| OutputError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let stem = detection.tile.id.replace(['/', '\\'], "_");
    let paths = OverlayPaths {
        overlay: dir.join(format!("{stem}_overlay.png")),
        highlight: dir.join(format!("{stem}_highlight.png")),
        crop: detection
            .summary
            .flagged
            .then(|| dir.join(format!("{stem}_crop.png"))),
    };

    let raw = to_rgb8(image);
    if let Some(path) = &paths.crop {
        let (x, w) = crop_span(detection.summary.peak_x, CROP_HALF_WIDTH, raw.width());
        let (y, h) = crop_span(detection.summary.peak_y, CROP_HALF_HEIGHT, raw.height());
        save_png(&image::imageops::crop_imm(&raw, x, y, w, h).to_image(), path)?;
    }

    let mut overlay = raw;
    for classified in &detection.regions {
        let bbox = classified.region.bbox;
        let rect = Rect::at(bbox.x_min as i32, bbox.y_min as i32)
            .of_size(bbox.width() as u32, bbox.height() as u32);
        let color = class_color(&classified.classification.class, table);
        draw_hollow_rect_mut(&mut overlay, rect, color);
    }
    save_png(&overlay, &paths.overlay)?;

    let band = band_mask(&maps.magnitude, threshold, band);
    let highlight = image::GrayImage::from_fn(band.width() as u32, band.height() as u32, |x, y| {
        Luma([if band[(x as usize, y as usize)] { 255 } else { 0 }])
    });
    save_png(&highlight, &paths.highlight)?;

    tracing::debug!(tile = %detection.tile.id, dir = %dir.display(), "Wrote overlays");
    Ok(paths)
}
