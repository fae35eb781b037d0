//! Run reports: detections plus one record per tile.
//!
//! CSV output writes two files, the detection table at the requested path
//! and the tile table next to it as `<stem>_tiles.csv`. JSON and YAML write
//! the whole [`Report`] to one file. Floats are printed with fixed precision
//! in CSV so identical runs produce identical bytes.

mod overlay;


use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use common::{FileExtensionError, FileFormat};
use serde::{Deserialize, Serialize};

use crate::aggregate::Detection;
use crate::batch::BatchResult;
use crate::error::OutputError;
use crate::image_source::TileInfo;

pub use overlay::{write_overlays, OverlayPaths};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportFormat {
    Csv,
    Json,
    Yaml,
}

impl ReportFormat {
    pub fn from_path(path: &Path) -> Result<Self, FileExtensionError> {
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if is_csv {
            return Ok(Self::Csv);
        }
        Ok(match FileFormat::from_path(path)? {
            FileFormat::Yaml => Self::Yaml,
            FileFormat::Json => Self::Json,
        })
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TileStatus {
    Processed,
    Failed,
    Cancelled,
}

/// Per-tile summary, failure or skip record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    pub tile_id: String,
    pub path: Option<PathBuf>,
    pub offset_px: Option<[f64; 2]>,
    pub status: TileStatus,
    pub width: usize,
    pub height: usize,
    /// Regions kept after shape filtering.
    pub regions: usize,
    pub score: usize,
    pub flagged: bool,
    pub peak_contrast: f32,
    pub peak_x: usize,
    pub peak_y: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TileRecord {
    fn skipped(tile: &TileInfo, status: TileStatus, error: Option<String>) -> Self {
        Self {
            tile_id: tile.id.clone(),
            path: tile.path.clone(),
            offset_px: tile.offset_px.map(|o| o.to_array()),
            status,
            width: 0,
            height: 0,
            regions: 0,
            score: 0,
            flagged: false,
            peak_contrast: 0.0,
            peak_x: 0,
            peak_y: 0,
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub contrast_threshold: f32,
    pub detections: Vec<Detection>,
    /// Processed tiles in input order, then failures, then cancelled tiles.
    pub tiles: Vec<TileRecord>,
}

impl Report {
    pub fn new(contrast_threshold: f32, batch: &BatchResult, detections: Vec<Detection>) -> Self {
        let mut tiles: Vec<TileRecord> = batch
            .tiles
            .iter()
            .map(|t| TileRecord {
                tile_id: t.tile.id.clone(),
                path: t.tile.path.clone(),
                offset_px: t.tile.offset_px.map(|o| o.to_array()),
                status: TileStatus::Processed,
                width: t.width,
                height: t.height,
                regions: t.regions.len(),
                score: t.summary.score,
                flagged: t.summary.flagged,
                peak_contrast: t.summary.peak_contrast,
                peak_x: t.summary.peak_x,
                peak_y: t.summary.peak_y,
                error: None,
            })
            .collect();
        tiles.extend(batch.failures.iter().map(|f| {
            TileRecord::skipped(&f.tile, TileStatus::Failed, Some(f.reason.clone()))
        }));
        tiles.extend(
            batch
                .cancelled
                .iter()
                .map(|t| TileRecord::skipped(t, TileStatus::Cancelled, None)),
        );

        Self {
            contrast_threshold,
            detections,
            tiles,
        }
    }

    /// Writes the report and returns the paths of all files written.
    pub fn write(&self, path: &Path, format: ReportFormat) -> Result<Vec<PathBuf>, OutputError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| OutputError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let written = match format {
            ReportFormat::Csv => {
                let tiles_path = tiles_csv_path(path);
                write_text(path, &self.detections_csv())?;
                write_text(&tiles_path, &self.tiles_csv())?;
                vec![path.to_path_buf(), tiles_path]
            }
            ReportFormat::Json | ReportFormat::Yaml => {
                let file_format = if format == ReportFormat::Json {
                    FileFormat::Json
                } else {
                    FileFormat::Yaml
                };
                let text = common::serialize(self, file_format).map_err(|source| {
                    OutputError::Serialize {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                write_text(path, &text)?;
                vec![path.to_path_buf()]
            }
        };

        tracing::info!(
            path = %path.display(),
            %format,
            detections = self.detections.len(),
            "Wrote report"
        );
        Ok(written)
    }

    pub fn detections_csv(&self) -> String {
        let mut out = String::from(
            "id,class,confidence,centroid_x_px,centroid_y_px,centroid_x_um,centroid_y_um,\
             bbox_x_min,bbox_y_min,bbox_x_max,bbox_y_max,area_px,area_um2,perimeter_um,\
             aspect_ratio,contrast_r,contrast_g,contrast_b,merged_regions,source_tiles\n",
        );
        for d in &self.detections {
            // Writing to a String cannot fail.
            let _ = writeln!(
                out,
                "{},{},{:.4},{:.2},{:.2},{:.3},{:.3},{},{},{},{},{},{:.3},{:.3},{:.3},{:.5},{:.5},{:.5},{},{}",
                d.id,
                csv_field(d.class.name()),
                d.confidence,
                d.centroid_px.x,
                d.centroid_px.y,
                d.centroid_um.x,
                d.centroid_um.y,
                d.bbox.x_min,
                d.bbox.y_min,
                d.bbox.x_max,
                d.bbox.y_max,
                d.area_px,
                d.area_um2,
                d.perimeter_um,
                d.aspect_ratio,
                d.signature[0],
                d.signature[1],
                d.signature[2],
                d.merged_regions,
                csv_field(&d.source_tiles.join(";")),
            );
        }
        out
    }

    pub fn tiles_csv(&self) -> String {
        let mut out = String::from(
            "tile_id,path,offset_x_px,offset_y_px,status,width,height,regions,score,flagged,\
             peak_contrast,peak_x,peak_y,error\n",
        );
        for t in &self.tiles {
            let path = t
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            let (ox, oy) = t
                .offset_px
                .map(|[x, y]| (format!("{x:.2}"), format!("{y:.2}")))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "{},{},{},{},{},{},{},{},{},{},{:.5},{},{},{}",
                csv_field(&t.tile_id),
                csv_field(&path),
                ox,
                oy,
                t.status,
                t.width,
                t.height,
                t.regions,
                t.score,
                t.flagged,
                t.peak_contrast,
                t.peak_x,
                t.peak_y,
                csv_field(t.error.as_deref().unwrap_or("")),
            );
        }
        out
    }
}

/// `scan.csv` -> `scan_tiles.csv`.
fn tiles_csv_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("report");
    path.with_file_name(format!("{stem}_tiles.csv"))
}

fn write_text(path: &Path, text: &str) -> Result<(), OutputError> {
    std::fs::write(path, text).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Quotes a CSV field when it contains a separator, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
