use std::path::{Path, PathBuf};

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::{TileInfo, TileSource, DEFAULT_PIXEL_SCALE_UM};
use crate::error::InputError;

/// Unit of the tile offsets in a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetUnit {
    #[default]
    Pixels,
    Micrometers,
}

/// One tile of a scan: its file and the position of its top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileEntry {
    pub id: String,
    pub path: PathBuf,
    pub x: f64,
    pub y: f64,
}

/// Tile set description for multi-tile runs (YAML or JSON).
///
/// ```yaml
/// pixel_scale_um: 0.422
/// offset_unit: micrometers
/// tiles:
///   - { id: tile_0000, path: tile_0000.png, x: 0.0, y: 0.0 }
///   - { id: tile_0001, path: tile_0001.png, x: 540.0, y: 0.0 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileManifest {
    #[serde(default = "default_pixel_scale")]
    pub pixel_scale_um: f64,
    #[serde(default)]
    pub offset_unit: OffsetUnit,
    pub tiles: Vec<TileEntry>,
}

fn default_pixel_scale() -> f64 {
    DEFAULT_PIXEL_SCALE_UM
}

impl TileManifest {
    /// Loads a manifest; relative tile paths are resolved against its directory.
    pub fn load(path: &Path) -> Result<Self, InputError> {
        let mut manifest: TileManifest =
            common::load_file(path).map_err(|source| InputError::Manifest {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for tile in &mut manifest.tiles {
            if tile.path.is_relative() {
                tile.path = base.join(&tile.path);
            }
        }

        manifest.validate(path)?;
        Ok(manifest)
    }

    fn validate(&self, path: &Path) -> Result<(), InputError> {
        let invalid = |reason: String| InputError::InvalidManifest {
            path: path.to_path_buf(),
            reason,
        };

        if !(self.pixel_scale_um.is_finite() && self.pixel_scale_um > 0.0) {
            return Err(invalid(format!(
                "pixel_scale_um must be positive, got {}",
                self.pixel_scale_um
            )));
        }
        let mut ids = hashbrown::HashSet::new();
        for tile in &self.tiles {
            if !ids.insert(tile.id.as_str()) {
                return Err(invalid(format!("duplicate tile id '{}'", tile.id)));
            }
            if !(tile.x.is_finite() && tile.y.is_finite()) {
                return Err(invalid(format!("tile '{}' has a non-finite offset", tile.id)));
            }
        }
        Ok(())
    }

    /// Tile offset converted to pixels.
    pub fn offset_px(&self, entry: &TileEntry) -> DVec2 {
        let offset = DVec2::new(entry.x, entry.y);
        match self.offset_unit {
            OffsetUnit::Pixels => offset,
            OffsetUnit::Micrometers => offset / self.pixel_scale_um,
        }
    }

    /// Tile sources in manifest order, placed in the global frame.
    pub fn sources(&self) -> Vec<TileSource> {
        self.tiles
            .iter()
            .map(|entry| TileSource {
                info: TileInfo {
                    id: entry.id.clone(),
                    path: Some(entry.path.clone()),
                    offset_px: Some(self.offset_px(entry)),
                },
                path: entry.path.clone(),
            })
            .collect()
    }
}
