use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{OffsetUnit, TileEntry, TileManifest};

/// Stage raster used to cover a chip with overlapping fields of view.
///
/// Tiles are visited in serpentine order: even rows left to right, odd rows
/// right to left, so the stage never travels back across a full row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanGrid {
    pub columns: usize,
    pub rows: usize,
    /// Stage step between columns, in micrometers.
    pub step_x_um: f64,
    /// Stage step between rows, in micrometers.
    pub step_y_um: f64,
    pub origin_x_um: f64,
    pub origin_y_um: f64,
    /// File name template; `{index}` is replaced by the zero-padded visit index.
    pub file_pattern: String,
}

impl ScanGrid {
    /// Grid covering a `width_um` x `height_um` area with the given steps.
    pub fn covering(width_um: f64, height_um: f64, step_x_um: f64, step_y_um: f64) -> Self {
        let columns = (width_um / step_x_um).floor().max(0.0) as usize + 1;
        let rows = (height_um / step_y_um).floor().max(0.0) as usize + 1;
        Self {
            columns,
            rows,
            step_x_um,
            step_y_um,
            origin_x_um: 0.0,
            origin_y_um: 0.0,
            file_pattern: "tile_{index}.png".to_string(),
        }
    }

    pub fn tile_count(&self) -> usize {
        self.columns * self.rows
    }

    /// (column, row) pairs in visit order.
    pub fn visit_order(&self) -> Vec<(usize, usize)> {
        let mut order = Vec::with_capacity(self.tile_count());
        for row in 0..self.rows {
            if row % 2 == 0 {
                order.extend((0..self.columns).map(|col| (col, row)));
            } else {
                order.extend((0..self.columns).rev().map(|col| (col, row)));
            }
        }
        order
    }

    /// Manifest with micrometer offsets, one entry per visit.
    pub fn to_manifest(&self, pixel_scale_um: f64) -> TileManifest {
        let tiles = self
            .visit_order()
            .into_iter()
            .enumerate()
            .map(|(index, (col, row))| {
                let index = format!("{index:04}");
                TileEntry {
                    id: format!("tile_{index}"),
                    path: PathBuf::from(self.file_pattern.replace("{index}", &index)),
                    x: self.origin_x_um + col as f64 * self.step_x_um,
                    y: self.origin_y_um + row as f64 * self.step_y_um,
                }
            })
            .collect();

        TileManifest {
            pixel_scale_um,
            offset_unit: OffsetUnit::Micrometers,
            tiles,
        }
    }
}
