use serde::{Deserialize, Serialize};

use super::config::DetectionConfig;
use super::region::Region;

/// Rejection counts from shape filtering. A region is counted under the
/// first criterion it fails, checked in field order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeFilterStats {
    pub too_small: usize,
    pub too_elongated: usize,
    pub at_border: usize,
}

impl ShapeFilterStats {
    pub fn rejected(&self) -> usize {
        self.too_small + self.too_elongated + self.at_border
    }
}

/// Drops regions that are too small, too elongated, or near the tile edge.
/// Surviving regions keep their order.
pub fn filter_regions(
    mut regions: Vec<Region>,
    config: &DetectionConfig,
    width: usize,
    height: usize,
) -> (Vec<Region>, ShapeFilterStats) {
    let mut stats = ShapeFilterStats::default();

    regions.retain(|region| {
        if region.area < config.min_area {
            stats.too_small += 1;
            false
        } else if region.aspect_ratio > config.max_aspect_ratio {
            stats.too_elongated += 1;
            false
        } else if region.bbox.near_border(width, height, config.border_margin) {
            stats.at_border += 1;
            false
        } else {
            true
        }
    });

    (regions, stats)
}
