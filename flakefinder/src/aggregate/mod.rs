//! Merging per-tile regions into global detections.
//!
//! Overlapping tiles see the same flake more than once. Candidates are
//! visited best first and greedily grouped by bounding box IoU in the global
//! pixel frame; a group never holds two regions from the same tile. Tiles
//! without a placement are never merged with anything.

#[cfg(test)]
mod tests;

use std::cmp::Ordering;

use glam::DVec2;
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::classification::{ClassifiedRegion, ThicknessClass};
use crate::common::Rgb;
use crate::error::ConfigError;
use crate::flake_detection::{covariance_aspect_ratio, TileDetection};
use crate::math::GlobalBox;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Minimum bounding box IoU for two regions to be the same flake.
    pub iou_merge_threshold: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            iou_merge_threshold: 0.3,
        }
    }
}

impl AggregationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.iou_merge_threshold;
        if !(t.is_finite() && t > 0.0 && t <= 1.0) {
            return Err(ConfigError::InvalidParameter {
                name: "iou_merge_threshold",
                reason: format!("must be in (0, 1], got {t}"),
            });
        }
        Ok(())
    }
}

/// A flake in the global frame, merged from one or more tile regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// 1-based, in report order.
    pub id: usize,
    pub class: ThicknessClass,
    pub confidence: f32,
    /// Centroid of the merged pixel set, global pixels.
    pub centroid_px: DVec2,
    pub centroid_um: DVec2,
    pub bbox: GlobalBox,
    /// Pixels in the union of all merged regions.
    pub area_px: usize,
    pub area_um2: f64,
    /// Boundary length of the merged pixel set.
    pub perimeter_um: f64,
    /// Second moment axis ratio of the merged pixel set.
    pub aspect_ratio: f32,
    /// Mean contrast of the representative region.
    pub signature: Rgb,
    /// Tile ids in input order.
    pub source_tiles: Vec<String>,
    pub merged_regions: usize,
}

/// A region lifted into the global frame.
struct Candidate<'a> {
    tile_order: usize,
    discovery: usize,
    tile: &'a TileDetection,
    region: &'a ClassifiedRegion,
    bbox: GlobalBox,
    placed: bool,
}

impl Candidate<'_> {
    fn confidence(&self) -> f32 {
        self.region.classification.confidence
    }

    fn area(&self) -> usize {
        self.region.region.area
    }
}

/// Best first: confidence, then area, then tile order, then discovery order.
fn candidate_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.confidence()
        .total_cmp(&a.confidence())
        .then_with(|| b.area().cmp(&a.area()))
        .then_with(|| a.tile_order.cmp(&b.tile_order))
        .then_with(|| a.discovery.cmp(&b.discovery))
}

struct Group<'a> {
    members: Vec<&'a Candidate<'a>>,
}

impl<'a> Group<'a> {
    fn representative(&self) -> &'a Candidate<'a> {
        self.members[0]
    }

    fn accepts(&self, candidate: &Candidate, threshold: f64) -> bool {
        let rep = self.representative();
        rep.placed
            && candidate.placed
            && self
                .members
                .iter()
                .all(|m| m.tile_order != candidate.tile_order)
            && rep.bbox.iou(&candidate.bbox) >= threshold
    }
}

/// Merges tile detections (in input tile order) into global detections.
pub fn aggregate(tiles: &[TileDetection], config: &AggregationConfig) -> Vec<Detection> {
    let mut candidates: Vec<Candidate> = tiles
        .iter()
        .enumerate()
        .flat_map(|(tile_order, tile)| {
            let (dx, dy) = tile.tile.global_offset();
            let placed = tile.tile.offset_px.is_some();
            tile.regions
                .iter()
                .enumerate()
                .map(move |(discovery, region)| Candidate {
                    tile_order,
                    discovery,
                    tile,
                    region,
                    bbox: region.region.bbox.translate(dx, dy),
                    placed,
                })
        })
        .collect();
    candidates.sort_by(candidate_order);

    let mut groups: Vec<Group> = Vec::new();
    for candidate in &candidates {
        match groups
            .iter_mut()
            .find(|g| g.accepts(candidate, config.iou_merge_threshold))
        {
            Some(group) => group.members.push(candidate),
            None => groups.push(Group {
                members: vec![candidate],
            }),
        }
    }

    let mut detections: Vec<Detection> = groups.iter().map(build_detection).collect();
    detections.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.bbox.y_min.cmp(&b.bbox.y_min))
            .then_with(|| a.bbox.x_min.cmp(&b.bbox.x_min))
            .then_with(|| a.class.name().cmp(b.class.name()))
    });
    for (i, detection) in detections.iter_mut().enumerate() {
        detection.id = i + 1;
    }

    tracing::debug!(
        regions = candidates.len(),
        detections = detections.len(),
        "Aggregated tile detections"
    );
    detections
}

fn build_detection(group: &Group) -> Detection {
    let rep = group.representative();

    let mut bbox = rep.bbox;
    let mut pixels: HashSet<(i64, i64)> = HashSet::new();
    let mut tiles: Vec<(usize, &str)> = Vec::with_capacity(group.members.len());

    for member in &group.members {
        bbox = bbox.union(&member.bbox);
        tiles.push((member.tile_order, member.tile.tile.id.as_str()));

        let width = member.tile.width;
        let (dx, dy) = member.tile.tile.global_offset();
        pixels.extend(member.region.region.pixels.iter().map(|&idx| {
            let idx = idx as usize;
            ((idx % width) as i64 + dx, (idx / width) as i64 + dy)
        }));
    }
    tiles.sort_unstable();
    tiles.dedup();

    let area_px = pixels.len();
    let shape = UnionShape::measure(&pixels);
    let scale = rep.tile.pixel_scale_um;

    Detection {
        id: 0,
        class: rep.region.classification.class.clone(),
        confidence: rep.confidence(),
        centroid_px: shape.centroid,
        centroid_um: shape.centroid * scale,
        bbox,
        area_px,
        area_um2: area_px as f64 * scale * scale,
        perimeter_um: shape.perimeter as f64 * scale,
        aspect_ratio: shape.aspect_ratio,
        signature: rep.region.signature(),
        source_tiles: tiles.into_iter().map(|(_, id)| id.to_string()).collect(),
        merged_regions: group.members.len(),
    }
}

/// Geometry of the merged global pixel set.
struct UnionShape {
    centroid: DVec2,
    /// Boundary length in pixel edges.
    perimeter: usize,
    aspect_ratio: f32,
}

impl UnionShape {
    /// Integer moment sums keep the result independent of set iteration order.
    fn measure(pixels: &HashSet<(i64, i64)>) -> Self {
        let n = pixels.len() as i128;
        let (mut sx, mut sy, mut sxx, mut syy, mut sxy) = (0i128, 0i128, 0i128, 0i128, 0i128);
        let mut perimeter = 0;
        for &(x, y) in pixels {
            let (xi, yi) = (x as i128, y as i128);
            sx += xi;
            sy += yi;
            sxx += xi * xi;
            syy += yi * yi;
            sxy += xi * yi;
            perimeter += [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
                .iter()
                .filter(|p| !pixels.contains(*p))
                .count();
        }

        let nf = n as f64;
        let n2 = nf * nf;
        let cxx = (n * sxx - sx * sx) as f64 / n2;
        let cyy = (n * syy - sy * sy) as f64 / n2;
        let cxy = (n * sxy - sx * sy) as f64 / n2;

        Self {
            centroid: DVec2::new(sx as f64 / nf, sy as f64 / nf),
            perimeter,
            aspect_ratio: covariance_aspect_ratio(cxx, cyy, cxy),
        }
    }
}
