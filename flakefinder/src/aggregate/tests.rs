use glam::DVec2;

use super::*;
use crate::classification::Classification;
use crate::flake_detection::{DetectionDiagnostics, Region, TileSummary};
use crate::image_source::TileInfo;
use crate::math::Aabb;

const TILE: usize = 100;

/// Rectangle `[x, x + w) x [y, y + h)` in tile coordinates.
fn rect(x: usize, y: usize, w: usize, h: usize, class: &str, confidence: f32) -> ClassifiedRegion {
    let pixels: Vec<u32> = (y..y + h)
        .flat_map(|py| (x..x + w).map(move |px| (py * TILE + px) as u32))
        .collect();
    ClassifiedRegion {
        region: Region {
            label: 1,
            area: pixels.len(),
            pixels,
            bbox: Aabb::new(x, x + w - 1, y, y + h - 1),
            perimeter: 2 * (w + h),
            centroid: DVec2::new(x as f64 + (w - 1) as f64 / 2.0, y as f64 + (h - 1) as f64 / 2.0),
            aspect_ratio: 1.0,
            mean_contrast: [-0.04, -0.07, -0.03],
            median_contrast: [-0.04, -0.07, -0.03],
            mean_color: [0.5; 3],
            peak_contrast: 0.1,
        },
        classification: Classification {
            class: ThicknessClass::Class(class.to_string()),
            confidence,
            residual: 0.0,
        },
    }
}

fn tile(info: TileInfo, regions: Vec<ClassifiedRegion>) -> TileDetection {
    TileDetection {
        tile: info,
        width: TILE,
        height: TILE,
        pixel_scale_um: 0.5,
        substrate: [0.5; 3],
        regions,
        summary: TileSummary {
            score: 0,
            flagged: false,
            peak_contrast: 0.0,
            peak_x: 0,
            peak_y: 0,
        },
        diagnostics: DetectionDiagnostics::default(),
    }
}

fn placed(id: &str, x: f64, y: f64) -> TileInfo {
    TileInfo::placed(id, DVec2::new(x, y))
}

#[test]
fn overlapping_tiles_merge_into_one_detection() {
    // Tile b starts 50 px right of tile a; the flake sits in the overlap.
    let a = tile(placed("a", 0.0, 0.0), vec![rect(60, 40, 20, 20, "monolayer", 1.0)]);
    let b = tile(placed("b", 50.0, 0.0), vec![rect(10, 40, 20, 20, "monolayer", 1.0)]);

    let detections = aggregate(&[a, b], &AggregationConfig::default());
    assert_eq!(detections.len(), 1);

    let d = &detections[0];
    assert_eq!(d.id, 1);
    assert_eq!(d.area_px, 400);
    assert_eq!(d.merged_regions, 2);
    assert_eq!(d.source_tiles, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(
        d.bbox,
        GlobalBox {
            x_min: 60,
            x_max: 79,
            y_min: 40,
            y_max: 59
        }
    );
    assert_eq!(d.centroid_px, DVec2::new(69.5, 49.5));
    assert_eq!(d.centroid_um, DVec2::new(34.75, 24.75));
    assert!((d.area_um2 - 100.0).abs() < 1e-9);
    assert!((d.perimeter_um - 40.0).abs() < 1e-9);
    assert!((d.aspect_ratio - 1.0).abs() < 1e-6);
}

#[test]
fn merged_shape_is_measured_on_the_union() {
    // Each tile sees a 20x20 square; offset by 10 px they cover 30x20.
    let a = tile(placed("a", 0.0, 0.0), vec![rect(60, 40, 20, 20, "monolayer", 1.0)]);
    let b = tile(placed("b", 50.0, 0.0), vec![rect(20, 40, 20, 20, "monolayer", 0.8)]);

    let detections = aggregate(&[a, b], &AggregationConfig::default());
    assert_eq!(detections.len(), 1);

    let d = &detections[0];
    assert_eq!(d.area_px, 600);
    assert_eq!(d.bbox.x_min, 60);
    assert_eq!(d.bbox.x_max, 89);
    assert_eq!(d.centroid_px, DVec2::new(74.5, 49.5));
    // 2 * (30 + 20) edges at 0.5 um.
    assert!((d.perimeter_um - 50.0).abs() < 1e-9);
    // Variances 75 and 33.3 with the pixel term.
    assert!((d.aspect_ratio - 1.5).abs() < 1e-4);
}

#[test]
fn partial_views_take_pixel_union() {
    // The flake is cut by the right edge of tile a and seen whole in tile b.
    let a = tile(placed("a", 0.0, 0.0), vec![rect(80, 40, 15, 20, "bilayer", 0.9)]);
    let b = tile(placed("b", 50.0, 0.0), vec![rect(30, 40, 20, 20, "bilayer", 1.0)]);

    let detections = aggregate(&[a, b], &AggregationConfig::default());
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].area_px, 400);
    assert_eq!(detections[0].confidence, 1.0);
    assert_eq!(detections[0].bbox.x_max, 99);
}

#[test]
fn same_tile_regions_never_merge() {
    let a = tile(
        placed("a", 0.0, 0.0),
        vec![
            rect(10, 10, 20, 20, "monolayer", 1.0),
            rect(12, 12, 20, 20, "monolayer", 1.0),
        ],
    );
    let detections = aggregate(&[a], &AggregationConfig::default());
    assert_eq!(detections.len(), 2);
}

#[test]
fn standalone_images_are_never_merged() {
    let a = tile(TileInfo::standalone("a"), vec![rect(10, 10, 20, 20, "monolayer", 1.0)]);
    let b = tile(TileInfo::standalone("b"), vec![rect(10, 10, 20, 20, "monolayer", 1.0)]);
    let detections = aggregate(&[a, b], &AggregationConfig::default());
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].source_tiles, vec!["a".to_string()]);
    assert_eq!(detections[1].source_tiles, vec!["b".to_string()]);
}

#[test]
fn low_iou_keeps_detections_apart() {
    let a = tile(placed("a", 0.0, 0.0), vec![rect(60, 40, 20, 20, "monolayer", 1.0)]);
    // Same flake misregistered by 15 px: IoU = 5*20 / (800 - 100) < 0.3.
    let b = tile(placed("b", 65.0, 0.0), vec![rect(10, 40, 20, 20, "monolayer", 1.0)]);
    let detections = aggregate(&[a, b], &AggregationConfig::default());
    assert_eq!(detections.len(), 2);
}

#[test]
fn representative_is_highest_confidence() {
    let a = tile(placed("a", 0.0, 0.0), vec![rect(60, 40, 20, 20, "monolayer", 0.6)]);
    let b = tile(placed("b", 50.0, 0.0), vec![rect(10, 40, 20, 20, "bilayer", 0.8)]);
    let detections = aggregate(&[a, b], &AggregationConfig::default());
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].class.name(), "bilayer");
    assert_eq!(detections[0].confidence, 0.8);
}

#[test]
fn output_sorted_by_confidence_then_position() {
    let a = tile(
        placed("a", 0.0, 0.0),
        vec![
            rect(70, 70, 10, 10, "monolayer", 1.0),
            rect(10, 70, 10, 10, "monolayer", 1.0),
            rect(50, 10, 10, 10, "bilayer", 0.5),
            rect(40, 40, 10, 10, "monolayer", 1.0),
        ],
    );
    let detections = aggregate(&[a], &AggregationConfig::default());
    let order: Vec<(i64, i64)> = detections
        .iter()
        .map(|d| (d.bbox.x_min, d.bbox.y_min))
        .collect();
    assert_eq!(order, vec![(40, 40), (10, 70), (70, 70), (50, 10)]);
    let ids: Vec<usize> = detections.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[test]
fn config_validation() {
    assert!(AggregationConfig::default().validate().is_ok());
    let config = AggregationConfig {
        iou_merge_threshold: 0.0,
    };
    assert!(config.validate().is_err());
}
