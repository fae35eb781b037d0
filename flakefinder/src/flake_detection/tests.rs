use std::sync::Arc;

use super::*;
use crate::classification::ThicknessClass;
use crate::error::ConfigError;
use crate::testing::{
    detection_config, init_tracing, signature_table, SyntheticFlake, SyntheticTile, BILAYER,
    MONOLAYER,
};

fn detector(config: DetectionConfig) -> FlakeDetector {
    FlakeDetector::new(config, Arc::new(signature_table())).unwrap()
}

#[test]
fn uniform_tile_has_no_regions() {
    init_tracing();
    let image = SyntheticTile::new(128, 96).image(TileInfo::standalone("blank"));
    let result = detector(detection_config()).detect(&image);

    assert!(result.regions.is_empty());
    assert_eq!(result.diagnostics.pixels_above_threshold, 0);
    assert_eq!(result.summary.score, 0);
    assert!(!result.summary.flagged);
}

#[test]
fn noisy_uniform_tile_has_no_regions() {
    let image = SyntheticTile::new(128, 128)
        .with_noise(0.005, 3)
        .with_gradient(0.05)
        .image(TileInfo::standalone("noisy"));
    let config = DetectionConfig {
        smoothing_sigma: 1.0,
        ..detection_config()
    };
    let result = detector(config).detect(&image);
    assert!(result.regions.is_empty());
}

#[test]
fn square_flake_is_detected_and_classified() {
    let image = SyntheticTile::new(128, 128)
        .with_flake(SyntheticFlake::square(40, 50, 20, MONOLAYER))
        .image(TileInfo::standalone("one"));
    let result = detector(detection_config()).detect(&image);

    assert_eq!(result.regions.len(), 1);
    let flake = &result.regions[0];
    assert_eq!(flake.region.area, 400);
    assert_eq!(
        flake.classification.class,
        ThicknessClass::Class("monolayer".into())
    );
    assert!(flake.classification.confidence > 0.99);
    assert!((flake.region.centroid.x - 49.5).abs() < 1e-9);
    assert!((flake.region.centroid.y - 59.5).abs() < 1e-9);

    assert_eq!(result.summary.score, 400);
    assert!(result.summary.flagged);
    assert!(flake.region.bbox.contains(result.summary.peak_x, result.summary.peak_y));
    assert_eq!(result.substrate, crate::testing::SUBSTRATE);
}

#[test]
fn two_thickness_classes_in_one_tile() {
    let image = SyntheticTile::new(160, 128)
        .with_flake(SyntheticFlake::square(20, 20, 16, BILAYER))
        .with_flake(SyntheticFlake::square(100, 70, 12, MONOLAYER))
        .image(TileInfo::standalone("two"));
    let result = detector(detection_config()).detect(&image);

    let names: Vec<&str> = result
        .regions
        .iter()
        .map(|r| r.classification.class.name())
        .collect();
    assert_eq!(names, vec!["bilayer", "monolayer"]);
    assert_eq!(result.diagnostics.classified, 2);
}

#[test]
fn shape_filter_rejections_are_counted() {
    let image = SyntheticTile::new(128, 128)
        // Too small.
        .with_flake(SyntheticFlake::square(20, 20, 3, MONOLAYER))
        // Too elongated.
        .with_flake(SyntheticFlake {
            x: 20,
            y: 60,
            width: 60,
            height: 2,
            contrast: MONOLAYER,
        })
        // Touches the left edge.
        .with_flake(SyntheticFlake::square(0, 100, 10, MONOLAYER))
        .image(TileInfo::standalone("rejects"));
    let result = detector(detection_config()).detect(&image);

    assert!(result.regions.is_empty());
    let stats = result.diagnostics.shape_filter;
    assert_eq!(stats.too_small, 1);
    assert_eq!(stats.too_elongated, 1);
    assert_eq!(stats.at_border, 1);
    assert_eq!(result.diagnostics.connected_components, 3);
}

#[test]
fn unknown_signature_is_unclassified() {
    let image = SyntheticTile::new(128, 128)
        .with_flake(SyntheticFlake::square(50, 50, 12, [0.2, 0.2, 0.2]))
        .image(TileInfo::standalone("odd"));
    let result = detector(detection_config()).detect(&image);

    assert_eq!(result.regions.len(), 1);
    assert_eq!(
        result.regions[0].classification.class,
        ThicknessClass::Unclassified
    );
    assert_eq!(result.diagnostics.unclassified, 1);
}

#[test]
fn detector_rejects_normalization_mismatch() {
    let config = DetectionConfig {
        normalization: Normalization::Divide,
        ..detection_config()
    };
    let err = FlakeDetector::new(config, Arc::new(signature_table())).unwrap_err();
    assert!(matches!(err, ConfigError::NormalizationMismatch { .. }));
}

#[test]
fn detector_rejects_invalid_config() {
    let config = DetectionConfig {
        min_area: 0,
        ..detection_config()
    };
    assert!(FlakeDetector::new(config, Arc::new(signature_table())).is_err());
}
