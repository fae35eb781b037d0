use std::path::Path;

use glam::DVec2;

use super::*;

fn write_png(path: &Path, width: u32, height: u32, rgb: [u8; 3]) {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    img.save(path).unwrap();
}

#[test]
fn loads_png_normalized() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tile.png");
    write_png(&path, 8, 6, [255, 0, 51]);

    let image = MicroscopeImage::from_file(&path, 0.5, TileInfo::standalone("tile")).unwrap();
    assert_eq!(image.width(), 8);
    assert_eq!(image.height(), 6);
    assert_eq!(image.pixel_scale_um(), 0.5);

    let p = image.pixel(3, 2);
    assert!((p[0] - 1.0).abs() < 1e-6);
    assert!(p[1].abs() < 1e-6);
    assert!((p[2] - 0.2).abs() < 1e-3);
}

#[test]
fn missing_file_is_io_error() {
    let err = MicroscopeImage::from_file(
        Path::new("/nonexistent/tile.png"),
        0.5,
        TileInfo::standalone("x"),
    )
    .unwrap_err();
    assert!(matches!(err, InputError::Io { .. }));
}

#[test]
fn corrupt_file_is_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"\x89PNG\r\n\x1a\nnot really a png").unwrap();

    let err = MicroscopeImage::from_file(&path, 0.5, TileInfo::standalone("broken")).unwrap_err();
    assert!(matches!(err, InputError::Decode { .. }), "got {err:?}");
}

#[test]
fn from_pixels_checks_length() {
    let err = MicroscopeImage::from_pixels(4, 4, vec![[0.0; 3]; 15], 1.0, TileInfo::standalone("a"))
        .unwrap_err();
    assert!(matches!(
        err,
        InputError::BufferSize {
            expected: 16,
            actual: 15
        }
    ));
}

#[test]
fn sources_from_paths_use_file_stems() {
    let sources = TileSource::from_paths(&["scans/a_01.png", "b.tif"]);
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0].info.id, "a_01");
    assert_eq!(sources[1].info.id, "b");
    assert!(sources.iter().all(|s| s.info.offset_px.is_none()));
}

#[test]
fn manifest_resolves_paths_and_converts_micrometers() {
    let dir = tempfile::tempdir().unwrap();
    let manifest_path = dir.path().join("scan.yaml");
    std::fs::write(
        &manifest_path,
        "pixel_scale_um: 0.5\noffset_unit: micrometers\ntiles:\n  - { id: t0, path: t0.png, x: 0.0, y: 0.0 }\n  - { id: t1, path: t1.png, x: 50.0, y: 10.0 }\n",
    )
    .unwrap();

    let manifest = TileManifest::load(&manifest_path).unwrap();
    let sources = manifest.sources();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[1].path, dir.path().join("t1.png"));
    assert_eq!(sources[1].info.offset_px, Some(DVec2::new(100.0, 20.0)));
    assert_eq!(sources[1].info.global_offset(), (100, 20));
}

#[test]
fn manifest_rejects_duplicate_ids() {
    let dir = tempfile::tempdir().unwrap();
    let manifest_path = dir.path().join("scan.json");
    std::fs::write(
        &manifest_path,
        r#"{"tiles":[{"id":"a","path":"a.png","x":0,"y":0},{"id":"a","path":"b.png","x":1,"y":0}]}"#,
    )
    .unwrap();

    let err = TileManifest::load(&manifest_path).unwrap_err();
    assert!(matches!(err, InputError::InvalidManifest { .. }));
}

#[test]
fn scan_grid_is_serpentine() {
    let grid = ScanGrid {
        columns: 3,
        rows: 2,
        step_x_um: 100.0,
        step_y_um: 80.0,
        origin_x_um: 0.0,
        origin_y_um: 10.0,
        file_pattern: "mono_{index}.jpg".into(),
    };
    assert_eq!(
        grid.visit_order(),
        vec![(0, 0), (1, 0), (2, 0), (2, 1), (1, 1), (0, 1)]
    );

    let manifest = grid.to_manifest(0.4);
    assert_eq!(manifest.offset_unit, OffsetUnit::Micrometers);
    assert_eq!(manifest.tiles[3].id, "tile_0003");
    assert_eq!(manifest.tiles[3].path, std::path::PathBuf::from("mono_0003.jpg"));
    assert_eq!((manifest.tiles[3].x, manifest.tiles[3].y), (200.0, 90.0));
}

#[test]
fn scan_grid_covering_counts_tiles() {
    let grid = ScanGrid::covering(12000.0, 12000.0, 541.6, 406.2);
    assert_eq!(grid.columns, 23);
    assert_eq!(grid.rows, 30);
    assert_eq!(grid.tile_count(), 690);
}
