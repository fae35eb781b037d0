//! Fork-join detection over a set of tiles.
//!
//! Each tile is loaded and processed independently on the rayon pool; the
//! results are joined in input order. An unreadable tile is recorded as a
//! failure and does not abort the batch.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{CancelToken, SharedFn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::flake_detection::{FlakeDetector, TileDetection};
use crate::image_source::{MicroscopeImage, TileInfo, TileSource, DEFAULT_PIXEL_SCALE_UM};
use crate::report::write_overlays;

/// Progress information, reported after every finished tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    pub tile_id: String,
}

pub type ProgressCallback = SharedFn<dyn Fn(BatchProgress) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Micrometers per pixel applied to every loaded tile.
    pub pixel_scale_um: f64,
    pub cancel: CancelToken,
    pub progress: ProgressCallback,
    /// When set, review overlays are written here.
    pub overlay_dir: Option<PathBuf>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            pixel_scale_um: DEFAULT_PIXEL_SCALE_UM,
            cancel: CancelToken::new(),
            progress: ProgressCallback::default(),
            overlay_dir: None,
        }
    }
}

/// A tile excluded from the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileFailure {
    pub tile: TileInfo,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Successfully processed tiles, in input order.
    pub tiles: Vec<TileDetection>,
    pub failures: Vec<TileFailure>,
    /// Tiles skipped after cancellation.
    pub cancelled: Vec<TileInfo>,
}

enum TileOutcome {
    Detected(Box<TileDetection>),
    Failed(TileFailure),
    Cancelled(TileInfo),
}

/// Loads and processes tiles from disk.
pub fn run_batch(
    sources: &[TileSource],
    detector: &FlakeDetector,
    options: &BatchOptions,
) -> Result<BatchResult, InputError> {
    run_sources(sources, &Preloaded::default(), detector, options)
}

/// Tiles decoded ahead of the batch, keyed by their index in the source list.
#[derive(Debug, Default)]
pub(crate) struct Preloaded {
    indices: Vec<usize>,
    images: Vec<MicroscopeImage>,
}

impl Preloaded {
    /// Decodes sources in order until `count` of them load, skipping failures.
    pub(crate) fn first_readable(sources: &[TileSource], count: usize, pixel_scale_um: f64) -> Self {
        let mut preloaded = Self::default();
        for (index, source) in sources.iter().enumerate() {
            if preloaded.images.len() == count {
                break;
            }
            match MicroscopeImage::load(source, pixel_scale_um) {
                Ok(image) => {
                    preloaded.indices.push(index);
                    preloaded.images.push(image);
                }
                Err(err) => {
                    tracing::debug!(tile = %source.info.id, error = %err, "Tile not usable as sample");
                }
            }
        }
        preloaded
    }

    pub(crate) fn images(&self) -> &[MicroscopeImage] {
        &self.images
    }

    fn get(&self, index: usize) -> Option<&MicroscopeImage> {
        self.indices
            .binary_search(&index)
            .ok()
            .map(|i| &self.images[i])
    }
}

/// Like [`run_batch`], reusing images in `preloaded` instead of decoding them again.
pub(crate) fn run_sources(
    sources: &[TileSource],
    preloaded: &Preloaded,
    detector: &FlakeDetector,
    options: &BatchOptions,
) -> Result<BatchResult, InputError> {
    process(
        sources,
        options,
        |index, source| {
            if let Some(image) = preloaded.get(index) {
                return TileOutcome::Detected(Box::new(detect_tile(image, detector, options)));
            }
            match MicroscopeImage::load(source, options.pixel_scale_um) {
                Ok(image) => {
                    TileOutcome::Detected(Box::new(detect_tile(&image, detector, options)))
                }
                Err(err) => {
                    tracing::warn!(tile = %source.info.id, error = %err, "Skipping unreadable tile");
                    TileOutcome::Failed(TileFailure {
                        tile: source.info.clone(),
                        reason: err.to_string(),
                    })
                }
            }
        },
        |source| source.info.clone(),
    )
}

/// Processes tiles that are already in memory.
pub fn run_images(
    images: &[MicroscopeImage],
    detector: &FlakeDetector,
    options: &BatchOptions,
) -> Result<BatchResult, InputError> {
    process(
        images,
        options,
        |_, image| TileOutcome::Detected(Box::new(detect_tile(image, detector, options))),
        |image| image.tile().clone(),
    )
}

fn detect_tile(
    image: &MicroscopeImage,
    detector: &FlakeDetector,
    options: &BatchOptions,
) -> TileDetection {
    let Some(dir) = options.overlay_dir.as_deref() else {
        return detector.detect(image);
    };

    let (detection, maps) = detector.detect_with_maps(image);
    let config = detector.config();
    if let Err(err) = write_overlays(
        dir,
        image,
        &detection,
        &maps,
        detector.table(),
        config.contrast_threshold,
        config.highlight_band,
    ) {
        tracing::warn!(tile = %detection.tile.id, error = %err, "Failed to write overlay");
    }
    detection
}

fn process<T: Sync>(
    items: &[T],
    options: &BatchOptions,
    run: impl Fn(usize, &T) -> TileOutcome + Sync,
    info: impl Fn(&T) -> TileInfo + Sync,
) -> Result<BatchResult, InputError> {
    let total = items.len();
    let completed = AtomicUsize::new(0);

    tracing::info!(tiles = total, "Processing tiles");

    let outcomes: Vec<TileOutcome> = items
        .par_iter()
        .enumerate()
        .map(|(index, item)| {
            if options.cancel.is_cancelled() {
                return TileOutcome::Cancelled(info(item));
            }
            let outcome = run(index, item);

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(callback) = options.progress.as_ref() {
                let tile_id = match &outcome {
                    TileOutcome::Detected(d) => d.tile.id.clone(),
                    TileOutcome::Failed(f) => f.tile.id.clone(),
                    TileOutcome::Cancelled(t) => t.id.clone(),
                };
                callback(BatchProgress {
                    completed: done,
                    total,
                    tile_id,
                });
            }
            outcome
        })
        .collect();

    let mut result = BatchResult::default();
    for outcome in outcomes {
        match outcome {
            TileOutcome::Detected(d) => result.tiles.push(*d),
            TileOutcome::Failed(f) => result.failures.push(f),
            TileOutcome::Cancelled(t) => result.cancelled.push(t),
        }
    }

    check_dimensions(&result.tiles)?;
    if result.tiles.is_empty() && !result.failures.is_empty() {
        return Err(InputError::NoReadableTiles {
            failed: result.failures.len(),
        });
    }

    tracing::info!(
        processed = result.tiles.len(),
        failed = result.failures.len(),
        cancelled = result.cancelled.len(),
        "Batch finished"
    );
    Ok(result)
}

/// All tiles of a scan must share the dimensions of the first one.
fn check_dimensions(tiles: &[TileDetection]) -> Result<(), InputError> {
    let Some(first) = tiles.first() else {
        return Ok(());
    };
    match tiles
        .iter()
        .find(|t| t.width != first.width || t.height != first.height)
    {
        Some(tile) => Err(InputError::InconsistentDimensions {
            tile: tile.tile.id.clone(),
            expected_width: first.width,
            expected_height: first.height,
            actual_width: tile.width,
            actual_height: tile.height,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use glam::DVec2;

    use super::*;
    use crate::testing::{detection_config, signature_table, SyntheticFlake, SyntheticTile, MONOLAYER};

    fn detector() -> FlakeDetector {
        FlakeDetector::new(detection_config(), Arc::new(signature_table())).unwrap()
    }

    fn write_tiles(dir: &std::path::Path, count: usize) -> Vec<TileSource> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("t{i}.png"));
                SyntheticTile::new(64, 64)
                    .with_flake(SyntheticFlake::square(20, 20, 10, MONOLAYER))
                    .write_png(&path);
                TileSource {
                    info: TileInfo {
                        id: format!("t{i}"),
                        path: Some(path.clone()),
                        offset_px: Some(DVec2::new(i as f64 * 64.0, 0.0)),
                    },
                    path,
                }
            })
            .collect()
    }

    #[test]
    fn results_keep_input_order_and_report_progress() {
        let dir = tempfile::tempdir().unwrap();
        let sources = write_tiles(dir.path(), 4);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let options = BatchOptions {
            progress: ProgressCallback::new(Arc::new(move |p: BatchProgress| {
                sink.lock().unwrap().push(p);
            })),
            ..Default::default()
        };

        let result = run_batch(&sources, &detector(), &options).unwrap();
        let ids: Vec<&str> = result.tiles.iter().map(|t| t.tile.id.as_str()).collect();
        assert_eq!(ids, vec!["t0", "t1", "t2", "t3"]);
        assert!(result.tiles.iter().all(|t| t.regions.len() == 1));

        let mut completed: Vec<usize> = seen.lock().unwrap().iter().map(|p| p.completed).collect();
        completed.sort_unstable();
        assert_eq!(completed, vec![1, 2, 3, 4]);
        assert!(seen.lock().unwrap().iter().all(|p| p.total == 4));
    }

    #[test]
    fn unreadable_tile_is_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut sources = write_tiles(dir.path(), 2);
        std::fs::write(&sources[1].path, b"garbage").unwrap();
        sources.push(TileSource {
            info: TileInfo::standalone("missing"),
            path: dir.path().join("missing.png"),
        });

        let result = run_batch(&sources, &detector(), &BatchOptions::default()).unwrap();
        assert_eq!(result.tiles.len(), 1);
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.failures[0].tile.id, "t1");
        assert_eq!(result.failures[1].tile.id, "missing");
    }

    #[test]
    fn all_tiles_failing_is_an_error() {
        let sources = vec![TileSource {
            info: TileInfo::standalone("missing"),
            path: PathBuf::from("/nonexistent/missing.png"),
        }];
        let err = run_batch(&sources, &detector(), &BatchOptions::default()).unwrap_err();
        assert!(matches!(err, InputError::NoReadableTiles { failed: 1 }));
    }

    #[test]
    fn inconsistent_dimensions_are_fatal() {
        let images = vec![
            SyntheticTile::new(64, 64).image(TileInfo::standalone("a")),
            SyntheticTile::new(64, 48).image(TileInfo::standalone("b")),
        ];
        let err = run_images(&images, &detector(), &BatchOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            InputError::InconsistentDimensions {
                actual_height: 48,
                ..
            }
        ));
    }

    #[test]
    fn cancelled_batch_skips_tiles() {
        let images = vec![
            SyntheticTile::new(64, 64).image(TileInfo::standalone("a")),
            SyntheticTile::new(64, 64).image(TileInfo::standalone("b")),
        ];
        let options = BatchOptions::default();
        options.cancel.cancel();

        let result = run_images(&images, &detector(), &options).unwrap();
        assert!(result.tiles.is_empty());
        assert_eq!(result.cancelled.len(), 2);
    }

    #[test]
    fn preloaded_samples_skip_unreadable_tiles_and_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let mut sources = write_tiles(dir.path(), 3);
        std::fs::write(&sources[0].path, b"garbage").unwrap();

        let preloaded = Preloaded::first_readable(&sources, 1, DEFAULT_PIXEL_SCALE_UM);
        assert_eq!(preloaded.images().len(), 1);
        assert_eq!(preloaded.images()[0].tile().id, "t1");

        // A preloaded tile no longer needs its file.
        std::fs::remove_file(&sources[1].path).unwrap();
        sources[2].path = dir.path().join("gone.png");

        let result = run_sources(&sources, &preloaded, &detector(), &BatchOptions::default())
            .unwrap();
        let ids: Vec<&str> = result.tiles.iter().map(|t| t.tile.id.as_str()).collect();
        assert_eq!(ids, vec!["t1"]);
        let failed: Vec<&str> = result.failures.iter().map(|f| f.tile.id.as_str()).collect();
        assert_eq!(failed, vec!["t0", "t2"]);
    }
}
