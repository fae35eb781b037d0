use std::path::PathBuf;

use common::SerdeFormatError;
use thiserror::Error;

/// Errors raised while reading images or tile manifests. Fatal for the run,
/// except unreadable single tiles in a batch, which are recorded per tile.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to read image '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to decode image '{path}': {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Image '{path}' has no pixels")]
    Empty { path: PathBuf },

    #[error("Pixel buffer holds {actual} pixels, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error(
        "Tile '{tile}' is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}"
    )]
    InconsistentDimensions {
        tile: String,
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    #[error("Failed to load tile manifest '{path}': {source}")]
    Manifest {
        path: PathBuf,
        source: SerdeFormatError,
    },

    #[error("Tile manifest '{path}' is invalid: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("No readable tiles in batch ({failed} failed)")]
    NoReadableTiles { failed: usize },
}

/// Errors in thresholds, the signature table, or the run configuration.
/// Always raised before any tile is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Failed to load configuration '{path}': {source}")]
    ConfigFile {
        path: PathBuf,
        source: SerdeFormatError,
    },

    #[error("No signature table configured")]
    MissingSignatureTable,

    #[error("Failed to load signature table '{path}': {source}")]
    SignatureFile {
        path: PathBuf,
        source: SerdeFormatError,
    },

    #[error("Signature table has no thickness classes")]
    EmptySignatureTable,

    #[error("Signature for class '{class}' is invalid: {reason}")]
    InvalidSignature { class: String, reason: String },

    #[error(
        "Signature table was calibrated for {table} normalization, detection is configured for {detection}"
    )]
    NormalizationMismatch { table: String, detection: String },

    #[error("Threshold calibration needs at least one image")]
    NoCalibrationImages,
}

/// Errors writing reports or overlay images.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize report '{path}': {source}")]
    Serialize {
        path: PathBuf,
        source: SerdeFormatError,
    },

    #[error("Failed to write overlay '{path}': {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Top-level error for a pipeline run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
