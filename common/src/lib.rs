use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod cancel;
pub mod file_format;
pub mod log_setup;
pub mod normalize_string;
pub mod shared_fn;

pub use cancel::CancelToken;
pub use file_format::{FileExtensionError, FileFormat};
pub use shared_fn::SharedFn;

use crate::normalize_string::NormalizeString;

#[derive(Debug, thiserror::Error)]
pub enum SerdeFormatError {
    #[error("YAML serialization failed")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON serialization failed")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Extension(#[from] FileExtensionError),
    #[error("Failed to access '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type SerdeFormatResult<T> = Result<T, SerdeFormatError>;

pub fn serialize<T: Serialize>(value: &T, format: FileFormat) -> SerdeFormatResult<String> {
    let text = match format {
        FileFormat::Yaml => serde_yml::to_string(value)?,
        FileFormat::Json => serde_json::to_string_pretty(value)?,
    };
    Ok(text.normalize())
}

pub fn deserialize<T: DeserializeOwned>(
    serialized: &str,
    format: FileFormat,
) -> SerdeFormatResult<T> {
    match format {
        FileFormat::Yaml => Ok(serde_yml::from_str(serialized)?),
        FileFormat::Json => Ok(serde_json::from_str(serialized)?),
    }
}

/// Reads and deserializes a file, picking the format from its extension.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> SerdeFormatResult<T> {
    let format = FileFormat::from_path(path)?;
    let text = std::fs::read_to_string(path).map_err(|source| SerdeFormatError::Io {
        path: path.display().to_string(),
        source,
    })?;
    deserialize(&text, format)
}

/// Serializes a value and writes it, picking the format from the extension.
pub fn save_file<T: Serialize>(value: &T, path: &Path) -> SerdeFormatResult<()> {
    let format = FileFormat::from_path(path)?;
    let text = serialize(value, format)?;
    std::fs::write(path, text).map_err(|source| SerdeFormatError::Io {
        path: path.display().to_string(),
        source,
    })
}
