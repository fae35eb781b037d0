use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::Rgb;
use crate::error::ConfigError;
use crate::flake_detection::Normalization;

/// Reserved class name for regions no signature matches.
pub const UNCLASSIFIED: &str = "unclassified";

/// Expected contrast range of one thickness class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThicknessSignature {
    pub name: String,
    /// Layer count, when the class corresponds to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<u32>,
    /// Per-channel lower bound of the mean contrast.
    pub min: Rgb,
    /// Per-channel upper bound of the mean contrast.
    pub max: Rgb,
    /// Overlay box color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[u8; 3]>,
}

impl ThicknessSignature {
    pub fn center(&self) -> Rgb {
        [
            0.5 * (self.min[0] + self.max[0]),
            0.5 * (self.min[1] + self.max[1]),
            0.5 * (self.min[2] + self.max[2]),
        ]
    }

    /// Euclidean distance from `signature` to the range box, 0 inside it.
    pub fn residual(&self, signature: Rgb) -> f32 {
        let mut sq = 0.0;
        for c in 0..3 {
            let d = if signature[c] < self.min[c] {
                self.min[c] - signature[c]
            } else if signature[c] > self.max[c] {
                signature[c] - self.max[c]
            } else {
                0.0
            };
            sq += d * d;
        }
        sq.sqrt()
    }

    /// Distance to the range center in units of the per-channel half width.
    pub fn normalized_center_distance(&self, signature: Rgb) -> f32 {
        let center = self.center();
        let mut sq = 0.0;
        for c in 0..3 {
            let half = (0.5 * (self.max[c] - self.min[c])).max(f32::EPSILON);
            let d = (signature[c] - center[c]) / half;
            sq += d * d;
        }
        sq.sqrt()
    }
}

/// Thickness classes for one material/substrate combination.
///
/// ```yaml
/// material: WSe2
/// substrate: 90nm SiO2/Si
/// normalization: subtract
/// tolerance: 0.02
/// classes:
///   - { name: monolayer, layers: 1, min: [-0.06, -0.09, -0.04], max: [-0.02, -0.05, -0.01] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureTable {
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub substrate: String,
    /// Normalization the ranges were measured with.
    #[serde(default)]
    pub normalization: Normalization,
    /// Largest residual still accepted as a match.
    pub tolerance: f32,
    pub classes: Vec<ThicknessSignature>,
}

impl SignatureTable {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let table: SignatureTable =
            common::load_file(path).map_err(|source| ConfigError::SignatureFile {
                path: path.to_path_buf(),
                source,
            })?;
        table.validate()?;

        tracing::info!(
            path = %path.display(),
            material = %table.material,
            classes = table.classes.len(),
            "Loaded signature table"
        );
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.classes.is_empty() {
            return Err(ConfigError::EmptySignatureTable);
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "tolerance",
                reason: format!("must be positive, got {}", self.tolerance),
            });
        }

        let mut names = hashbrown::HashSet::new();
        for class in &self.classes {
            let invalid = |reason: &str| ConfigError::InvalidSignature {
                class: class.name.clone(),
                reason: reason.to_string(),
            };

            if class.name.trim().is_empty() {
                return Err(invalid("name is empty"));
            }
            if class.name.eq_ignore_ascii_case(UNCLASSIFIED) {
                return Err(invalid("name is reserved"));
            }
            if !names.insert(class.name.as_str()) {
                return Err(invalid("duplicate class name"));
            }
            if class
                .min
                .iter()
                .chain(class.max.iter())
                .any(|v| !v.is_finite())
            {
                return Err(invalid("range bounds must be finite"));
            }
            if (0..3).any(|c| class.min[c] > class.max[c]) {
                return Err(invalid("min exceeds max"));
            }
        }
        Ok(())
    }

    pub fn class(&self, name: &str) -> Option<&ThicknessSignature> {
        self.classes.iter().find(|c| c.name == name)
    }
}
