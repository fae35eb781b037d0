//! Thickness classification from contrast signatures.
//!
//! A region's signature is its mean contrast vector. Each class of the
//! [`SignatureTable`] describes an axis-aligned box in contrast space; the
//! class whose box is closest wins, and signatures farther than the table
//! tolerance from every box stay [`ThicknessClass::Unclassified`].

mod signature;


use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::Rgb;
use crate::flake_detection::Region;

pub use signature::{SignatureTable, ThicknessSignature, UNCLASSIFIED};

/// Thickness class assigned to a region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ThicknessClass {
    Class(String),
    Unclassified,
}

impl ThicknessClass {
    pub fn name(&self) -> &str {
        match self {
            Self::Class(name) => name,
            Self::Unclassified => UNCLASSIFIED,
        }
    }

    pub fn is_classified(&self) -> bool {
        matches!(self, Self::Class(_))
    }
}

impl fmt::Display for ThicknessClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<String> for ThicknessClass {
    fn from(name: String) -> Self {
        if name == UNCLASSIFIED {
            Self::Unclassified
        } else {
            Self::Class(name)
        }
    }
}

impl From<ThicknessClass> for String {
    fn from(class: ThicknessClass) -> Self {
        match class {
            ThicknessClass::Class(name) => name,
            ThicknessClass::Unclassified => UNCLASSIFIED.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub class: ThicknessClass,
    /// `1 / (1 + residual / tolerance)`; 1 inside a class range.
    pub confidence: f32,
    /// Distance from the signature to the best class range.
    pub residual: f32,
}

/// A shape-filtered region with its thickness class.
#[derive(Debug, Clone)]
pub struct ClassifiedRegion {
    pub region: Region,
    pub classification: Classification,
}

impl ClassifiedRegion {
    /// Contrast signature the classification was based on.
    #[inline]
    pub fn signature(&self) -> Rgb {
        self.region.mean_contrast
    }
}

/// Nearest-range classifier over a [`SignatureTable`].
#[derive(Debug, Clone, Copy)]
pub struct ThicknessClassifier<'a> {
    table: &'a SignatureTable,
}

impl<'a> ThicknessClassifier<'a> {
    pub fn new(table: &'a SignatureTable) -> Self {
        Self { table }
    }

    pub fn classify(&self, signature: Rgb) -> Classification {
        let tolerance = self.table.tolerance;

        // (residual, normalized center distance, index); earlier entries win ties.
        let mut best: Option<(f32, f32, usize)> = None;
        for (i, class) in self.table.classes.iter().enumerate() {
            let candidate = (
                class.residual(signature),
                class.normalized_center_distance(signature),
                i,
            );
            let better = match best {
                None => true,
                Some((r, d, _)) => candidate.0 < r || (candidate.0 == r && candidate.1 < d),
            };
            if better {
                best = Some(candidate);
            }
        }

        let Some((residual, _, index)) = best else {
            return Classification {
                class: ThicknessClass::Unclassified,
                confidence: 0.0,
                residual: f32::INFINITY,
            };
        };

        let confidence = (1.0 / (1.0 + residual / tolerance)).clamp(0.0, 1.0);
        let class = if residual > tolerance {
            ThicknessClass::Unclassified
        } else {
            ThicknessClass::Class(self.table.classes[index].name.clone())
        };

        Classification {
            class,
            confidence,
            residual,
        }
    }

    /// Classifies every region by its mean contrast.
    pub fn classify_regions(&self, regions: Vec<Region>) -> Vec<ClassifiedRegion> {
        regions
            .into_iter()
            .map(|region| {
                let classification = self.classify(region.mean_contrast);
                if !classification.class.is_classified() {
                    tracing::warn!(
                        label = region.label,
                        residual = classification.residual,
                        signature = ?region.mean_contrast,
                        "Region matches no thickness class"
                    );
                }
                ClassifiedRegion {
                    region,
                    classification,
                }
            })
            .collect()
    }
}
