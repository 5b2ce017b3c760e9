use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::info;

use crate::{
    ConfigError, MaskArea, Result,
    classes::{ClassDef, validate_classes},
};

/// How a label grid is encoded when persisted
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MaskEncoding {
    /// One byte per pixel holding the class id (identity)
    Integer,
    /// One boolean layer per class (one-hot); the only lossless round trip
    Binary,
    /// Each pixel replaced by its class colour, 3 channels
    Rgb,
    /// Each pixel replaced by its class colour, 4 channels
    Rgba,
}

/// File format of the published merged mask
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MaskFormat {
    /// Tilemark's native container, supports every encoding
    Msk,
    Png,
    Jpeg,
}

impl MaskFormat {
    /// Encodings this file format can represent without data loss beyond
    /// what the encoding itself loses
    pub fn allowed_encodings(&self) -> &'static [MaskEncoding] {
        match self {
            Self::Msk => &[
                MaskEncoding::Integer,
                MaskEncoding::Binary,
                MaskEncoding::Rgb,
                MaskEncoding::Rgba,
            ],
            Self::Png => &[MaskEncoding::Integer, MaskEncoding::Rgb, MaskEncoding::Rgba],
            // JPEG has no alpha and no lossless channel
            Self::Jpeg => &[MaskEncoding::Rgb],
        }
    }
}

/// Metric used for per-user agreement scores
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScoreMetric {
    /// Plain pixel accuracy (default: symmetric for peer scoring)
    #[default]
    Accuracy,
    /// Macro-averaged F1 over classes
    F1,
    /// Macro-averaged Jaccard / IoU over classes
    Jaccard,
}

fn default_suppression_filter_size() -> usize {
    5
}

/// The project segmentation configuration consumed by the core.
///
/// Owned by the external project-configuration collaborator; validated once
/// at project-load time so that per-request operations never hit a
/// configuration failure half way through a write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    pub mask_area: MaskArea,
    pub classes: Vec<ClassDef>,
    #[serde(default)]
    pub score: ScoreMetric,
    pub mask_encoding: MaskEncoding,
    pub mask_format: MaskFormat,
    /// Side length of the suppression-filter neighbourhood
    #[serde(default = "default_suppression_filter_size")]
    pub suppression_filter_size: usize,
    /// Percentage threshold (0-100); 0 disables the suppression pass
    #[serde(default)]
    pub suppression_threshold: u8,
    /// Class forced onto isolated pixels, normally the background class
    #[serde(default)]
    pub suppression_default_class: u8,
}

impl SegmentationConfig {
    /// Load and validate a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        info!(
            classes = config.classes.len(),
            encoding = %config.mask_encoding,
            format = %config.mask_format,
            score = %config.score,
            "loaded segmentation config"
        );
        Ok(config)
    }

    /// Validate the whole configuration.
    ///
    /// Fatal at startup; never called per request.
    pub fn validate(&self) -> Result<()> {
        validate_classes(&self.classes)?;

        if !self
            .mask_format
            .allowed_encodings()
            .contains(&self.mask_encoding)
        {
            return Err(ConfigError::IncompatibleEncoding {
                format: self.mask_format.to_string(),
                encoding: self.mask_encoding.to_string(),
            });
        }

        if self.suppression_default_class as usize >= self.classes.len() {
            return Err(ConfigError::SparseClassIds {
                expected: self.classes.len(),
                got: self.suppression_default_class,
            });
        }

        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }
}
