//! # Interactive Segmentation
//!
//! Turns a handful of user-clicked pixel labels into a full-image class
//! prediction:
//!
//! 1. [`build_features`] derives a fixed-width per-pixel feature matrix
//!    from the raw multi-band raster (optionally with local min/max
//!    context, edge responses, coordinate channels and superpixel ids).
//! 2. [`fit_and_predict`] stratifies the sparse labels into a train and a
//!    validation subset, trains a gradient-boosted tree ensemble with
//!    validation-driven early stopping, predicts every pixel of the
//!    masking area and optionally runs the isolated-pixel suppression
//!    filter.
//!
//! The model is retrained from scratch on every request; nothing is
//! persisted between calls. Feature rows, sparse label indices and the
//! output grid all share the masking area's row-major flattening.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ndarray::Array3;
//! use tilemark_common::{MaskArea, Raster};
//! use segmentation::{FeatureOptions, ClassifierConfig, SparseLabels, build_features, fit_and_predict};
//!
//! let raster = Raster::from_array(Array3::zeros((64, 64, 4))).unwrap();
//! let area = MaskArea::new(0, 0, 64, 64).unwrap();
//! let features = build_features(&raster, &area, &FeatureOptions::default())?;
//!
//! let labels = SparseLabels::new(vec![0, 100, 2000], vec![0, 1, 0])?;
//! let grid = fit_and_predict(&features, &labels, &ClassifierConfig::default(), &area)?;
//! assert_eq!(grid.dim(), (64, 64));
//! # Ok::<(), segmentation::SegmentationError>(())
//! ```

pub mod boost;
pub mod classify;
pub mod features;
pub mod request;
pub mod split;
pub mod suppress;
pub mod superpixels;

pub use classify::{ClassifierConfig, SparseLabels, fit_and_predict};
pub use features::{FeatureOptions, build_features};
pub use request::{ModelOptions, PredictRequest};
pub use suppress::suppress_isolated;

use thiserror::Error;

/// Result type for segmentation operations
pub type Result<T> = std::result::Result<T, SegmentationError>;

/// Errors raised while building features or fitting the classifier.
///
/// All of these abort only the current prediction request; previous mask
/// state is untouched.
#[derive(Error, Debug)]
pub enum SegmentationError {
    #[error("Need at least 2 labelled classes for a stratified split, got {distinct}")]
    InsufficientLabels { distinct: usize },

    #[error("Pixel index {index} is out of range for {rows} feature rows")]
    ShapeMismatch { index: usize, rows: usize },

    #[error("Pixel index {0} was labelled more than once")]
    DuplicateIndex(usize),

    #[error("Got {pixels} pixel indices but {labels} labels")]
    LabelArity { pixels: usize, labels: usize },

    #[error("Feature matrix has {got} rows but the mask area holds {expected} pixels")]
    FeatureShape { expected: usize, got: usize },

    #[error("Raster has no bands")]
    EmptyRaster,

    #[error("Mask area exceeds raster bounds of {height}x{width}")]
    AreaOutOfBounds { height: usize, width: usize },

    #[error("Malformed predict request: {0}")]
    Request(#[from] serde_json::Error),
}
