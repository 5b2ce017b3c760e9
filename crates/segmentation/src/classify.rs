use ndarray::Array2;
use tilemark_common::MaskArea;
use tracing::{debug, info};

use crate::{
    Result, SegmentationError,
    boost::{BoostConfig, GradientBoostedTrees},
    split::{SPLIT_SEED, stratified_split},
    suppress::suppress_isolated,
};

/// The user's manual annotations: parallel pixel indices (row-major
/// offsets into the masking area) and class ids.
#[derive(Debug, Clone)]
pub struct SparseLabels {
    pub pixel_indices: Vec<usize>,
    pub labels: Vec<u8>,
}

impl SparseLabels {
    pub fn new(pixel_indices: Vec<usize>, labels: Vec<u8>) -> Result<Self> {
        if pixel_indices.len() != labels.len() {
            return Err(SegmentationError::LabelArity {
                pixels: pixel_indices.len(),
                labels: labels.len(),
            });
        }
        Ok(Self {
            pixel_indices,
            labels,
        })
    }

    /// Validate against a feature matrix with `rows` rows: indices unique
    /// and in range, at least two distinct classes present.
    fn validate(&self, rows: usize) -> Result<Vec<u8>> {
        let mut seen = std::collections::HashSet::new();
        for &index in &self.pixel_indices {
            if index >= rows {
                return Err(SegmentationError::ShapeMismatch { index, rows });
            }
            if !seen.insert(index) {
                return Err(SegmentationError::DuplicateIndex(index));
            }
        }

        let mut distinct: Vec<u8> = self.labels.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() < 2 {
            return Err(SegmentationError::InsufficientLabels {
                distinct: distinct.len(),
            });
        }
        Ok(distinct)
    }
}

/// Hyperparameters for one interactive fit, combining the booster
/// configuration with the split and suppression settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub n_leaves: usize,
    pub max_depth: usize,
    pub n_estimators: usize,
    pub learning_rate: f32,
    pub max_bins: usize,
    pub early_stopping_rounds: usize,
    pub validation_fraction: f32,
    pub suppression_filter_size: usize,
    /// Percentage threshold (0-100); 0 disables suppression
    pub suppression_threshold: u8,
    pub suppression_default_class: u8,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            n_leaves: 31,
            max_depth: 10,
            n_estimators: 100,
            learning_rate: 0.05,
            max_bins: 128,
            early_stopping_rounds: 4,
            validation_fraction: 0.2,
            suppression_filter_size: 5,
            suppression_threshold: 0,
            suppression_default_class: 0,
        }
    }
}

impl ClassifierConfig {
    fn boost_config(&self) -> BoostConfig {
        BoostConfig {
            n_estimators: self.n_estimators,
            learning_rate: self.learning_rate,
            max_depth: self.max_depth,
            max_leaves: self.n_leaves,
            max_bins: self.max_bins,
            early_stopping_rounds: self.early_stopping_rounds,
        }
    }
}

/// Train a boosted ensemble on the sparse labels and predict a class id
/// for every pixel of the masking area.
///
/// The model lives only for this call; every request retrains from
/// scratch (a deliberate simplicity/latency tradeoff that rules out
/// stale-model bugs).
pub fn fit_and_predict(
    features: &Array2<f32>,
    sparse_labels: &SparseLabels,
    config: &ClassifierConfig,
    area: &MaskArea,
) -> Result<Array2<u8>> {
    let (rows, _) = features.dim();
    if rows != area.len() {
        return Err(SegmentationError::FeatureShape {
            expected: area.len(),
            got: rows,
        });
    }

    let class_ids = sparse_labels.validate(rows)?;

    // Dense internal class indices for the booster
    let dense_of = |label: u8| -> usize {
        class_ids
            .binary_search(&label)
            .expect("labels validated against the class list")
    };
    let classes: Vec<usize> = sparse_labels.labels.iter().map(|&id| dense_of(id)).collect();

    let split = stratified_split(
        &sparse_labels.pixel_indices,
        &classes,
        config.validation_fraction,
        SPLIT_SEED,
    );
    debug!(
        train = split.train_rows.len(),
        validation = split.val_rows.len(),
        classes = class_ids.len(),
        "stratified split"
    );

    let model = GradientBoostedTrees::fit(features, &split, class_ids.len(), &config.boost_config());
    info!(
        rounds = model.best_rounds(),
        pixels = rows,
        "fitted interactive classifier"
    );

    let predictions = model.predict(features);
    let mut grid = Array2::zeros((area.height(), area.width()));
    for (pixel, &dense) in predictions.iter().enumerate() {
        let (row, col) = area.unflatten_index(pixel);
        grid[[row, col]] = class_ids[dense];
    }

    Ok(suppress_isolated(
        &grid,
        config.suppression_filter_size,
        config.suppression_threshold,
        config.suppression_default_class,
    ))
}
