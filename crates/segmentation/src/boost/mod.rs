//! Gradient-boosted multi-class tree ensemble.
//!
//! One regression tree per class per round, fitted to softmax gradients.
//! Validation log-loss drives early stopping: once the loss fails to
//! improve for `early_stopping_rounds` consecutive rounds, training stops
//! and prediction uses the best-scoring round, not the last one.
//!
//! The classifier treats this module as an opaque capability: "train an
//! ensemble-tree classifier on (features, label) pairs and predict
//! per-pixel class ids".

mod tree;

use ndarray::Array2;
use tracing::debug;

use crate::split::StratifiedSplit;
use tree::Tree;

/// Hyperparameters of the boosted ensemble
#[derive(Debug, Clone, PartialEq)]
pub struct BoostConfig {
    /// Maximum number of boosting rounds
    pub n_estimators: usize,
    pub learning_rate: f32,
    pub max_depth: usize,
    /// Maximum leaves per tree
    pub max_leaves: usize,
    /// Maximum histogram bins when scanning numeric thresholds
    pub max_bins: usize,
    /// Stop once validation loss fails to improve for this many rounds
    pub early_stopping_rounds: usize,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.05,
            max_depth: 10,
            max_leaves: 31,
            max_bins: 128,
            early_stopping_rounds: 4,
        }
    }
}

/// A fitted multi-class ensemble
#[derive(Debug)]
pub struct GradientBoostedTrees {
    num_classes: usize,
    learning_rate: f32,
    /// `rounds[t][k]` is round `t`'s tree for class `k`
    rounds: Vec<Vec<Tree>>,
    /// Number of rounds the best validation score selected
    best_rounds: usize,
}

impl GradientBoostedTrees {
    /// Train on the stratified split's training subset, scoring each round
    /// against its validation subset.
    ///
    /// With an empty validation subset (tiny label sets) early stopping is
    /// skipped and all rounds are kept.
    pub fn fit(
        features: &Array2<f32>,
        split: &StratifiedSplit,
        num_classes: usize,
        config: &BoostConfig,
    ) -> Self {
        let train_count = split.train_rows.len();
        let val_count = split.val_rows.len();

        let mut train_scores = Array2::<f32>::zeros((train_count, num_classes));
        let mut val_scores = Array2::<f32>::zeros((val_count, num_classes));

        let mut rounds: Vec<Vec<Tree>> = Vec::with_capacity(config.n_estimators);
        let mut best_loss = f32::INFINITY;
        let mut best_rounds = 0;
        let mut stale = 0;

        for round in 0..config.n_estimators {
            let probabilities = softmax_rows(&train_scores);

            let mut class_trees = Vec::with_capacity(num_classes);
            for class in 0..num_classes {
                let mut gradients = Vec::with_capacity(train_count);
                let mut hessians = Vec::with_capacity(train_count);
                for (local, &sample_class) in split.train_classes.iter().enumerate() {
                    let p = probabilities[[local, class]];
                    let target = f32::from(sample_class == class);
                    gradients.push(target - p);
                    hessians.push((p * (1.0 - p)).max(1e-6));
                }

                let tree = Tree::fit(features, &split.train_rows, &gradients, &hessians, config);

                for (local, &row) in split.train_rows.iter().enumerate() {
                    train_scores[[local, class]] +=
                        config.learning_rate * tree.predict_row(features, row);
                }
                for (local, &row) in split.val_rows.iter().enumerate() {
                    val_scores[[local, class]] +=
                        config.learning_rate * tree.predict_row(features, row);
                }
                class_trees.push(tree);
            }
            rounds.push(class_trees);

            if val_count == 0 {
                best_rounds = round + 1;
                continue;
            }

            let loss = log_loss(&val_scores, &split.val_classes);
            if loss + 1e-7 < best_loss {
                best_loss = loss;
                best_rounds = round + 1;
                stale = 0;
            } else {
                stale += 1;
                if stale >= config.early_stopping_rounds {
                    debug!(round, best_rounds, best_loss, "early stopping");
                    break;
                }
            }
        }

        Self {
            num_classes,
            learning_rate: config.learning_rate,
            rounds,
            best_rounds,
        }
    }

    /// Number of rounds used at prediction time
    pub fn best_rounds(&self) -> usize {
        self.best_rounds
    }

    /// Predict a dense class index for every row of the feature matrix,
    /// using only the best-scoring rounds.
    pub fn predict(&self, features: &Array2<f32>) -> Vec<usize> {
        let row_count = features.dim().0;
        let mut predictions = Vec::with_capacity(row_count);
        let mut scores = vec![0.0f32; self.num_classes];

        for row in 0..row_count {
            scores.fill(0.0);
            for class_trees in self.rounds.iter().take(self.best_rounds) {
                for (class, tree) in class_trees.iter().enumerate() {
                    scores[class] += self.learning_rate * tree.predict_row(features, row);
                }
            }
            // First maximum wins so tied scores resolve to the lowest class
            let mut winner = 0;
            for (class, &score) in scores.iter().enumerate() {
                if score > scores[winner] {
                    winner = class;
                }
            }
            predictions.push(winner);
        }
        predictions
    }
}

fn softmax_rows(scores: &Array2<f32>) -> Array2<f32> {
    let (rows, classes) = scores.dim();
    let mut out = Array2::zeros((rows, classes));
    for row in 0..rows {
        let max = (0..classes)
            .map(|class| scores[[row, class]])
            .fold(f32::NEG_INFINITY, f32::max);
        let mut total = 0.0;
        for class in 0..classes {
            let value = (scores[[row, class]] - max).exp();
            out[[row, class]] = value;
            total += value;
        }
        for class in 0..classes {
            out[[row, class]] /= total;
        }
    }
    out
}

fn log_loss(scores: &Array2<f32>, classes: &[usize]) -> f32 {
    let probabilities = softmax_rows(scores);
    let total: f32 = classes
        .iter()
        .enumerate()
        .map(|(local, &class)| -(probabilities[[local, class]].max(1e-9)).ln())
        .sum();
    total / classes.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::{SPLIT_SEED, StratifiedSplit, stratified_split};

    /// Two well-separated clusters along one feature
    fn separable_problem() -> (Array2<f32>, Vec<usize>, Vec<usize>) {
        let mut values = Vec::new();
        let mut rows = Vec::new();
        let mut classes = Vec::new();
        for i in 0..20 {
            let class = usize::from(i >= 10);
            values.push(if class == 0 { i as f32 * 0.1 } else { 10.0 + i as f32 * 0.1 });
            rows.push(i);
            classes.push(class);
        }
        let features =
            Array2::from_shape_vec((20, 1), values).expect("shape matches value count");
        (features, rows, classes)
    }

    #[test]
    fn test_learns_separable_labels() {
        let (features, rows, classes) = separable_problem();
        let split = stratified_split(&rows, &classes, 0.2, SPLIT_SEED);

        let model = GradientBoostedTrees::fit(&features, &split, 2, &BoostConfig::default());
        let predictions = model.predict(&features);

        for (row, &class) in rows.iter().zip(&classes) {
            assert_eq!(predictions[*row], class, "row {row} misclassified");
        }
    }

    #[test]
    fn test_early_stopping_bounds_rounds() {
        let (features, rows, classes) = separable_problem();
        let split = stratified_split(&rows, &classes, 0.2, SPLIT_SEED);

        let config = BoostConfig {
            n_estimators: 200,
            early_stopping_rounds: 3,
            ..Default::default()
        };
        let model = GradientBoostedTrees::fit(&features, &split, 2, &config);
        // A separable stump problem plateaus long before 200 rounds
        assert!(model.best_rounds() < 200);
        assert!(model.best_rounds() >= 1);
    }

    #[test]
    fn test_empty_validation_keeps_all_rounds() {
        let features = Array2::from_shape_vec((4, 1), vec![0.0, 0.1, 5.0, 5.1])
            .expect("shape matches value count");
        let split = StratifiedSplit {
            train_rows: vec![0, 1, 2, 3],
            train_classes: vec![0, 0, 1, 1],
            val_rows: vec![],
            val_classes: vec![],
        };
        let config = BoostConfig {
            n_estimators: 5,
            ..Default::default()
        };
        let model = GradientBoostedTrees::fit(&features, &split, 2, &config);
        assert_eq!(model.best_rounds(), 5);
    }

    #[test]
    fn test_prediction_is_deterministic() {
        let (features, rows, classes) = separable_problem();
        let split = stratified_split(&rows, &classes, 0.2, SPLIT_SEED);

        let first = GradientBoostedTrees::fit(&features, &split, 2, &BoostConfig::default())
            .predict(&features);
        let second = GradientBoostedTrees::fit(&features, &split, 2, &BoostConfig::default())
            .predict(&features);
        assert_eq!(first, second);
    }
}
