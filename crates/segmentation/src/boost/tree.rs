//! Regression trees fitted to boosting gradients.
//!
//! Trees grow best-first: the split with the highest gain anywhere in the
//! frontier is applied next, so `max_leaves` caps model complexity
//! independently of `max_depth`. Candidate thresholds come from up to
//! `max_bins` quantile cuts per feature.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::Array2;

use super::BoostConfig;

/// L2 regularisation on leaf weights
const LAMBDA: f32 = 1.0;

const NO_CHILD: usize = usize::MAX;

#[derive(Debug, Clone)]
struct Node {
    feature: usize,
    threshold: f32,
    left: usize,
    right: usize,
    value: f32,
}

impl Node {
    fn leaf(value: f32) -> Self {
        Self {
            feature: 0,
            threshold: 0.0,
            left: NO_CHILD,
            right: NO_CHILD,
            value,
        }
    }

    fn is_leaf(&self) -> bool {
        self.left == NO_CHILD
    }
}

/// One regression tree of the ensemble
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
}

struct Candidate {
    gain: f32,
    node: usize,
    depth: usize,
    feature: usize,
    threshold: f32,
    left_rows: Vec<usize>,
    right_rows: Vec<usize>,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.gain == other.gain
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.gain.total_cmp(&other.gain)
    }
}

impl Tree {
    /// Fit a tree to `(gradient, hessian)` targets over the given feature
    /// rows. `rows` are global feature-matrix rows; `gradients` and
    /// `hessians` are parallel to them.
    pub fn fit(
        features: &Array2<f32>,
        rows: &[usize],
        gradients: &[f32],
        hessians: &[f32],
        config: &BoostConfig,
    ) -> Self {
        let locals: Vec<usize> = (0..rows.len()).collect();
        let mut nodes = vec![Node::leaf(leaf_value(&locals, gradients, hessians))];
        let mut frontier = BinaryHeap::new();

        if let Some(candidate) = best_split(features, rows, gradients, hessians, &locals, 0, 0, config)
        {
            frontier.push(candidate);
        }

        let mut leaves = 1;
        while leaves < config.max_leaves {
            let Some(candidate) = frontier.pop() else {
                break;
            };

            let left = nodes.len();
            nodes.push(Node::leaf(leaf_value(&candidate.left_rows, gradients, hessians)));
            let right = nodes.len();
            nodes.push(Node::leaf(leaf_value(&candidate.right_rows, gradients, hessians)));

            let parent = &mut nodes[candidate.node];
            parent.feature = candidate.feature;
            parent.threshold = candidate.threshold;
            parent.left = left;
            parent.right = right;
            leaves += 1;

            let child_depth = candidate.depth + 1;
            if child_depth < config.max_depth {
                if let Some(next) = best_split(
                    features,
                    rows,
                    gradients,
                    hessians,
                    &candidate.left_rows,
                    left,
                    child_depth,
                    config,
                ) {
                    frontier.push(next);
                }
                if let Some(next) = best_split(
                    features,
                    rows,
                    gradients,
                    hessians,
                    &candidate.right_rows,
                    right,
                    child_depth,
                    config,
                ) {
                    frontier.push(next);
                }
            }
        }

        Self { nodes }
    }

    /// Predicted value for one feature-matrix row
    pub fn predict_row(&self, features: &Array2<f32>, row: usize) -> f32 {
        let mut index = 0;
        loop {
            let node = &self.nodes[index];
            if node.is_leaf() {
                return node.value;
            }
            index = if features[[row, node.feature]] <= node.threshold {
                node.left
            } else {
                node.right
            };
        }
    }
}

/// Newton-step leaf weight over the local sample set
fn leaf_value(locals: &[usize], gradients: &[f32], hessians: &[f32]) -> f32 {
    let sum_g: f32 = locals.iter().map(|&i| gradients[i]).sum();
    let sum_h: f32 = locals.iter().map(|&i| hessians[i]).sum();
    sum_g / (sum_h + LAMBDA)
}

#[allow(clippy::too_many_arguments)]
fn best_split(
    features: &Array2<f32>,
    rows: &[usize],
    gradients: &[f32],
    hessians: &[f32],
    locals: &[usize],
    node: usize,
    depth: usize,
    config: &BoostConfig,
) -> Option<Candidate> {
    if locals.len() < 2 {
        return None;
    }

    let total_g: f32 = locals.iter().map(|&i| gradients[i]).sum();
    let total_h: f32 = locals.iter().map(|&i| hessians[i]).sum();
    let parent_score = total_g * total_g / (total_h + LAMBDA);

    let num_features = features.dim().1;
    let mut best: Option<Candidate> = None;

    let mut order: Vec<(f32, usize)> = Vec::with_capacity(locals.len());
    for feature in 0..num_features {
        order.clear();
        order.extend(locals.iter().map(|&i| (features[[rows[i], feature]], i)));
        order.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Quantile cut positions, at most max_bins of them
        let step = (order.len() / config.max_bins).max(1);

        let mut left_g = 0.0;
        let mut left_h = 0.0;
        for (position, &(value, local)) in order.iter().enumerate() {
            left_g += gradients[local];
            left_h += hessians[local];

            let last = position + 1 == order.len();
            if last || (position + 1) % step != 0 {
                continue;
            }
            let next_value = order[position + 1].0;
            if next_value <= value {
                // No separating threshold between equal feature values
                continue;
            }

            let right_g = total_g - left_g;
            let right_h = total_h - left_h;
            let gain = left_g * left_g / (left_h + LAMBDA)
                + right_g * right_g / (right_h + LAMBDA)
                - parent_score;

            if gain > 1e-6 && best.as_ref().is_none_or(|b| gain > b.gain) {
                let threshold = (value + next_value) / 2.0;
                let (left_rows, right_rows) = order
                    .iter()
                    .partition::<Vec<_>, _>(|&&(sample, _)| sample <= threshold);
                best = Some(Candidate {
                    gain,
                    node,
                    depth,
                    feature,
                    threshold,
                    left_rows: left_rows.into_iter().map(|&(_, local)| local).collect(),
                    right_rows: right_rows.into_iter().map(|&(_, local)| local).collect(),
                });
            }
        }
    }

    best
}
