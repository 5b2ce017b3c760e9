//! Majority-vote merge of per-user masks and agreement scoring.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tilemark_common::{ScoreMetric, SegmentationConfig};
use tracing::info;

use crate::store::Contribution;

/// One annotator's agreement with the consensus.
///
/// `score` is the configured metric times 100, rounded to the nearest
/// integer. `unverified` flags images with fewer than three annotators,
/// where the consensus itself is weak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementScore {
    pub user: String,
    pub score: u8,
    pub unverified: bool,
}

/// The result of merging every contribution for one image
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub merged: Array2<u8>,
    pub scores: Vec<AgreementScore>,
    /// Fraction of all votes cast for the winning class, over all pixels
    pub agreement: f32,
}

/// Merge the contributions for one image by per-pixel majority vote.
///
/// - No contributions: `None`.
/// - One contribution: that mask verbatim, no scores, agreement 1.0.
/// - Two contributions: each annotator is scored against the other's mask,
///   since a 2-way merge is just the tie-break and scoring against it
///   would flatter whoever holds the lower class ids.
/// - Three or more: scored against the merged mask.
///
/// Ties go to the lowest class id, which makes repeated merges of the same
/// contributions byte-identical.
pub fn merge(contributions: &[Contribution], config: &SegmentationConfig) -> Option<MergeOutcome> {
    let first = contributions.first()?;
    let (height, width) = first.labels.dim();

    if contributions.len() == 1 {
        return Some(MergeOutcome {
            merged: first.labels.clone(),
            scores: Vec::new(),
            agreement: 1.0,
        });
    }

    // Vote over the sorted unique classes present across all masks
    let mut present: Vec<u8> = contributions
        .iter()
        .flat_map(|c| c.labels.iter().copied())
        .collect();
    present.sort_unstable();
    present.dedup();

    let mut merged = Array2::zeros((height, width));
    let mut winning_votes = 0usize;
    let mut votes = vec![0usize; present.len()];

    for row in 0..height {
        for col in 0..width {
            votes.fill(0);
            for contribution in contributions {
                let id = contribution.labels[[row, col]];
                let slot = present
                    .binary_search(&id)
                    .unwrap_or_else(|_| unreachable!("id collected from these masks"));
                votes[slot] += 1;
            }
            // First maximum wins, so ties resolve to the lowest class id
            let mut winner = 0;
            for (slot, &count) in votes.iter().enumerate() {
                if count > votes[winner] {
                    winner = slot;
                }
            }
            merged[[row, col]] = present[winner];
            winning_votes += votes[winner];
        }
    }

    let total_votes = height * width * contributions.len();
    let agreement = winning_votes as f32 / total_votes as f32;

    let unverified = contributions.len() < 3;
    let scores = contributions
        .iter()
        .enumerate()
        .map(|(position, contribution)| {
            // With exactly two annotators the peer's mask is the reference
            let reference = if contributions.len() == 2 {
                &contributions[1 - position].labels
            } else {
                &merged
            };
            AgreementScore {
                user: contribution.user.clone(),
                score: score_percent(&contribution.labels, reference, config.score),
                unverified,
            }
        })
        .collect();

    info!(
        annotators = contributions.len(),
        agreement, unverified, "merged contributions"
    );
    Some(MergeOutcome {
        merged,
        scores,
        agreement,
    })
}

/// Score `labels` against `reference` with the given metric, as a rounded
/// 0-100 percentage
fn score_percent(labels: &Array2<u8>, reference: &Array2<u8>, metric: ScoreMetric) -> u8 {
    let fraction = match metric {
        ScoreMetric::Accuracy => accuracy(labels, reference),
        ScoreMetric::F1 => macro_average(labels, reference, f1_class),
        ScoreMetric::Jaccard => macro_average(labels, reference, jaccard_class),
    };
    (fraction * 100.0).round() as u8
}

fn accuracy(labels: &Array2<u8>, reference: &Array2<u8>) -> f64 {
    let matches = labels
        .iter()
        .zip(reference.iter())
        .filter(|(a, b)| a == b)
        .count();
    matches as f64 / labels.len() as f64
}

/// Per-class true positives, false positives, false negatives
struct ClassCounts {
    tp: usize,
    fp: usize,
    fn_: usize,
}

fn f1_class(counts: &ClassCounts) -> f64 {
    let denominator = 2 * counts.tp + counts.fp + counts.fn_;
    if denominator == 0 {
        0.0
    } else {
        2.0 * counts.tp as f64 / denominator as f64
    }
}

fn jaccard_class(counts: &ClassCounts) -> f64 {
    let denominator = counts.tp + counts.fp + counts.fn_;
    if denominator == 0 {
        0.0
    } else {
        counts.tp as f64 / denominator as f64
    }
}

/// Macro average of a per-class metric over the classes present in either
/// grid
fn macro_average(
    labels: &Array2<u8>,
    reference: &Array2<u8>,
    class_metric: fn(&ClassCounts) -> f64,
) -> f64 {
    let mut present: Vec<u8> = labels.iter().chain(reference.iter()).copied().collect();
    present.sort_unstable();
    present.dedup();

    let total: f64 = present
        .iter()
        .map(|&class| {
            let mut counts = ClassCounts { tp: 0, fp: 0, fn_: 0 };
            for (&a, &b) in labels.iter().zip(reference.iter()) {
                match (a == class, b == class) {
                    (true, true) => counts.tp += 1,
                    (true, false) => counts.fp += 1,
                    (false, true) => counts.fn_ += 1,
                    (false, false) => {}
                }
            }
            class_metric(&counts)
        })
        .sum();
    total / present.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tilemark_common::{ClassDef, MaskArea, MaskEncoding, MaskFormat};

    fn config(metric: ScoreMetric) -> SegmentationConfig {
        SegmentationConfig {
            mask_area: MaskArea::new(0, 0, 2, 2).unwrap(),
            classes: vec![
                ClassDef::new(0, "Clear", [255, 255, 255, 0]),
                ClassDef::new(1, "Cloud", [255, 255, 0, 70]),
                ClassDef::new(2, "Shadow", [45, 45, 45, 70]),
                ClassDef::new(3, "Water", [0, 0, 255, 70]),
                ClassDef::new(4, "Snow", [0, 255, 255, 70]),
            ],
            score: metric,
            mask_encoding: MaskEncoding::Binary,
            mask_format: MaskFormat::Msk,
            suppression_filter_size: 5,
            suppression_threshold: 0,
            suppression_default_class: 0,
        }
    }

    fn contribution(user: &str, labels: Array2<u8>) -> Contribution {
        let provenance = labels.mapv(|_| false);
        Contribution {
            user: user.to_owned(),
            labels,
            provenance,
        }
    }

    #[test]
    fn test_no_contributions_is_none() {
        assert!(merge(&[], &config(ScoreMetric::Accuracy)).is_none());
    }

    #[test]
    fn test_single_contribution_passes_through() {
        let labels = array![[0u8, 1], [2, 1]];
        let outcome = merge(
            &[contribution("alice", labels.clone())],
            &config(ScoreMetric::Accuracy),
        )
        .unwrap();
        assert_eq!(outcome.merged, labels);
        assert!(outcome.scores.is_empty());
        assert_eq!(outcome.agreement, 1.0);
    }

    #[test]
    fn test_three_identical_masks_score_100_under_all_metrics() {
        let labels = array![[0u8, 1], [2, 1]];
        let contributions = vec![
            contribution("alice", labels.clone()),
            contribution("bob", labels.clone()),
            contribution("carol", labels.clone()),
        ];

        for metric in [ScoreMetric::Accuracy, ScoreMetric::F1, ScoreMetric::Jaccard] {
            let outcome = merge(&contributions, &config(metric)).unwrap();
            assert_eq!(outcome.merged, labels);
            assert_eq!(outcome.agreement, 1.0);
            assert_eq!(outcome.scores.len(), 3);
            for score in &outcome.scores {
                assert_eq!(score.score, 100);
                assert!(!score.unverified);
            }
        }
    }

    #[test]
    fn test_two_masks_scored_against_each_other() {
        // 16 pixels, differing at exactly one
        let mut a = Array2::zeros((4, 4));
        let mut b = Array2::zeros((4, 4));
        a[[0, 0]] = 1u8;
        b[[0, 0]] = 1u8;
        a[[3, 3]] = 2u8;

        let contributions = vec![contribution("alice", a), contribution("bob", b)];
        let outcome = merge(&contributions, &config(ScoreMetric::Accuracy)).unwrap();

        // Accuracy is symmetric: both lose the same single pixel
        assert_eq!(outcome.scores[0].score, outcome.scores[1].score);
        assert_eq!(outcome.scores[0].score, 94); // 15/16
        assert!(outcome.scores.iter().all(|s| s.unverified));
    }

    #[test]
    fn test_tie_breaks_to_lowest_class_id() {
        // Votes at the single pixel: class 1 x2, class 2 x2, class 3 x1,
        // class 4 x1
        let pixel_labels = [1u8, 1, 2, 2, 3, 4];
        let contributions: Vec<Contribution> = pixel_labels
            .iter()
            .enumerate()
            .map(|(i, &id)| contribution(&format!("user_{i}"), array![[id]]))
            .collect();

        let first = merge(&contributions, &config(ScoreMetric::Accuracy)).unwrap();
        let second = merge(&contributions, &config(ScoreMetric::Accuracy)).unwrap();
        assert_eq!(first.merged[[0, 0]], 1);
        assert_eq!(first.merged, second.merged);
        assert_eq!(first.scores, second.scores);
    }

    #[test]
    fn test_majority_wins() {
        let contributions = vec![
            contribution("alice", array![[2u8, 0]]),
            contribution("bob", array![[2u8, 1]]),
            contribution("carol", array![[0u8, 1]]),
        ];
        let outcome = merge(&contributions, &config(ScoreMetric::Accuracy)).unwrap();
        assert_eq!(outcome.merged, array![[2u8, 1]]);
        // 2 winning votes out of 3 at each of the 2 pixels
        assert!((outcome.agreement - 2.0 / 3.0).abs() < 1e-6);
        assert!(outcome.scores.iter().all(|s| !s.unverified));
    }

    #[test]
    fn test_macro_f1_penalises_missing_class() {
        // Reference has class 2 where the annotator put class 0
        let labels = array![[0u8, 0], [1, 1]];
        let reference = array![[0u8, 2], [1, 1]];
        let contributions = vec![
            contribution("alice", labels),
            contribution("bob", reference.clone()),
            contribution("carol", reference),
        ];

        let outcome = merge(&contributions, &config(ScoreMetric::F1)).unwrap();
        // Alice misses class 2 entirely: f1 = (2/3 + 1 + 0) / 3
        assert_eq!(outcome.scores[0].score, 56);
        assert_eq!(outcome.scores[1].score, 100);
    }
}
