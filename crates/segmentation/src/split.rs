use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Fixed seed for the stratified split; predictions must be reproducible
/// for a given request.
pub const SPLIT_SEED: u64 = 42;

/// A stratified train/validation partition of sparse labels.
///
/// Rows index the feature matrix; classes are the dense internal class
/// indices `0..num_classes`.
#[derive(Debug, Clone)]
pub struct StratifiedSplit {
    pub train_rows: Vec<usize>,
    pub train_classes: Vec<usize>,
    pub val_rows: Vec<usize>,
    pub val_classes: Vec<usize>,
}

/// Split `(rows, classes)` pairs so that every class is represented
/// proportionally in validation.
///
/// Deterministic for a fixed seed. Every class keeps at least one training
/// sample; classes with a single sample stay entirely in training, so the
/// validation side may be empty for very small label sets.
pub fn stratified_split(
    rows: &[usize],
    classes: &[usize],
    val_fraction: f32,
    seed: u64,
) -> StratifiedSplit {
    let num_classes = classes.iter().copied().max().map_or(0, |max| max + 1);
    let mut per_class: Vec<Vec<usize>> = vec![Vec::new(); num_classes];
    for (&row, &class) in rows.iter().zip(classes) {
        per_class[class].push(row);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut split = StratifiedSplit {
        train_rows: Vec::new(),
        train_classes: Vec::new(),
        val_rows: Vec::new(),
        val_classes: Vec::new(),
    };

    for (class, members) in per_class.iter_mut().enumerate() {
        if members.is_empty() {
            continue;
        }
        members.shuffle(&mut rng);

        let count = members.len();
        // Proportional share, capped so at least one sample stays in training
        let val_count = ((count as f32 * val_fraction).round() as usize).min(count - 1);

        for (position, &row) in members.iter().enumerate() {
            if position < val_count {
                split.val_rows.push(row);
                split.val_classes.push(class);
            } else {
                split.train_rows.push(row);
                split.train_classes.push(class);
            }
        }
    }

    split
}
