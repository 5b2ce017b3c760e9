use ndarray::Array2;
use tracing::debug;

/// Isolated-pixel suppression filter.
///
/// For every pixel, the fraction of its `filter_size` x `filter_size`
/// neighbourhood (self excluded) whose predicted class differs from the
/// default class is expressed as a 0-100 percentage; where that
/// percentage falls below `threshold` the pixel is forced to the default
/// class. Out-of-bounds neighbourhood cells count as a neutral 0.5.
///
/// This assumes minority detections are noise: it only makes sense when
/// the default class is the dominant background class. A threshold of 0
/// disables the pass entirely.
pub fn suppress_isolated(
    labels: &Array2<u8>,
    filter_size: usize,
    threshold: u8,
    default_class: u8,
) -> Array2<u8> {
    if threshold == 0 || filter_size < 2 {
        return labels.clone();
    }

    let (height, width) = labels.dim();
    let radius = (filter_size / 2) as isize;
    let neighbours = (filter_size * filter_size - 1) as f32;
    let mut out = labels.clone();
    let mut suppressed = 0usize;

    for row in 0..height {
        for col in 0..width {
            let mut differing = 0.0f32;
            for dr in -radius..=radius {
                for dc in -radius..=radius {
                    if dr == 0 && dc == 0 {
                        continue;
                    }
                    let r = row as isize + dr;
                    let c = col as isize + dc;
                    if r < 0 || c < 0 || r >= height as isize || c >= width as isize {
                        differing += 0.5;
                    } else if labels[[r as usize, c as usize]] != default_class {
                        differing += 1.0;
                    }
                }
            }

            let percent = 100.0 * differing / neighbours;
            if percent < threshold as f32 {
                if labels[[row, col]] != default_class {
                    suppressed += 1;
                }
                out[[row, col]] = default_class;
            }
        }
    }

    if suppressed > 0 {
        debug!(suppressed, filter_size, threshold, "suppression filter");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_isolated_pixel_forced_to_default() {
        let mut labels = Array2::zeros((9, 9));
        labels[[4, 4]] = 2u8;

        let filtered = suppress_isolated(&labels, 3, 20, 0);
        assert_eq!(filtered[[4, 4]], 0);
        assert!(filtered.iter().all(|&id| id == 0));
    }

    #[test]
    fn test_threshold_zero_is_identity() {
        let mut labels = Array2::zeros((9, 9));
        labels[[4, 4]] = 2u8;

        let filtered = suppress_isolated(&labels, 3, 0, 0);
        assert_eq!(filtered, labels);
    }

    #[test]
    fn test_coherent_region_survives() {
        let mut labels = Array2::zeros((12, 12));
        for row in 3..9 {
            for col in 3..9 {
                labels[[row, col]] = 1u8;
            }
        }

        let filtered = suppress_isolated(&labels, 3, 20, 0);
        // Interior of the block is surrounded by its own class and stays
        assert_eq!(filtered[[5, 5]], 1);
        assert_eq!(filtered[[0, 0]], 0);
    }

    #[test]
    fn test_out_of_bounds_counts_half() {
        // A lone non-default pixel in a corner: 3 in-bounds neighbours all
        // default (0.0) + 5 out-of-bounds (2.5) = 31.25% differing
        let mut labels = Array2::zeros((5, 5));
        labels[[0, 0]] = 1u8;

        let kept = suppress_isolated(&labels, 3, 30, 0);
        assert_eq!(kept[[0, 0]], 1);

        let forced = suppress_isolated(&labels, 3, 40, 0);
        assert_eq!(forced[[0, 0]], 0);
    }
}
