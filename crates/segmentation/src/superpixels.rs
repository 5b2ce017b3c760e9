//! Felzenszwalb-style graph segmentation used as a weak
//! spatial-coherence prior in the feature builder.
//!
//! Pixels are nodes, 8-connected neighbours are edges weighted by the
//! Euclidean band distance after a light Gaussian smoothing. Edges are
//! processed in increasing weight order; two components merge when the
//! connecting weight does not exceed either component's internal
//! difference plus `scale / |component|`. A final pass merges components
//! below the minimum region size.

use ndarray::{Array2, Array3};
use tracing::debug;

/// Fixed pre-smoothing sigma
pub const DEFAULT_SIGMA: f32 = 0.8;

/// Segmentation scale proportional to the window's pixel count
pub fn scale_for(pixels: usize) -> f32 {
    (pixels as f32 / 500.0).max(1.0)
}

/// Minimum region size proportional to the window's pixel count
pub fn min_size_for(pixels: usize) -> usize {
    (pixels / 200).max(1)
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
    size: Vec<usize>,
    /// Largest edge weight inside each component so far
    internal: Vec<f32>,
}

impl DisjointSet {
    fn new(nodes: usize) -> Self {
        Self {
            parent: (0..nodes).collect(),
            rank: vec![0; nodes],
            size: vec![1; nodes],
            internal: vec![0.0; nodes],
        }
    }

    fn find(&mut self, node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = node;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize, weight: f32) -> usize {
        let (a, b) = if self.rank[a] < self.rank[b] { (b, a) } else { (a, b) };
        if self.rank[a] == self.rank[b] {
            self.rank[a] += 1;
        }
        self.parent[b] = a;
        self.size[a] += self.size[b];
        self.internal[a] = self.internal[a].max(self.internal[b]).max(weight);
        a
    }
}

/// Segment the window into superpixel regions; returns consecutive region
/// ids per pixel.
pub fn felzenszwalb(samples: &Array3<f32>, scale: f32, sigma: f32, min_size: usize) -> Array2<u32> {
    let (height, width, bands) = samples.dim();
    let smoothed = gaussian_smooth(samples, sigma);

    let node = |row: usize, col: usize| row * width + col;
    let distance = |a: (usize, usize), b: (usize, usize)| -> f32 {
        (0..bands)
            .map(|band| {
                let delta = smoothed[[a.0, a.1, band]] - smoothed[[b.0, b.1, band]];
                delta * delta
            })
            .sum::<f32>()
            .sqrt()
    };

    // 8-connectivity, each undirected edge once
    let mut edges: Vec<(f32, usize, usize)> = Vec::with_capacity(4 * height * width);
    for row in 0..height {
        for col in 0..width {
            if col + 1 < width {
                edges.push((distance((row, col), (row, col + 1)), node(row, col), node(row, col + 1)));
            }
            if row + 1 < height {
                edges.push((distance((row, col), (row + 1, col)), node(row, col), node(row + 1, col)));
                if col + 1 < width {
                    edges.push((
                        distance((row, col), (row + 1, col + 1)),
                        node(row, col),
                        node(row + 1, col + 1),
                    ));
                }
                if col > 0 {
                    edges.push((
                        distance((row, col), (row + 1, col - 1)),
                        node(row, col),
                        node(row + 1, col - 1),
                    ));
                }
            }
        }
    }
    edges.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut forest = DisjointSet::new(height * width);
    for &(weight, a, b) in &edges {
        let root_a = forest.find(a);
        let root_b = forest.find(b);
        if root_a == root_b {
            continue;
        }
        let threshold_a = forest.internal[root_a] + scale / forest.size[root_a] as f32;
        let threshold_b = forest.internal[root_b] + scale / forest.size[root_b] as f32;
        if weight <= threshold_a.min(threshold_b) {
            forest.union(root_a, root_b, weight);
        }
    }

    // Absorb undersized components
    for &(weight, a, b) in &edges {
        let root_a = forest.find(a);
        let root_b = forest.find(b);
        if root_a != root_b && (forest.size[root_a] < min_size || forest.size[root_b] < min_size) {
            forest.union(root_a, root_b, weight);
        }
    }

    // Relabel roots to consecutive region ids
    let mut labels = Array2::zeros((height, width));
    let mut next_id = 0u32;
    let mut id_of_root = std::collections::HashMap::new();
    for row in 0..height {
        for col in 0..width {
            let root = forest.find(node(row, col));
            let id = *id_of_root.entry(root).or_insert_with(|| {
                let id = next_id;
                next_id += 1;
                id
            });
            labels[[row, col]] = id;
        }
    }

    debug!(regions = next_id, scale, min_size, "segmented superpixels");
    labels
}

fn gaussian_smooth(samples: &Array3<f32>, sigma: f32) -> Array3<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as isize;
    let mut kernel = Vec::with_capacity((2 * radius + 1) as usize);
    for offset in -radius..=radius {
        let x = offset as f32;
        kernel.push((-x * x / (2.0 * sigma * sigma)).exp());
    }
    let total: f32 = kernel.iter().sum();
    for weight in &mut kernel {
        *weight /= total;
    }

    let (height, width, bands) = samples.dim();
    let mut horizontal = Array3::zeros((height, width, bands));
    for row in 0..height {
        for col in 0..width {
            for band in 0..bands {
                let mut acc = 0.0;
                for (k, weight) in kernel.iter().enumerate() {
                    let c = (col as isize + k as isize - radius).clamp(0, width as isize - 1) as usize;
                    acc += weight * samples[[row, c, band]];
                }
                horizontal[[row, col, band]] = acc;
            }
        }
    }

    let mut smoothed = Array3::zeros((height, width, bands));
    for row in 0..height {
        for col in 0..width {
            for band in 0..bands {
                let mut acc = 0.0;
                for (k, weight) in kernel.iter().enumerate() {
                    let r = (row as isize + k as isize - radius).clamp(0, height as isize - 1) as usize;
                    acc += weight * horizontal[[r, col, band]];
                }
                smoothed[[row, col, band]] = acc;
            }
        }
    }
    smoothed
}
