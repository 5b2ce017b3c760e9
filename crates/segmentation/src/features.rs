use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use tilemark_common::{MaskArea, Raster};
use tracing::debug;

use crate::{Result, SegmentationError, superpixels};

/// Size of the square neighbourhood for the local min/max context channels
const CONTEXT_WINDOW: usize = 7;

fn default_meshgrid_cells() -> usize {
    1
}

/// Feature-engineering flags for [`build_features`].
///
/// Field names match the `ai_config` record of the predict request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureOptions {
    /// Append per-band local minimum and maximum over a 7x7 window,
    /// tripling the feature width
    #[serde(default)]
    pub include_context: bool,
    /// Append a Sobel gradient-magnitude response per band
    #[serde(default)]
    pub use_edge_filter: bool,
    /// Append normalised row/column coordinate channels
    #[serde(default)]
    pub use_meshgrid: bool,
    /// Coarsen the coordinate channels to this many cells per axis;
    /// 1 keeps them per-pixel
    #[serde(default = "default_meshgrid_cells")]
    pub meshgrid_cells: usize,
    /// Append one channel of unsupervised region ids as a weak
    /// spatial-coherence prior
    #[serde(default)]
    pub use_superpixels: bool,
}

impl Default for FeatureOptions {
    fn default() -> Self {
        Self {
            include_context: false,
            use_edge_filter: false,
            use_meshgrid: false,
            meshgrid_cells: 1,
            use_superpixels: false,
        }
    }
}

impl FeatureOptions {
    /// Feature-matrix width these options produce for a raster with
    /// `bands` bands
    pub fn feature_width(&self, bands: usize) -> usize {
        let mut width = bands;
        if self.include_context {
            width += 2 * bands;
        }
        if self.use_edge_filter {
            width += bands;
        }
        if self.use_meshgrid {
            width += 2;
        }
        if self.use_superpixels {
            width += 1;
        }
        width
    }
}

/// Derive the per-pixel feature matrix for the masking area of a raster.
///
/// Rows are the mask-area pixels in canonical row-major order (the same
/// flattening the mask codec uses); columns are the raw band values
/// followed by the optional derived channels. Pure function of its inputs.
pub fn build_features(
    raster: &Raster,
    area: &MaskArea,
    options: &FeatureOptions,
) -> Result<Array2<f32>> {
    if raster.bands() == 0 {
        return Err(SegmentationError::EmptyRaster);
    }
    let window = raster
        .crop(area)
        .map_err(|_| SegmentationError::AreaOutOfBounds {
            height: raster.height(),
            width: raster.width(),
        })?;

    let (height, width, bands) = (window.height(), window.width(), window.bands());
    let mut channels: Vec<Array2<f32>> = Vec::with_capacity(options.feature_width(bands));

    for band in 0..bands {
        channels.push(band_plane(&window.samples, band));
    }

    if options.include_context {
        for band in 0..bands {
            let plane = band_plane(&window.samples, band);
            channels.push(window_filter(&plane, CONTEXT_WINDOW, f32::min, f32::INFINITY));
            channels.push(window_filter(&plane, CONTEXT_WINDOW, f32::max, f32::NEG_INFINITY));
        }
    }

    if options.use_edge_filter {
        for band in 0..bands {
            let plane = band_plane(&window.samples, band);
            channels.push(sobel_magnitude(&plane));
        }
    }

    if options.use_meshgrid {
        let (rows, cols) = meshgrid(height, width, options.meshgrid_cells);
        channels.push(rows);
        channels.push(cols);
    }

    if options.use_superpixels {
        let regions = superpixels::felzenszwalb(
            &window.samples,
            superpixels::scale_for(height * width),
            superpixels::DEFAULT_SIGMA,
            superpixels::min_size_for(height * width),
        );
        channels.push(regions.mapv(|id| id as f32));
    }

    let num_features = channels.len();
    let mut features = Array2::zeros((height * width, num_features));
    for (column, channel) in channels.iter().enumerate() {
        for row in 0..height {
            for col in 0..width {
                features[[area.flatten_index(row, col), column]] = channel[[row, col]];
            }
        }
    }

    debug!(
        pixels = height * width,
        features = num_features,
        "built feature matrix"
    );
    Ok(features)
}

fn band_plane(samples: &Array3<f32>, band: usize) -> Array2<f32> {
    samples.index_axis(ndarray::Axis(2), band).to_owned()
}

/// Running min or max over a square window with replicated borders
fn window_filter(
    plane: &Array2<f32>,
    window: usize,
    combine: fn(f32, f32) -> f32,
    identity: f32,
) -> Array2<f32> {
    let (height, width) = plane.dim();
    let radius = (window / 2) as isize;
    let mut out = Array2::zeros((height, width));

    for row in 0..height {
        for col in 0..width {
            let mut acc = identity;
            for dr in -radius..=radius {
                for dc in -radius..=radius {
                    let r = (row as isize + dr).clamp(0, height as isize - 1) as usize;
                    let c = (col as isize + dc).clamp(0, width as isize - 1) as usize;
                    acc = combine(acc, plane[[r, c]]);
                }
            }
            out[[row, col]] = acc;
        }
    }
    out
}

/// Sobel gradient magnitude with replicated borders
fn sobel_magnitude(plane: &Array2<f32>) -> Array2<f32> {
    const GX: [[f32; 3]; 3] = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
    const GY: [[f32; 3]; 3] = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

    let (height, width) = plane.dim();
    let mut out = Array2::zeros((height, width));

    for row in 0..height {
        for col in 0..width {
            let mut gx = 0.0;
            let mut gy = 0.0;
            for dr in -1isize..=1 {
                for dc in -1isize..=1 {
                    let r = (row as isize + dr).clamp(0, height as isize - 1) as usize;
                    let c = (col as isize + dc).clamp(0, width as isize - 1) as usize;
                    let kernel_row = (dr + 1) as usize;
                    let kernel_col = (dc + 1) as usize;
                    gx += GX[kernel_row][kernel_col] * plane[[r, c]];
                    gy += GY[kernel_row][kernel_col] * plane[[r, c]];
                }
            }
            out[[row, col]] = (gx * gx + gy * gy).sqrt();
        }
    }
    out
}

/// Normalised row/column coordinate channels, optionally coarsened to a
/// cell grid
fn meshgrid(height: usize, width: usize, cells: usize) -> (Array2<f32>, Array2<f32>) {
    let mut rows = Array2::zeros((height, width));
    let mut cols = Array2::zeros((height, width));

    let normalise = |position: usize, extent: usize| -> f32 {
        if cells > 1 {
            (position * cells / extent) as f32 / cells as f32
        } else if extent > 1 {
            position as f32 / (extent - 1) as f32
        } else {
            0.0
        }
    };

    for row in 0..height {
        for col in 0..width {
            rows[[row, col]] = normalise(row, height);
            cols[[row, col]] = normalise(col, width);
        }
    }
    (rows, cols)
}
