use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// The rectangular sub-window of an image eligible for annotation and
/// prediction, in half-open pixel coordinates.
///
/// Every downstream operation (feature extraction, classification, the mask
/// codec and the consensus merge) works only within this window, and all of
/// them share the same row-major flattening over it. That shared convention
/// is load-bearing: a mismatch corrupts predictions silently, so the
/// flattening lives here and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskArea {
    pub row0: usize,
    pub col0: usize,
    pub row1: usize,
    pub col1: usize,
}

impl MaskArea {
    /// Create a new mask area; rejects empty windows.
    pub fn new(row0: usize, col0: usize, row1: usize, col1: usize) -> Result<Self> {
        if row1 <= row0 || col1 <= col0 {
            return Err(ConfigError::InvalidMaskArea {
                row0,
                col0,
                row1,
                col1,
            });
        }
        Ok(Self {
            row0,
            col0,
            row1,
            col1,
        })
    }

    /// Height of the window in pixels
    pub fn height(&self) -> usize {
        self.row1 - self.row0
    }

    /// Width of the window in pixels
    pub fn width(&self) -> usize {
        self.col1 - self.col0
    }

    /// Number of pixels in the window
    pub fn len(&self) -> usize {
        self.height() * self.width()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that the window lies inside a raster of the given shape
    pub fn validate_within(&self, height: usize, width: usize) -> Result<()> {
        if self.row1 > height || self.col1 > width {
            return Err(ConfigError::MaskAreaOutOfBounds { height, width });
        }
        Ok(())
    }

    /// Flatten a (row, col) position inside the window to its canonical
    /// row-major offset
    pub fn flatten_index(&self, row: usize, col: usize) -> usize {
        row * self.width() + col
    }

    /// Inverse of [`flatten_index`](Self::flatten_index)
    pub fn unflatten_index(&self, index: usize) -> (usize, usize) {
        (index / self.width(), index % self.width())
    }
}
