//! # Tilemark Common - Shared Types and Configuration
//!
//! Foundational types shared by every crate in the Tilemark workspace:
//! mask geometry, class definitions, raster containers and sources, and the
//! project segmentation configuration with its load-time validation.
//!
//! ## Example
//!
//! ```rust
//! use tilemark_common::{MaskArea, ClassDef};
//!
//! let area = MaskArea::new(64, 64, 320, 320).unwrap();
//! assert_eq!(area.len(), 256 * 256);
//!
//! let water = ClassDef::new(1, "Water", [0, 0, 255, 255]);
//! assert_eq!(water.css_colour(), "rgba(0, 0, 255, 255)");
//! ```

pub mod classes;
pub mod config;
pub mod geometry;
pub mod raster;

pub use classes::ClassDef;
pub use config::{MaskEncoding, MaskFormat, ScoreMetric, SegmentationConfig};
pub use geometry::MaskArea;
pub use raster::{ImageDirSource, Raster, RasterSource};

use thiserror::Error;

/// Result type for configuration and shared-type operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating project configuration.
///
/// These are fatal at project-load time and are never produced while
/// serving a per-request operation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid mask area: rows {row0}..{row1}, cols {col0}..{col1}")]
    InvalidMaskArea {
        row0: usize,
        col0: usize,
        row1: usize,
        col1: usize,
    },

    #[error("Mask area exceeds raster bounds of {height}x{width}")]
    MaskAreaOutOfBounds { height: usize, width: usize },

    #[error("Class ids must be dense 0..{expected}, got id {got}")]
    SparseClassIds { expected: usize, got: u8 },

    #[error("Class id {0} collides with the wire magic byte range (must be <= 253)")]
    ClassIdReserved(u8),

    #[error("No classes configured")]
    NoClasses,

    #[error("Mask format '{format}' does not allow '{encoding}' encoding")]
    IncompatibleEncoding { format: String, encoding: String },

    #[error("Raster has no bands")]
    EmptyRaster,

    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
