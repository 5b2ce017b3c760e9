//! # Mask Codec
//!
//! Serialization of label grids and provenance grids across the three
//! boundaries they travel:
//!
//! - **Wire**: the fixed byte layout exchanged with the annotation front
//!   end (`encode_wire` / `decode_wire`).
//! - **Storage**: the persisted representations of a label grid
//!   (`integer`, one-hot `binary`, `rgb`, `rgba`).
//! - **Disk**: Tilemark's `.msk` container for per-user masks, plus
//!   PNG/JPEG export for published merged masks.
//!
//! All grids are flattened row-major over the masking area; the feature
//! builder and classifier share the same convention.

pub mod container;
pub mod publish;
pub mod storage;
pub mod wire;

pub use container::{read_mask_file, write_mask_file};
pub use publish::publish_mask;
pub use storage::{EncodedMask, decode_from_storage, encode_for_storage};
pub use wire::{WIRE_MAGIC, decode_wire, encode_wire};

use thiserror::Error;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised while encoding or decoding masks.
///
/// Wire-level failures are validation errors: the caller rejects the
/// request and leaves previous mask state untouched.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Wire payload has wrong length: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("Bad magic bytes: start {start}, end {end} (expected {magic})", magic = WIRE_MAGIC)]
    BadMagic { start: u8, end: u8 },

    #[error("Provenance byte must be 0 or 1, got {0}")]
    BadProvenance(u8),

    #[error("Label {0} does not fit the wire range 0..=253")]
    LabelOutOfRange(u8),

    #[error("Label grid contains class id {0} with no class definition")]
    UnknownClass(u8),

    #[error("Colour {0:?} does not match any configured class")]
    UnknownColour([u8; 4]),

    #[error("Mask file is not a Tilemark container")]
    BadContainerMagic,

    #[error("Unsupported container version {0}")]
    ContainerVersion(u8),

    #[error("Unknown encoding tag {0} in mask file")]
    ContainerTag(u8),

    #[error("Mask file payload is truncated or oversized")]
    ContainerTruncated,

    #[error("Encoding '{encoding}' cannot be written as {format}")]
    UnsupportedExport { encoding: String, format: String },

    #[error("Image encode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
