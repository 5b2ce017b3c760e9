//! # Mask Consensus
//!
//! Reconciles the per-user masks of an image into a single published
//! consensus mask:
//!
//! 1. [`MaskStore`] persists one final mask and one provenance mask per
//!    annotator, last write wins.
//! 2. [`merge`] tallies a per-pixel majority vote over every stored
//!    contribution and scores each annotator's agreement with the
//!    consensus (or with their single peer when only two have annotated).
//! 3. [`SegmentationService`] ties store, merge, codec and the interactive
//!    classifier together into the save/load/predict operations the
//!    annotation front end calls.
//!
//! The merge is a full recompute on every save. For a given set of
//! contributions it is deterministic, so repeated merges of unchanged
//! inputs produce byte-identical output.

pub mod merge;
pub mod service;
pub mod store;

pub use merge::{AgreementScore, MergeOutcome, merge};
pub use service::SegmentationService;
pub use store::{Contribution, MaskStore};

use thiserror::Error;

/// Result type for consensus operations
pub type Result<T> = std::result::Result<T, ConsensusError>;

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Mask codec: {0}")]
    Codec(#[from] mask_codec::CodecError),

    #[error("Segmentation: {0}")]
    Segmentation(#[from] segmentation::SegmentationError),

    #[error("Configuration: {0}")]
    Config(#[from] tilemark_common::ConfigError),

    #[error("Stored mask is {got_height}x{got_width} but the mask area is {height}x{width}")]
    MaskShape {
        height: usize,
        width: usize,
        got_height: usize,
        got_width: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
