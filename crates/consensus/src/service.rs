//! The save/load/predict operations the annotation front end consumes.
//!
//! Every operation works in terms of wire-format byte payloads so the web
//! layer stays a thin pass-through. Concurrent saves for one image must be
//! serialized by the caller; the merge assumes read-after-write
//! consistency from the store.

use std::path::PathBuf;

use tilemark_common::{MaskFormat, RasterSource, SegmentationConfig};
use tracing::info;

use mask_codec::{decode_wire, encode_wire, publish_mask};
use segmentation::{PredictRequest, build_features, fit_and_predict};

use crate::{
    MergeOutcome, Result,
    merge::merge,
    store::MaskStore,
};

pub struct SegmentationService {
    config: SegmentationConfig,
    store: MaskStore,
    rasters: Box<dyn RasterSource>,
}

impl SegmentationService {
    pub fn new(
        config: SegmentationConfig,
        store: MaskStore,
        rasters: Box<dyn RasterSource>,
    ) -> Self {
        Self {
            config,
            store,
            rasters,
        }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Where the published consensus mask for an image lives
    pub fn merged_path(&self, image_id: &str) -> PathBuf {
        let extension = match self.config.mask_format {
            MaskFormat::Msk => "msk",
            MaskFormat::Png => "png",
            MaskFormat::Jpeg => "jpg",
        };
        self.store.image_dir(image_id).join(format!("merged.{extension}"))
    }

    /// Decode and persist one annotator's wire-format mask, then recompute
    /// and publish the consensus mask.
    ///
    /// The wire payload is validated before anything is written, so a
    /// malformed save leaves previous mask state untouched.
    pub fn save_mask(&self, image_id: &str, user: &str, wire_bytes: &[u8]) -> Result<MergeOutcome> {
        let area = &self.config.mask_area;
        let (labels, provenance) = decode_wire(wire_bytes, area.height(), area.width())?;

        self.store
            .save(image_id, user, &labels, &provenance, &self.config.classes)?;

        let contributions = self.store.contributions(
            image_id,
            &self.config.classes,
            area.height(),
            area.width(),
        )?;
        // The save above guarantees at least one contribution
        let outcome = merge(&contributions, &self.config).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "saved mask vanished before merge")
        })?;

        publish_mask(
            self.merged_path(image_id),
            &outcome.merged,
            self.config.mask_encoding,
            self.config.mask_format,
            &self.config.classes,
        )?;

        info!(image_id, user, annotators = contributions.len(), "saved and merged");
        Ok(outcome)
    }

    /// One annotator's stored mask as wire bytes; `None` when they have
    /// not annotated this image
    pub fn load_mask(&self, image_id: &str, user: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .store
            .load(image_id, user, &self.config.classes)?
            .map(|(labels, provenance)| encode_wire(&labels, &provenance)))
    }

    /// Run an interactive prediction over the masking area.
    ///
    /// The response is one byte per pixel of the masking area, row-major,
    /// holding the predicted class ids.
    pub fn predict_mask(&self, image_id: &str, request_json: &str) -> Result<Vec<u8>> {
        let request = PredictRequest::from_json(request_json)?;
        let area = &self.config.mask_area;

        let raster = self.rasters.load(image_id)?;
        let features = build_features(&raster, area, &request.ai_config.feature_options())?;

        let mut classifier = request.ai_config.classifier_config();
        if request.ai_config.suppression_threshold.is_none() {
            // No preference in the request; apply the project's configured
            // filter. An explicit 0 in the request disables the pass.
            classifier.suppression_filter_size = self.config.suppression_filter_size;
            classifier.suppression_threshold = self.config.suppression_threshold;
            classifier.suppression_default_class = self.config.suppression_default_class;
        }

        let labels = request.sparse_labels()?;
        let grid = fit_and_predict(&features, &labels, &classifier, area)?;

        info!(image_id, pixels = labels.pixel_indices.len(), "predicted mask");
        Ok(grid.iter().copied().collect())
    }
}
