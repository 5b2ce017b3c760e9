use serde::{Deserialize, Serialize};

use crate::{
    Result,
    classify::{ClassifierConfig, SparseLabels},
    features::FeatureOptions,
};

/// Per-request model options as submitted by the annotation client.
///
/// Every field carries a default so a client can send `{}` (or omit the
/// object entirely) and get the stock model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ModelOptions {
    pub include_context: bool,
    pub use_edge_filter: bool,
    pub use_meshgrid: bool,
    pub meshgrid_cells: usize,
    pub use_superpixels: bool,
    pub n_leaves: usize,
    pub max_depth: usize,
    pub n_estimators: usize,
    pub suppression_filter_size: usize,
    /// `None` means the caller expressed no preference and the project's
    /// configured suppression settings apply; an explicit 0 disables the
    /// pass outright
    pub suppression_threshold: Option<u8>,
    pub suppression_default_class: u8,
}

impl Default for ModelOptions {
    fn default() -> Self {
        let features = FeatureOptions::default();
        let classifier = ClassifierConfig::default();
        Self {
            include_context: features.include_context,
            use_edge_filter: features.use_edge_filter,
            use_meshgrid: features.use_meshgrid,
            meshgrid_cells: features.meshgrid_cells,
            use_superpixels: features.use_superpixels,
            n_leaves: classifier.n_leaves,
            max_depth: classifier.max_depth,
            n_estimators: classifier.n_estimators,
            suppression_filter_size: classifier.suppression_filter_size,
            suppression_threshold: None,
            suppression_default_class: classifier.suppression_default_class,
        }
    }
}

impl ModelOptions {
    pub fn feature_options(&self) -> FeatureOptions {
        FeatureOptions {
            include_context: self.include_context,
            use_edge_filter: self.use_edge_filter,
            use_meshgrid: self.use_meshgrid,
            meshgrid_cells: self.meshgrid_cells,
            use_superpixels: self.use_superpixels,
        }
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            n_leaves: self.n_leaves,
            max_depth: self.max_depth,
            n_estimators: self.n_estimators,
            suppression_filter_size: self.suppression_filter_size,
            suppression_threshold: self.suppression_threshold.unwrap_or(0),
            suppression_default_class: self.suppression_default_class,
            ..ClassifierConfig::default()
        }
    }
}

/// One interactive prediction request: the user's sparse annotations plus
/// their model options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictRequest {
    /// Row-major pixel offsets into the masking area
    pub user_pixels: Vec<usize>,
    /// Class id per labelled pixel, parallel to `user_pixels`
    pub user_labels: Vec<u8>,
    #[serde(default)]
    pub ai_config: ModelOptions,
}

impl PredictRequest {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn sparse_labels(&self) -> Result<SparseLabels> {
        SparseLabels::new(self.user_pixels.clone(), self.user_labels.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_component_defaults() {
        let options = ModelOptions::default();
        assert_eq!(options.feature_options(), FeatureOptions::default());
        assert_eq!(options.classifier_config(), ClassifierConfig::default());
    }

    #[test]
    fn test_request_parses_with_omitted_config() {
        let request =
            PredictRequest::from_json(r#"{"user_pixels": [0, 5], "user_labels": [1, 2]}"#)
                .expect("valid request");
        assert_eq!(request.user_pixels, vec![0, 5]);
        assert_eq!(request.ai_config, ModelOptions::default());
    }

    #[test]
    fn test_request_overrides_selected_options() {
        let json = r#"{
            "user_pixels": [3],
            "user_labels": [0],
            "ai_config": {"use_superpixels": true, "n_estimators": 50}
        }"#;
        let request = PredictRequest::from_json(json).expect("valid request");
        assert!(request.ai_config.use_superpixels);
        assert_eq!(request.ai_config.n_estimators, 50);
        // Unmentioned options keep their defaults
        assert_eq!(request.ai_config.max_depth, ModelOptions::default().max_depth);
    }

    #[test]
    fn test_explicit_zero_threshold_differs_from_absent() {
        let absent =
            PredictRequest::from_json(r#"{"user_pixels": [0], "user_labels": [0]}"#).unwrap();
        assert_eq!(absent.ai_config.suppression_threshold, None);

        let disabled = PredictRequest::from_json(
            r#"{
                "user_pixels": [0],
                "user_labels": [0],
                "ai_config": {"suppression_threshold": 0}
            }"#,
        )
        .unwrap();
        assert_eq!(disabled.ai_config.suppression_threshold, Some(0));
        assert_eq!(disabled.ai_config.classifier_config().suppression_threshold, 0);
    }

    #[test]
    fn test_unknown_option_rejected() {
        let json = r#"{
            "user_pixels": [3],
            "user_labels": [0],
            "ai_config": {"use_hyperdrive": true}
        }"#;
        assert!(PredictRequest::from_json(json).is_err());
    }
}
