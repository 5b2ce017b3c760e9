use consensus::{MaskStore, SegmentationService};
use ndarray::Array3;
use tempfile::TempDir;
use tilemark_common::{
    ClassDef, MaskArea, MaskEncoding, MaskFormat, Raster, RasterSource, ScoreMetric,
    SegmentationConfig,
};

/// Synthetic raster with three horizontal intensity bands
struct BandedSource {
    band_names: Vec<String>,
}

impl BandedSource {
    fn new() -> Self {
        Self {
            band_names: vec!["B1".to_owned()],
        }
    }
}

impl RasterSource for BandedSource {
    fn load(&self, _image_id: &str) -> tilemark_common::Result<Raster> {
        let samples = Array3::from_shape_fn((4, 4, 1), |(row, _, _)| match row {
            0 => 0.1,
            1 => 0.1,
            2 => 0.5,
            _ => 0.9,
        });
        Raster::from_array(samples)
    }

    fn band_names(&self) -> &[String] {
        &self.band_names
    }
}

fn config() -> SegmentationConfig {
    SegmentationConfig {
        mask_area: MaskArea::new(0, 0, 4, 4).unwrap(),
        classes: vec![
            ClassDef::new(0, "Clear", [255, 255, 255, 0]),
            ClassDef::new(1, "Cloud", [255, 255, 0, 70]),
            ClassDef::new(2, "Shadow", [45, 45, 45, 70]),
        ],
        score: ScoreMetric::Accuracy,
        mask_encoding: MaskEncoding::Binary,
        mask_format: MaskFormat::Msk,
        suppression_filter_size: 5,
        suppression_threshold: 0,
        suppression_default_class: 0,
    }
}

fn service(root: &std::path::Path) -> SegmentationService {
    SegmentationService::new(config(), MaskStore::new(root), Box::new(BandedSource::new()))
}

/// Wire payload for a uniform 4x4 grid of one class, nothing hand-labelled
fn uniform_wire(class: u8) -> Vec<u8> {
    let mut bytes = vec![254u8];
    bytes.extend(std::iter::repeat_n(class, 16));
    bytes.extend(std::iter::repeat_n(0u8, 16));
    bytes.push(254);
    bytes
}

#[test]
fn test_save_load_round_trip_through_wire() {
    let dir = TempDir::new().unwrap();
    let service = service(dir.path());

    let wire = uniform_wire(1);
    service.save_mask("scene_1", "alice", &wire).unwrap();

    let loaded = service.load_mask("scene_1", "alice").unwrap().unwrap();
    assert_eq!(loaded, wire);
    assert!(service.load_mask("scene_1", "bob").unwrap().is_none());
}

#[test]
fn test_each_save_recomputes_the_consensus() {
    let dir = TempDir::new().unwrap();
    let service = service(dir.path());

    let outcome = service.save_mask("scene_1", "alice", &uniform_wire(2)).unwrap();
    assert!(outcome.scores.is_empty());
    assert_eq!(outcome.agreement, 1.0);

    let outcome = service.save_mask("scene_1", "bob", &uniform_wire(2)).unwrap();
    assert_eq!(outcome.scores.len(), 2);
    assert!(outcome.scores.iter().all(|s| s.score == 100 && s.unverified));

    let outcome = service.save_mask("scene_1", "carol", &uniform_wire(1)).unwrap();
    // Majority still says class 2; carol disagrees everywhere
    assert!(outcome.merged.iter().all(|&id| id == 2));
    assert!(outcome.scores.iter().all(|s| !s.unverified));
    let carol = outcome.scores.iter().find(|s| s.user == "carol").unwrap();
    assert_eq!(carol.score, 0);

    // The published consensus mask is on disk
    assert!(service.merged_path("scene_1").exists());
}

#[test]
fn test_malformed_wire_leaves_state_untouched() {
    let dir = TempDir::new().unwrap();
    let service = service(dir.path());

    service.save_mask("scene_1", "alice", &uniform_wire(1)).unwrap();
    assert!(service.save_mask("scene_1", "alice", &[254, 0, 254]).is_err());

    // The earlier save is still what loads back
    let loaded = service.load_mask("scene_1", "alice").unwrap().unwrap();
    assert_eq!(loaded, uniform_wire(1));
}

#[test]
fn test_predict_returns_one_byte_per_pixel() {
    let dir = TempDir::new().unwrap();
    let service = service(dir.path());

    let response = service
        .predict_mask(
            "scene_1",
            r#"{"user_pixels": [0, 1, 8, 9, 12, 15], "user_labels": [0, 0, 1, 1, 2, 2]}"#,
        )
        .unwrap();

    // One class id per pixel of the 4x4 masking area, row-major
    assert_eq!(response.len(), 16);
    assert!(response.iter().all(|&id| id <= 2));
}

#[test]
fn test_explicit_zero_threshold_disables_project_suppression() {
    let dir = TempDir::new().unwrap();
    // Project filter aggressive enough to flatten every prediction: with
    // threshold 100 no pixel of a 4x4 grid bordering the default class
    // (or the grid edge) survives
    let mut config = config();
    config.suppression_filter_size = 3;
    config.suppression_threshold = 100;
    let service = SegmentationService::new(
        config,
        MaskStore::new(dir.path()),
        Box::new(BandedSource::new()),
    );

    let request = r#"{"user_pixels": [0, 1, 8, 9, 12, 15], "user_labels": [0, 0, 1, 1, 2, 2]}"#;
    let flattened = service.predict_mask("scene_1", request).unwrap();
    assert!(flattened.iter().all(|&id| id == 0));

    let request = r#"{
        "user_pixels": [0, 1, 8, 9, 12, 15],
        "user_labels": [0, 0, 1, 1, 2, 2],
        "ai_config": {"suppression_threshold": 0}
    }"#;
    let untouched = service.predict_mask("scene_1", request).unwrap();
    assert!(untouched.iter().any(|&id| id != 0));
}

#[test]
fn test_predict_rejects_single_class() {
    let dir = TempDir::new().unwrap();
    let service = service(dir.path());

    let result = service.predict_mask(
        "scene_1",
        r#"{"user_pixels": [0, 1], "user_labels": [1, 1]}"#,
    );
    assert!(result.is_err());
}
