//! Contract test for a deployed model artifact.
//!
//! Pins the raw score a real model produces for an all-black image so that a
//! model swap with different preprocessing is caught. Run with:
//!
//! ```sh
//! FIRE_MODEL_PATH=models/fire_detection_model.xml \
//! FIRE_MODEL_EXPECTED_SCORE=0.0123 \
//! cargo test --test model_contract -- --ignored
//! ```

use std::sync::Arc;

use image::RgbImage;

use fire_inference::config::ModelConfig;
use fire_inference::engine::ModelRegistry;
use fire_inference::service::InferencePipeline;

#[test]
#[ignore = "needs an OpenVINO runtime and a model artifact"]
fn test_black_image_score_matches_pinned_value() {
    let path = std::env::var("FIRE_MODEL_PATH").expect("FIRE_MODEL_PATH not set");
    let expected: f32 = std::env::var("FIRE_MODEL_EXPECTED_SCORE")
        .expect("FIRE_MODEL_EXPECTED_SCORE not set")
        .parse()
        .expect("FIRE_MODEL_EXPECTED_SCORE must be a number");

    let config = ModelConfig::default();
    let registry = Arc::new(ModelRegistry::openvino(&config.device));
    registry.load(&path).unwrap();

    let pipeline = InferencePipeline::from_config(registry, &config);
    let tensor = pipeline.preprocess(&RgbImage::new(config.edge_size.get(), config.edge_size.get()));
    let result = pipeline.classify(tensor).unwrap();

    assert!(
        (result.raw_score - expected).abs() < 1e-4,
        "raw score {} differs from pinned {}",
        result.raw_score,
        expected
    );
}
