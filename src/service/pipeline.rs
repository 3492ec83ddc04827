//! Inference Pipeline - Core business logic
//!
//! Orchestrates decode → preprocess → classify for one request. Every stage
//! runs synchronously on the calling thread and keeps no state between
//! requests; the only shared resource is the read-only model.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::engine::preprocess::{self, Normalization, PreprocessedTensor};
use crate::engine::ModelRegistry;
use crate::error::{DecodeError, InferError, PipelineError};

use super::types::ClassificationResult;

/// Request pipeline from base64 payload to classification.
pub struct InferencePipeline {
    registry: Arc<ModelRegistry>,
    edge_size: NonZeroU32,
    normalization: Normalization,
}

impl InferencePipeline {
    pub fn new(
        registry: Arc<ModelRegistry>,
        edge_size: NonZeroU32,
        normalization: Normalization,
    ) -> Self {
        Self {
            registry,
            edge_size,
            normalization,
        }
    }

    pub fn from_config(registry: Arc<ModelRegistry>, config: &ModelConfig) -> Self {
        Self::new(registry, config.edge_size, config.normalization)
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn edge_size(&self) -> u32 {
        self.edge_size.get()
    }

    /// Decode a base64 payload into an RGB image.
    pub fn decode_image(&self, input: Option<&str>) -> Result<RgbImage, DecodeError> {
        preprocess::decode_image(input)
    }

    /// Resize and normalize into the model's input layout.
    pub fn preprocess(&self, image: &RgbImage) -> PreprocessedTensor {
        preprocess::preprocess(image, self.edge_size.get(), self.normalization)
    }

    /// Run the model on one tensor and threshold its fire probability.
    pub fn classify(&self, tensor: PreprocessedTensor) -> Result<ClassificationResult, InferError> {
        let batch = tensor.into_batch();
        let output = self.registry.infer(&batch)?;

        let raw_score = output
            .get((0, 0))
            .copied()
            .ok_or_else(|| InferError::RuntimeFailure("model returned no score".to_string()))?;

        info!("Raw prediction output: {}", raw_score);

        let result = ClassificationResult::from_score(raw_score).ok_or_else(|| {
            InferError::RuntimeFailure(format!("model score {} is outside [0, 1]", raw_score))
        })?;

        info!(
            "Prediction result - Label: {} (Index: {}), Confidence: {:.4}",
            result.label,
            result.label.index(),
            result.confidence
        );

        Ok(result)
    }

    /// Decode, preprocess and classify, stopping at the first failure.
    pub fn run(&self, input: Option<&str>) -> Result<ClassificationResult, PipelineError> {
        let start = Instant::now();

        let image = self
            .decode_image(input)
            .inspect_err(|e| warn!("Error decoding/reading image: {}", e))?;
        debug!("Decoded {}x{} image", image.width(), image.height());

        let tensor = self.preprocess(&image);
        let result = self.classify(tensor)?;

        debug!("Pipeline finished in {:?}", start.elapsed());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::Path;

    use anyhow::Result;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use image::{DynamicImage, ImageFormat};
    use ndarray::{Array2, Array4};
    use parking_lot::Mutex;
    use tempfile::NamedTempFile;

    use crate::engine::{Classifier, ModelLoader};
    use crate::error::{ErrorKind, Stage};
    use crate::service::types::Label;

    /// Returns a pinned score and records the input it saw.
    struct Pinned {
        score: f32,
        seen: Mutex<Vec<Vec<usize>>>,
    }

    impl Classifier for Pinned {
        fn forward(&self, input: &Array4<f32>) -> Result<Array2<f32>> {
            self.seen.lock().push(input.shape().to_vec());
            Ok(Array2::from_elem((input.shape()[0], 1), self.score))
        }
    }

    struct PinnedLoader(Arc<Pinned>);

    impl ModelLoader for PinnedLoader {
        fn load(&self, _path: &Path) -> Result<Arc<dyn Classifier>> {
            Ok(self.0.clone())
        }
    }

    struct EmptyOutput;

    impl Classifier for EmptyOutput {
        fn forward(&self, _input: &Array4<f32>) -> Result<Array2<f32>> {
            Ok(Array2::zeros((0, 0)))
        }
    }

    struct EmptyLoader;

    impl ModelLoader for EmptyLoader {
        fn load(&self, _path: &Path) -> Result<Arc<dyn Classifier>> {
            Ok(Arc::new(EmptyOutput))
        }
    }

    fn edge(size: u32) -> NonZeroU32 {
        NonZeroU32::new(size).unwrap()
    }

    fn loaded_pipeline(score: f32) -> (InferencePipeline, Arc<Pinned>) {
        let model = Arc::new(Pinned {
            score,
            seen: Mutex::new(Vec::new()),
        });
        let registry = Arc::new(ModelRegistry::new(Arc::new(PinnedLoader(model.clone()))));
        let file = NamedTempFile::new().unwrap();
        registry.load(file.path()).unwrap();
        (InferencePipeline::new(registry, edge(32), Normalization::Caffe), model)
    }

    fn black_jpeg() -> String {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(64, 48))
            .write_to(&mut buffer, ImageFormat::Jpeg)
            .unwrap();
        BASE64.encode(buffer.into_inner())
    }

    #[test]
    fn test_black_jpeg_not_fire() {
        let (pipeline, model) = loaded_pipeline(0.1);
        let result = pipeline.run(Some(&black_jpeg())).unwrap();
        assert_eq!(result.label, Label::NotFire);
        assert!((result.confidence - 0.9).abs() < 1e-6);
        assert_eq!(model.seen.lock().as_slice(), &[vec![1, 32, 32, 3]]);
    }

    #[test]
    fn test_boundary_score_is_fire() {
        let (pipeline, _) = loaded_pipeline(0.5);
        let result = pipeline.run(Some(&black_jpeg())).unwrap();
        assert_eq!(result.label, Label::Fire);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.raw_score, 0.5);
    }

    #[test]
    fn test_unloaded_registry_is_not_ready() {
        let (loaded, _) = loaded_pipeline(0.9);
        let registry = Arc::new(ModelRegistry::new(Arc::new(EmptyLoader)));
        let pipeline = InferencePipeline::new(registry, edge(32), Normalization::Caffe);

        let tensor = loaded.preprocess(&RgbImage::new(8, 8));
        assert_eq!(pipeline.classify(tensor), Err(InferError::NotReady));

        let err = pipeline.run(Some(&black_jpeg())).unwrap_err();
        assert_eq!(err.stage(), Stage::Classify);
        assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
    }

    #[test]
    fn test_decode_errors_are_client_errors() {
        let (pipeline, model) = loaded_pipeline(0.9);
        for input in [None, Some(""), Some("not-base64!!"), Some("aGVsbG8gd29ybGQ=")] {
            let err = pipeline.run(input).unwrap_err();
            assert_eq!(err.stage(), Stage::Decode);
            assert_eq!(err.kind(), ErrorKind::ClientInput);
        }
        // The model is never reached for bad input.
        assert!(model.seen.lock().is_empty());
    }

    #[test]
    fn test_empty_model_output_is_runtime_failure() {
        let registry = Arc::new(ModelRegistry::new(Arc::new(EmptyLoader)));
        let file = NamedTempFile::new().unwrap();
        registry.load(file.path()).unwrap();
        let pipeline = InferencePipeline::new(registry, edge(16), Normalization::Tf);

        let err = pipeline.run(Some(&black_jpeg())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RuntimeInference);
    }

    #[test]
    fn test_out_of_range_score_is_runtime_failure() {
        let (pipeline, _) = loaded_pipeline(1.7);
        let err = pipeline.run(Some(&black_jpeg())).unwrap_err();
        assert!(matches!(err, PipelineError::Classify(InferError::RuntimeFailure(_))));
    }
}
