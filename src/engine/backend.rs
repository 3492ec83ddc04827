//! Model backends
//!
//! [`Classifier`] is the forward pass the registry guards; [`ModelLoader`]
//! builds one from a model artifact. The production backend runs OpenVINO
//! IR or ONNX models.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array2, Array4};
use openvino::{CompiledModel, Core, ElementType, Shape, Tensor};
use parking_lot::Mutex;
use tracing::{debug, info};

/// Maps a `(batch, height, width, channels)` tensor to `(batch, units)` scores.
pub trait Classifier: Send + Sync {
    fn forward(&self, input: &Array4<f32>) -> Result<Array2<f32>>;
}

/// Builds a [`Classifier`] from a model file.
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn Classifier>>;
}

/// Owns the OpenVINO core and the model compiled from it.
struct CompiledClassifier {
    _core: Core,
    compiled: CompiledModel,
}

/// Wrapper that implements Send + Sync for the OpenVINO handles.
///
/// Compiled models are thread-safe in the C++ runtime, but the Rust bindings
/// need `&mut self` to create a request. The mutex only covers request
/// creation; inference itself runs unlocked on the per-call request.
struct SafeCompiled(Mutex<CompiledClassifier>);
unsafe impl Send for SafeCompiled {}
unsafe impl Sync for SafeCompiled {}

/// OpenVINO-backed classifier.
pub struct OpenVinoClassifier {
    model: SafeCompiled,
}

impl Classifier for OpenVinoClassifier {
    fn forward(&self, input: &Array4<f32>) -> Result<Array2<f32>> {
        let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let batch = input.shape()[0];

        let mut request = {
            let mut guard = self.model.0.lock();
            guard.compiled.create_infer_request()?
        };

        let input_shape = Shape::new(&dims)?;
        let mut tensor = Tensor::new(ElementType::F32, &input_shape)?;

        let input_data = input.as_standard_layout();
        let input_data = input_data
            .as_slice()
            .ok_or_else(|| anyhow!("input tensor is not contiguous"))?;
        let raw = tensor.get_raw_data_mut()?;
        if raw.len() != input_data.len() * std::mem::size_of::<f32>() {
            bail!(
                "input buffer holds {} bytes, tensor needs {}",
                raw.len(),
                input_data.len() * std::mem::size_of::<f32>()
            );
        }
        for (dst, value) in raw.chunks_exact_mut(4).zip(input_data.iter()) {
            dst.copy_from_slice(&value.to_ne_bytes());
        }

        request.set_input_tensor(&tensor)?;
        request.infer()?;

        let output = request.get_output_tensor()?;
        let output_dims: Vec<i64> = output.get_shape()?.get_dimensions().to_vec();
        debug!("Model output shape: {:?}", output_dims);

        let values: Vec<f32> = output
            .get_raw_data()?
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        scores_from_output(values, batch)
    }
}

/// Reshape a flat model output into `(batch, units)`.
pub fn scores_from_output(values: Vec<f32>, batch: usize) -> Result<Array2<f32>> {
    if values.is_empty() || batch == 0 {
        bail!("model produced an empty output");
    }
    if values.len() % batch != 0 {
        bail!(
            "model output of {} values does not split into {} rows",
            values.len(),
            batch
        );
    }
    let units = values.len() / batch;
    Ok(Array2::from_shape_vec((batch, units), values)?)
}

/// Loads models with OpenVINO for a given device (`CPU`, `GPU`, ...).
pub struct OpenVinoLoader {
    device: String,
}

impl OpenVinoLoader {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl ModelLoader for OpenVinoLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Classifier>> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("model path is not valid UTF-8: {}", path.display()))?;

        let start = Instant::now();
        let mut core = Core::new().context("failed to initialise OpenVINO")?;
        // IR models find their .bin next to the .xml; ONNX has no weights file.
        let model = core
            .read_model_from_file(path_str, "")
            .with_context(|| format!("failed to read model {}", path.display()))?;
        let compiled = core
            .compile_model(&model, self.device.as_str().into())
            .with_context(|| format!("failed to compile model for device {}", self.device))?;

        info!(
            "Compiled {} for {} in {:?}",
            path.display(),
            self.device,
            start.elapsed()
        );

        Ok(Arc::new(OpenVinoClassifier {
            model: SafeCompiled(Mutex::new(CompiledClassifier {
                _core: core,
                compiled,
            })),
        }))
    }
}
