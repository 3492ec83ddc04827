//! Model Registry
//!
//! Owns the single classifier instance and gates access to it.
//!
//! State machine: `Unloaded --load ok--> Loaded`, `Unloaded --load err-->
//! Unloaded`. Nothing leaves `Loaded`; there is no unload or hot reload.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ndarray::{Array2, Array4};
use parking_lot::{Mutex, RwLock};
use tracing::{error, info, warn};

use super::backend::{Classifier, ModelLoader, OpenVinoLoader};
use crate::error::{InferError, LoadError};

/// Reference to a loaded classifier. Cloning is cheap.
#[derive(Clone)]
pub struct ModelHandle {
    classifier: Arc<dyn Classifier>,
    path: PathBuf,
    load_time: Duration,
}

impl ModelHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_time(&self) -> Duration {
        self.load_time
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("path", &self.path)
            .field("load_time", &self.load_time)
            .finish()
    }
}

/// Lifecycle state of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loaded,
}

impl ModelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelState::Unloaded => "unloaded",
            ModelState::Loaded => "loaded",
        }
    }
}

/// Holder of the process-wide classifier.
pub struct ModelRegistry {
    loader: Arc<dyn ModelLoader>,
    handle: RwLock<Option<ModelHandle>>,
    /// Serializes loads; `handle` is only written to install the result.
    load_lock: Mutex<()>,
}

impl ModelRegistry {
    /// Create an unloaded registry that builds models with `loader`.
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            handle: RwLock::new(None),
            load_lock: Mutex::new(()),
        }
    }

    /// Create an unloaded registry backed by OpenVINO on `device`.
    pub fn openvino(device: &str) -> Self {
        Self::new(Arc::new(OpenVinoLoader::new(device)))
    }

    /// Load the model at `path`.
    ///
    /// On failure the registry stays unloaded and can be retried. If a model
    /// is already loaded it is returned unchanged.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<ModelHandle, LoadError> {
        let path = path.as_ref();

        // Two callers never compile the model twice, and readers of `handle`
        // are not blocked while the backend works.
        let _loading = self.load_lock.lock();
        if let Some(existing) = self.handle() {
            warn!(
                "Model already loaded from {}, ignoring load of {}",
                existing.path.display(),
                path.display()
            );
            return Ok(existing);
        }

        if !path.is_file() {
            error!("Model file not found at: {}", path.display());
            return Err(LoadError::FileNotFound(path.to_path_buf()));
        }

        info!("Loading model from: {}...", path.display());
        let start = Instant::now();

        let classifier = self.loader.load(path).map_err(|e| {
            error!("Error loading model: {:#}", e);
            LoadError::LoadFailure(format!("{:#}", e))
        })?;

        let handle = ModelHandle {
            classifier,
            path: path.to_path_buf(),
            load_time: start.elapsed(),
        };
        info!("Model loaded successfully in {:?}", handle.load_time);

        *self.handle.write() = Some(handle.clone());
        Ok(handle)
    }

    pub fn is_ready(&self) -> bool {
        self.handle.read().is_some()
    }

    /// Whether a `load` is currently running.
    pub fn is_loading(&self) -> bool {
        self.load_lock.is_locked()
    }

    pub fn state(&self) -> ModelState {
        if self.is_ready() {
            ModelState::Loaded
        } else {
            ModelState::Unloaded
        }
    }

    /// The loaded model, if any.
    pub fn handle(&self) -> Option<ModelHandle> {
        self.handle.read().clone()
    }

    /// Run the forward pass. No lock is held while the model runs.
    pub fn infer(&self, input: &Array4<f32>) -> Result<Array2<f32>, InferError> {
        let handle = self.handle().ok_or(InferError::NotReady)?;

        handle
            .classifier
            .forward(input)
            .map_err(|e| InferError::RuntimeFailure(format!("{:#}", e)))
    }
}
