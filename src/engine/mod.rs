//! Inference engine module
//!
//! Provides OpenVINO-based inference with:
//! - A registry gating access to the single loaded model
//! - Base64 image decoding
//! - Area resize and training-time normalization

pub mod backend;
pub mod preprocess;
pub mod registry;

pub use backend::{Classifier, ModelLoader, OpenVinoLoader};
pub use preprocess::{Normalization, PreprocessedTensor};
pub use registry::{ModelHandle, ModelRegistry, ModelState};
