//! Error types for model loading, decoding and inference.
//!
//! Each pipeline stage returns its own error enum; [`PipelineError`] tags the
//! failing stage and [`ErrorKind`] is what the HTTP layer maps to a status.

use std::path::PathBuf;

/// Errors from [`ModelRegistry::load`](crate::engine::ModelRegistry::load).
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The model path does not point at an existing file.
    #[error("model file not found at: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The backend could not read or compile the model.
    #[error("failed to load model: {0}")]
    LoadFailure(String),
}

/// Errors from the forward pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferError {
    /// No model has been loaded yet.
    #[error("model is not loaded")]
    NotReady,

    /// The backend failed while running the model or produced unusable output.
    #[error("inference failed: {0}")]
    RuntimeFailure(String),
}

/// Errors from turning a base64 payload into an RGB image.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("image payload is empty")]
    EmptyInput,

    #[error("invalid base64: {0}")]
    Base64Error(String),

    #[error("cannot read image: {0}")]
    ImageFormatError(String),
}

/// Pipeline stage that produced a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    Classify,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Classify => "classify",
        }
    }
}

/// First failure of [`InferencePipeline::run`](crate::service::InferencePipeline::run).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    Classify(#[from] InferError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Decode(_) => Stage::Decode,
            PipelineError::Classify(_) => Stage::Classify,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Decode(_) => ErrorKind::ClientInput,
            PipelineError::Classify(InferError::NotReady) => ErrorKind::ModelUnavailable,
            PipelineError::Classify(InferError::RuntimeFailure(_)) => ErrorKind::RuntimeInference,
        }
    }
}

/// Error categories exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed, missing or undecodable input (400).
    ClientInput,
    /// The model is not loaded (503).
    ModelUnavailable,
    /// The forward pass failed (500).
    RuntimeInference,
    /// Anything else (500).
    Unexpected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_kinds() {
        let err = PipelineError::from(DecodeError::EmptyInput);
        assert_eq!(err.stage(), Stage::Decode);
        assert_eq!(err.kind(), ErrorKind::ClientInput);

        let err = PipelineError::from(InferError::NotReady);
        assert_eq!(err.stage(), Stage::Classify);
        assert_eq!(err.kind(), ErrorKind::ModelUnavailable);

        let err = PipelineError::from(InferError::RuntimeFailure("shape".into()));
        assert_eq!(err.kind(), ErrorKind::RuntimeInference);
    }

    #[test]
    fn test_messages_do_not_nest_stage_names() {
        let err = PipelineError::from(DecodeError::Base64Error("bad byte".into()));
        assert_eq!(err.to_string(), "invalid base64: bad byte");
    }
}
