//! REST API request/response data transfer objects

use serde::{Deserialize, Serialize};

use crate::service::{ClassificationResult, Label};

/// Predict request body
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    #[serde(rename = "imageBase64", default)]
    pub image_base64: Option<String>,
}

/// Predict success response
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub data: PredictionDto,
}

#[derive(Debug, Serialize)]
pub struct PredictionDto {
    pub label: Label,
    pub confidence: f32,
}

impl From<ClassificationResult> for PredictResponse {
    fn from(result: ClassificationResult) -> Self {
        Self {
            success: true,
            data: PredictionDto {
                label: result.label,
                confidence: result.confidence,
            },
        }
    }
}

/// Error body shared by every failing predict response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

impl HealthResponse {
    pub fn ready() -> Self {
        Self {
            status: "OK".to_string(),
            message: "Model is loaded and service is ready".to_string(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            status: "Error".to_string(),
            message: "Model is not loaded or failed to load".to_string(),
        }
    }
}
