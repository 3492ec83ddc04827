//! Axum REST API handlers

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::Json,
};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{ErrorKind, PipelineError};
use crate::service::InferencePipeline;

use super::dto::*;

const MODEL_UNAVAILABLE: &str = "Model is not available or failed to load";

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Application state shared across handlers
pub struct AppState {
    pub pipeline: Arc<InferencePipeline>,
    /// Artifact `/health` reloads from when retries are enabled.
    pub model_path: PathBuf,
    pub retry_load_on_health: bool,
}

/// Create the REST API router
pub fn create_rest_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP status for an error category
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ClientInput => StatusCode::BAD_REQUEST,
        ErrorKind::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::RuntimeInference | ErrorKind::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(kind: ErrorKind, message: impl Into<String>) -> ApiError {
    (status_for(kind), Json(ErrorResponse::new(message)))
}

fn pipeline_error(err: &PipelineError) -> ApiError {
    let kind = err.kind();
    let message = match kind {
        ErrorKind::ClientInput => format!("Error decoding/reading image: {}", err),
        ErrorKind::ModelUnavailable => MODEL_UNAVAILABLE.to_string(),
        ErrorKind::RuntimeInference => format!("Prediction error: {}", err),
        ErrorKind::Unexpected => format!("Unexpected error during prediction: {}", err),
    };

    if kind == ErrorKind::ClientInput {
        warn!("Prediction failed at {} stage: {}", err.stage().as_str(), err);
    } else {
        error!("Prediction failed at {} stage: {}", err.stage().as_str(), err);
    }

    api_error(kind, message)
}

/// Predict handler
async fn predict_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    if !state.pipeline.registry().is_ready() {
        error!("Prediction request received but model is not ready.");
        return Err(api_error(ErrorKind::ModelUnavailable, MODEL_UNAVAILABLE));
    }

    let Json(request) = payload.map_err(|e| {
        warn!("Rejected predict body: {}", e);
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            (e.status(), Json(ErrorResponse::new("Request body is too large")))
        } else {
            api_error(ErrorKind::ClientInput, "Request body must be JSON")
        }
    })?;

    let image = request
        .image_base64
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            warn!("Missing or empty 'imageBase64' field in request.");
            api_error(ErrorKind::ClientInput, "Missing or empty imageBase64 field in request body")
        })?;

    let pipeline = state.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || pipeline.run(Some(&image)))
        .await
        .map_err(|e| {
            error!("Prediction task failed: {}", e);
            api_error(
                ErrorKind::Unexpected,
                format!("Unexpected error during prediction: {}", e),
            )
        })?
        .map_err(|e| pipeline_error(&e))?;

    Ok(Json(PredictResponse::from(result)))
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let registry = state.pipeline.registry().clone();

    // A load already in flight answers for this poll too.
    if !registry.is_ready() && !registry.is_loading() && state.retry_load_on_health {
        let path = state.model_path.clone();
        let loader = registry.clone();
        match tokio::task::spawn_blocking(move || loader.load(&path)).await {
            Ok(Ok(_)) => info!("Model loaded during health check"),
            Ok(Err(e)) => warn!("Health check could not load model: {}", e),
            Err(e) => error!("Model load task failed: {}", e),
        }
    }

    if registry.is_ready() {
        (StatusCode::OK, Json(HealthResponse::ready()))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse::unavailable()))
    }
}
