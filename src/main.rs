//! Fire Detection Inference Service
//!
//! Classifies base64-encoded images as FIRE / NOTFIRE with an OpenVINO model.
//! Serves `POST /predict` and `GET /health` over REST (Axum).

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use fire_inference::api::{create_rest_router, AppState};
use fire_inference::config::Config;
use fire_inference::engine::ModelRegistry;
use fire_inference::service::InferencePipeline;

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration comes first so the log level can be applied
    let config_path = Config::default_path();
    let (config, config_source) = if Path::new(&config_path).exists() {
        (Config::load(&config_path)?, config_path)
    } else {
        (Config::default(), "defaults".to_string())
    };
    let config = config.with_env_overrides()?;

    // Initialize logging
    let level = config.log_level()?;
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .init();

    info!("Starting Fire Inference Service v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}:", config_source);
    info!("  Listen: {}", config.bind_addr());
    info!("  Model: {}", config.model.path.display());
    info!("  Device: {}", config.model.device);
    info!("  Edge size: {}", config.model.edge_size);
    info!("  Normalization: {}", config.model.normalization.as_str());

    // Load the model; failure leaves the service up but unavailable
    let registry = Arc::new(ModelRegistry::openvino(&config.model.device));
    let model_path = config.model.path.clone();
    let loader = registry.clone();
    match tokio::task::spawn_blocking(move || loader.load(&model_path)).await? {
        Ok(handle) => info!("Model ready ({} loaded in {:?})", handle.path().display(), handle.load_time()),
        Err(e) => error!("Failed to load model during startup. API may not function: {}", e),
    }

    let pipeline = Arc::new(InferencePipeline::from_config(registry, &config.model));

    let app_state = Arc::new(AppState {
        pipeline,
        model_path: config.model.path.clone(),
        retry_load_on_health: config.model.retry_load_on_health,
    });

    let router = create_rest_router(app_state, config.server.max_body_bytes);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("REST API listening on http://{}", addr);
    info!("Health: http://localhost:{}/health", config.server.port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Goodbye!");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, stopping server..."),
        Err(e) => {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await
        }
    }
}
