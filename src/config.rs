//! Fire inference service configuration
//!
//! Values come from `config.toml` (or the file named by `FIRE_CONFIG`) and are
//! then overridden by the `PORT`, `MODEL_PATH`, `MODEL_DEVICE`, `IMG_SIZE` and
//! `LOG_LEVEL` environment variables.

use std::num::NonZeroU32;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::Level;

use crate::engine::preprocess::Normalization;

const DEFAULT_EDGE_SIZE: NonZeroU32 = match NonZeroU32::new(256) {
    Some(edge) => edge,
    None => unreachable!(),
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Request bodies larger than this are rejected before decoding.
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub device: String,
    /// Square edge the input image is resized to.
    pub edge_size: NonZeroU32,
    /// Must match the preprocessing the weights were trained with.
    pub normalization: Normalization,
    /// Let `/health` try loading the model again while it is unavailable.
    pub retry_load_on_health: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            max_body_bytes: 20 * 1024 * 1024,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/fire_detection_model.xml"),
            device: "CPU".to_string(),
            edge_size: DEFAULT_EDGE_SIZE,
            normalization: Normalization::Caffe,
            retry_load_on_health: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("invalid config file")?;
        Ok(config)
    }

    /// Config file path, `FIRE_CONFIG` or `config.toml`.
    pub fn default_path() -> String {
        std::env::var("FIRE_CONFIG").unwrap_or_else(|_| "config.toml".to_string())
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got {:?}", port))?;
        }
        if let Some(path) = lookup("MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(device) = lookup("MODEL_DEVICE") {
            self.model.device = device;
        }
        if let Some(size) = lookup("IMG_SIZE") {
            self.model.edge_size = size
                .trim()
                .parse()
                .with_context(|| format!("IMG_SIZE must be a positive integer, got {:?}", size))?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.log_level()?;
        if self.server.max_body_bytes == 0 {
            bail!("server.max_body_bytes must be greater than zero");
        }
        if self.server.port == 0 {
            bail!("server.port must be greater than zero");
        }
        Ok(())
    }

    /// Parsed `logging.level`; unknown names are an error, not a silent default.
    pub fn log_level(&self) -> Result<Level> {
        self.logging.level.trim().parse().map_err(|_| {
            anyhow::anyhow!(
                "logging.level must be one of trace, debug, info, warn, error, got {:?}",
                self.logging.level
            )
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_model_server() {
        let config = Config::default();
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.model.edge_size.get(), 256);
        assert_eq!(config.model.normalization, Normalization::Caffe);
        assert!(!config.model.retry_load_on_health);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [model]
            path = "/srv/models/fire.onnx"
            normalization = "tf"
            "#,
        )
        .unwrap();
        assert_eq!(config.model.path, PathBuf::from("/srv/models/fire.onnx"));
        assert_eq!(config.model.normalization, Normalization::Tf);
        assert_eq!(config.model.edge_size.get(), 256);
        assert_eq!(config.server.port, 5001);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default()
            .with_overrides(env(&[
                ("PORT", "8080"),
                ("MODEL_PATH", "/tmp/model.xml"),
                ("IMG_SIZE", "224"),
            ]))
            .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.model.path, PathBuf::from("/tmp/model.xml"));
        assert_eq!(config.model.edge_size.get(), 224);
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_invalid_env_values_are_rejected() {
        assert!(Config::default().with_overrides(env(&[("IMG_SIZE", "big")])).is_err());
        assert!(Config::default().with_overrides(env(&[("IMG_SIZE", "0")])).is_err());
        assert!(Config::default().with_overrides(env(&[("PORT", "-1")])).is_err());
    }

    #[test]
    fn test_zero_edge_size_in_file_is_rejected() {
        let err = Config::from_toml("[model]\nedge_size = 0\n").unwrap_err();
        assert!(format!("{:#}", err).contains("invalid config file"));
    }

    #[test]
    fn test_log_level_is_validated() {
        let config = Config::default()
            .with_overrides(env(&[("LOG_LEVEL", "debug")]))
            .unwrap();
        assert_eq!(config.log_level().unwrap(), Level::DEBUG);

        let err = Config::default()
            .with_overrides(env(&[("LOG_LEVEL", "loud")]))
            .unwrap_err();
        assert!(err.to_string().contains("logging.level"));

        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }
}
