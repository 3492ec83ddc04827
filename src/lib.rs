//! Fire Detection Inference Service Library

pub mod config;
pub mod engine;
pub mod error;
pub mod service;
pub mod api;

pub use config::Config;
