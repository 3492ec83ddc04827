//! Service layer - inference pipeline and result types

pub mod pipeline;
pub mod types;

pub use pipeline::InferencePipeline;
pub use types::{ClassificationResult, Label, FIRE_THRESHOLD};
