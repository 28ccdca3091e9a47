//! Generation-run orchestration for the sketch-to-3D client.
//!
//! Ties the ComfyUI clients together into a single lazy run per request
//! and owns the configuration and run-level error taxonomy.

pub mod config;
pub mod error;
pub mod orchestrator;

pub use config::{ConfigError, PipelineConfig};
pub use error::{GenerationError, RunError, RunStage};
pub use orchestrator::{GeneratedArtifact, GenerationPipeline, PipelineSettings, RunUpdate};
