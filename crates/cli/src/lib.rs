//! Command-line front-end for sketch-to-3D generation.

pub mod app;
pub mod args;

pub use app::{consume_run, load_image, persist_artifact, voice_guidance, CliError};
pub use args::Args;
