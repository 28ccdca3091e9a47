//! Shared building blocks for the sketch-to-3D client.
//!
//! Pure, I/O-free helpers used by the ComfyUI integration and the CLI:
//! perceptual hashing for content-addressed uploads, image encoding,
//! artifact naming, and the common error type.

pub mod error;
pub mod hashing;
pub mod imaging;
pub mod naming;
pub mod types;
