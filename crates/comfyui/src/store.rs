//! Content-addressed artifact store on top of the ComfyUI file endpoints.
//!
//! Uploaded sketches are named after their perceptual hash, so sending
//! the same (or a visually near-identical) sketch twice resolves to the
//! same stored file and lets the backend reuse cached node outputs.

use std::sync::Arc;

use image::DynamicImage;
use sketch3d_core::hashing::perceptual_hash_hex;
use sketch3d_core::imaging::{encode_webp, WEBP_EXTENSION, WEBP_MIME};
use sketch3d_core::naming::content_addressed_filename;

use crate::api::{ComfyBackend, ComfyUIApiError};
use crate::types::{ArtifactCategory, ArtifactLocator, ImageReference};

/// Upload/download client for files held by the ComfyUI server.
#[derive(Clone)]
pub struct ArtifactStore {
    backend: Arc<dyn ComfyBackend>,
}

/// Errors from the artifact store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The image could not be encoded for upload.
    #[error(transparent)]
    Encoding(#[from] sketch3d_core::error::CoreError),

    /// The upload or download request failed.
    #[error(transparent)]
    Api(#[from] ComfyUIApiError),
}

impl ArtifactStore {
    pub fn new(backend: Arc<dyn ComfyBackend>) -> Self {
        Self { backend }
    }

    /// Filename an image would be stored under (`<phash>.webp`).
    pub fn filename_for(image: &DynamicImage) -> String {
        content_addressed_filename(&perceptual_hash_hex(image), WEBP_EXTENSION)
    }

    /// Encode `image` as lossless WebP and upload it to the input area.
    pub async fn upload(&self, image: &DynamicImage) -> Result<ImageReference, StoreError> {
        let bytes = encode_webp(image)?;
        let filename = Self::filename_for(image);
        let size_bytes = bytes.len();

        let reference = self.backend.upload_image(&filename, bytes, WEBP_MIME).await?;

        tracing::info!(
            filename = %filename,
            stored_as = %reference.name,
            size_bytes,
            "Sketch uploaded",
        );
        Ok(reference)
    }

    /// Download a stored or generated file by its three-part locator.
    pub async fn fetch(
        &self,
        filename: &str,
        subfolder: &str,
        category: ArtifactCategory,
    ) -> Result<Vec<u8>, StoreError> {
        let locator = ArtifactLocator {
            filename: filename.to_string(),
            subfolder: subfolder.to_string(),
            category,
        };
        self.fetch_locator(&locator).await
    }

    /// Download the file addressed by `locator`.
    pub async fn fetch_locator(&self, locator: &ArtifactLocator) -> Result<Vec<u8>, StoreError> {
        let bytes = self.backend.view(locator).await?;
        tracing::debug!(
            filename = %locator.filename,
            subfolder = %locator.subfolder,
            category = %locator.category,
            size_bytes = bytes.len(),
            "Artifact downloaded",
        );
        Ok(bytes)
    }
}
