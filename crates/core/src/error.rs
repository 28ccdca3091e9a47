#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Image encoding failed: {0}")]
    ImageEncoding(#[from] image::ImageError),

    #[error("Validation failed: {0}")]
    Validation(String),
}
