//! Filename conventions for uploads and persisted artifacts.
//!
//! Upload names are content-addressed (`<hash>.<ext>`); artifacts written
//! to disk carry a UTC timestamp prefix so successive generations never
//! overwrite each other.

use crate::error::CoreError;
use crate::types::Timestamp;

/// Format used for the timestamp prefix of persisted artifacts.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Build a content-addressed upload filename.
///
/// ```
/// use sketch3d_core::naming::content_addressed_filename;
///
/// assert_eq!(content_addressed_filename("abc123", "webp"), "abc123.webp");
/// ```
pub fn content_addressed_filename(hash_hex: &str, extension: &str) -> String {
    format!("{hash_hex}.{extension}")
}

/// Build the on-disk filename for a generated artifact.
///
/// Convention: `{YYYYmmdd-HHMMSS}_{basename}`. Only the final path
/// component of `artifact_name` is kept, so a backend-supplied name can
/// never escape the output directory.
pub fn timestamped_filename(at: Timestamp, artifact_name: &str) -> Result<String, CoreError> {
    let basename = artifact_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if basename.is_empty() || basename == "." || basename == ".." {
        return Err(CoreError::Validation(format!(
            "Artifact name '{artifact_name}' has no usable file component"
        )));
    }

    Ok(format!("{}_{basename}", at.format(TIMESTAMP_FORMAT)))
}
