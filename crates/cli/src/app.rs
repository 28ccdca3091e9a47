//! Front-end glue: input loading, guidance resolution, run consumption
//! and artifact persistence.

use std::path::{Path, PathBuf};

use futures::{Stream, StreamExt};
use image::DynamicImage;
use sketch3d_core::error::CoreError;
use sketch3d_core::naming::timestamped_filename;
use sketch3d_core::types::Timestamp;
use sketch3d_pipeline::{GeneratedArtifact, RunError, RunUpdate};
use sketch3d_speech::{Transcriber, TranscriptionError};

/// Errors surfaced by the front-end.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported or corrupt image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Naming(#[from] CoreError),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("Generation ended without producing a model")]
    NoResult,
}

/// Read and decode the sketch at `path`.
pub async fn load_image(path: &Path) -> Result<DynamicImage, CliError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    image::load_from_memory(&bytes).map_err(|source| CliError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Guidance text for a run when a voice clip was supplied.
///
/// The transcription replaces the typed guidance; an empty transcription
/// keeps the typed text.
pub async fn voice_guidance(
    transcriber: &dyn Transcriber,
    clip: Vec<u8>,
    typed: &str,
) -> Result<String, CliError> {
    let spoken = transcriber.transcribe(clip).await?;
    if spoken.is_empty() {
        tracing::warn!("Voice transcription was empty; using typed guidance");
        return Ok(typed.to_string());
    }
    tracing::info!(guidance = %spoken, "Using transcribed guidance");
    Ok(spoken)
}

/// Drain a generation run, logging statuses, and write the final model
/// into `output_dir`. Returns the written path.
pub async fn consume_run<S>(run: S, output_dir: &Path) -> Result<PathBuf, CliError>
where
    S: Stream<Item = Result<RunUpdate, RunError>>,
{
    futures::pin_mut!(run);

    while let Some(item) = run.next().await {
        match item? {
            RunUpdate::Status(status) => tracing::info!(status = %status, "Generation progress"),
            RunUpdate::Completed(artifact) => {
                return persist_artifact(output_dir, &artifact, chrono::Utc::now()).await;
            }
        }
    }

    Err(CliError::NoResult)
}

/// Write `artifact` as `<output_dir>/<YYYYmmdd-HHMMSS>_<filename>`,
/// creating the directory if needed.
pub async fn persist_artifact(
    output_dir: &Path,
    artifact: &GeneratedArtifact,
    at: Timestamp,
) -> Result<PathBuf, CliError> {
    let path = output_dir.join(timestamped_filename(at, &artifact.filename)?);

    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|source| CliError::Write {
            path: output_dir.to_path_buf(),
            source,
        })?;
    tokio::fs::write(&path, &artifact.bytes)
        .await
        .map_err(|source| CliError::Write {
            path: path.clone(),
            source,
        })?;

    tracing::info!(
        path = %path.display(),
        size_bytes = artifact.bytes.len(),
        "Model saved",
    );
    Ok(path)
}
