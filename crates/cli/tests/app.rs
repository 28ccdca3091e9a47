//! Tests for the front-end glue: persistence, run consumption and voice
//! guidance.

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::TimeZone;
use sketch3d_cli::{consume_run, load_image, persist_artifact, voice_guidance, CliError};
use sketch3d_pipeline::{GeneratedArtifact, GenerationError, RunError, RunStage, RunUpdate};
use sketch3d_speech::{Transcriber, TranscriptionError};

fn artifact() -> GeneratedArtifact {
    GeneratedArtifact {
        filename: "chair.glb".to_string(),
        bytes: b"glTF-model".to_vec(),
    }
}

struct FixedTranscriber(&'static str);

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _audio: Vec<u8>) -> Result<String, TranscriptionError> {
        Ok(self.0.to_string())
    }
}

// ---------------------------------------------------------------------------
// Test: persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn persist_writes_timestamped_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested/out");
    let at = chrono::Utc.with_ymd_and_hms(2026, 10, 19, 8, 5, 9).unwrap();

    let path = persist_artifact(&out, &artifact(), at).await.unwrap();

    assert_eq!(path, out.join("20261019-080509_chair.glb"));
    assert_eq!(std::fs::read(&path).unwrap(), b"glTF-model");
}

#[tokio::test]
async fn persist_strips_directories_from_backend_name() {
    let dir = tempfile::tempdir().unwrap();
    let at = chrono::Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
    let sneaky = GeneratedArtifact {
        filename: "../../etc/chair.glb".to_string(),
        bytes: vec![1],
    };

    let path = persist_artifact(dir.path(), &sneaky, at).await.unwrap();

    assert_eq!(path.parent().unwrap(), dir.path());
}

// ---------------------------------------------------------------------------
// Test: run consumption
// ---------------------------------------------------------------------------

#[tokio::test]
async fn consume_saves_final_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let run = futures::stream::iter(vec![
        Ok(RunUpdate::Status("Progress: 10/100".into())),
        Ok(RunUpdate::Completed(artifact())),
    ]);

    let path = consume_run(run, dir.path()).await.unwrap();

    assert!(path.file_name().unwrap().to_string_lossy().ends_with("_chair.glb"));
    assert_eq!(std::fs::read(path).unwrap(), b"glTF-model");
}

#[tokio::test]
async fn consume_surfaces_run_error() {
    let dir = tempfile::tempdir().unwrap();
    let run = futures::stream::iter(vec![
        Ok(RunUpdate::Status("Executing node: 10".into())),
        Err(RunError::new(
            RunStage::Streaming,
            GenerationError::GenerationFailed {
                message: "oom".into(),
                progress_log: vec!["Executing node: 10".into()],
            },
        )),
    ]);

    let err = consume_run(run, dir.path()).await.unwrap_err();

    assert_matches!(err, CliError::Run(e) if e.stage == RunStage::Streaming);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn exhausted_run_without_result_is_failure() {
    let dir = tempfile::tempdir().unwrap();
    let run = futures::stream::iter(vec![Ok::<_, RunError>(RunUpdate::Status("x".into()))]);

    let err = consume_run(run, dir.path()).await.unwrap_err();

    assert_matches!(err, CliError::NoResult);
}

// ---------------------------------------------------------------------------
// Test: inputs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn voice_overrides_typed_guidance() {
    let guidance = voice_guidance(&FixedTranscriber("a tall lamp"), vec![1], "a chair")
        .await
        .unwrap();
    assert_eq!(guidance, "a tall lamp");
}

#[tokio::test]
async fn empty_transcription_keeps_typed_guidance() {
    let guidance = voice_guidance(&FixedTranscriber(""), vec![1], "a chair")
        .await
        .unwrap();
    assert_eq!(guidance, "a chair");
}

#[tokio::test]
async fn load_image_decodes_png() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sketch.png");
    image::RgbImage::from_pixel(8, 8, image::Rgb([10, 20, 30]))
        .save(&path)
        .unwrap();

    let img = load_image(&path).await.unwrap();
    assert_eq!((img.width(), img.height()), (8, 8));
}

#[tokio::test]
async fn load_image_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "not an image").unwrap();

    assert_matches!(load_image(&path).await, Err(CliError::Decode { .. }));
    assert_matches!(
        load_image(&dir.path().join("missing.png")).await,
        Err(CliError::Read { .. })
    );
}
