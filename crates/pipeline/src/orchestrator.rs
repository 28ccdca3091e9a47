//! Sketch-to-3D generation run.
//!
//! [`GenerationPipeline::run`] drives one job through
//! `Uploading -> Submitting -> Streaming -> Finalizing` and exposes the
//! run as a lazy [`Stream`] of [`RunUpdate`]s. Nothing happens until the
//! consumer polls; dropping the stream cancels the run and releases the
//! progress connection.
//!
//! Every run ends with exactly one terminal item: either
//! [`RunUpdate::Completed`] or a [`RunError`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use image::DynamicImage;
use sketch3d_comfyui::api::{ComfyBackend, ComfyUIApi};
use sketch3d_comfyui::client::ComfyUIClient;
use sketch3d_comfyui::progress::{CompletionTracker, EventSource, EventStream, StreamSignal};
use sketch3d_comfyui::store::ArtifactStore;
use sketch3d_comfyui::types::{ImageReference, JobHandle, OutputDefaults};
use sketch3d_comfyui::workflow::{InjectionPoints, JobSubmitter};
use tokio::time::Instant;

use crate::config::PipelineConfig;
use crate::error::{GenerationError, RunError, RunStage};

/// The generated model file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    /// Filename reported by the backend (e.g. `chair.glb`).
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// One item of a run's output sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunUpdate {
    /// Intermediate status line.
    Status(String),
    /// Final artifact. Always the last item of a successful run.
    Completed(GeneratedArtifact),
}

impl RunUpdate {
    /// `true` only for the final artifact.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Run-time knobs that do not affect how clients are built.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub output_node: String,
    pub output: OutputDefaults,
    pub finalize_grace: Duration,
    pub stream_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            output_node: config.output_node.clone(),
            output: config.output.clone(),
            finalize_grace: config.finalize_grace,
            stream_timeout: config.stream_timeout,
        }
    }
}

/// Composes the artifact store, job submitter and progress stream into
/// generation runs. Cheap to clone; each run holds its own clone.
#[derive(Clone)]
pub struct GenerationPipeline {
    backend: Arc<dyn ComfyBackend>,
    events: Arc<dyn EventSource>,
    store: ArtifactStore,
    submitter: JobSubmitter,
    settings: PipelineSettings,
}

impl GenerationPipeline {
    pub fn new(
        backend: Arc<dyn ComfyBackend>,
        events: Arc<dyn EventSource>,
        template_path: impl Into<PathBuf>,
        points: InjectionPoints,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store: ArtifactStore::new(Arc::clone(&backend)),
            submitter: JobSubmitter::new(Arc::clone(&backend), template_path, points),
            backend,
            events,
            settings,
        }
    }

    /// Build a pipeline talking to the ComfyUI instance named in `config`.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            Arc::new(ComfyUIApi::new(config.api_url.clone())),
            Arc::new(ComfyUIClient::new(config.ws_url.clone())),
            config.template_path.clone(),
            config.injection.clone(),
            PipelineSettings::from(config),
        )
    }

    /// Resolve the output node's artifact from history and download it.
    async fn finalize(&self, handle: &JobHandle) -> Result<GeneratedArtifact, GenerationError> {
        let settings = &self.settings;
        if !settings.finalize_grace.is_zero() {
            tokio::time::sleep(settings.finalize_grace).await;
        }

        let record = self.backend.get_history(&handle.job_id).await?;
        let locator = record
            .output_locator(&settings.output_node, &settings.output)
            .ok_or_else(|| {
                GenerationError::NotFound(format!(
                    "history of prompt {} has no result for node {}",
                    handle.job_id, settings.output_node
                ))
            })?;

        let bytes = self.store.fetch_locator(&locator).await?;
        Ok(GeneratedArtifact {
            filename: locator.filename,
            bytes,
        })
    }

    /// Ask the backend to drop the job from its queue. This only affects a
    /// job that has not started; one already executing keeps running
    /// until the backend finishes it.
    async fn cancel_job(&self, handle: &JobHandle) {
        if let Err(e) = self.backend.cancel_execution(&handle.job_id).await {
            tracing::warn!(
                prompt_id = %handle.job_id,
                error = %e,
                "Failed to remove timed-out job from queue",
            );
        }
    }

    /// Start a generation run for `image` guided by `guidance`.
    ///
    /// `client_id` keys the progress connection and the queued job; runs
    /// that overlap in time must use distinct ids.
    pub fn run(
        &self,
        image: DynamicImage,
        guidance: impl Into<String>,
        client_id: impl Into<String>,
    ) -> impl Stream<Item = Result<RunUpdate, RunError>> + Send + 'static {
        let run = Run {
            pipeline: self.clone(),
            image,
            guidance: guidance.into(),
            client_id: client_id.into(),
            state: RunState::Uploading,
        };

        futures::stream::unfold(run, |mut run| async move {
            let item = run.step().await?;
            Some((item, run))
        })
    }
}

enum RunState {
    Uploading,
    Submitting {
        image_ref: ImageReference,
    },
    Streaming(Box<Streaming>),
    Finalizing {
        handle: JobHandle,
    },
    Done,
}

struct Streaming {
    handle: JobHandle,
    stream: Box<dyn EventStream>,
    tracker: CompletionTracker,
    progress_log: Vec<String>,
    deadline: Instant,
}

struct Run {
    pipeline: GenerationPipeline,
    image: DynamicImage,
    guidance: String,
    client_id: String,
    state: RunState,
}

impl Run {
    /// Advance until there is an item to hand out, or the run is over.
    async fn step(&mut self) -> Option<Result<RunUpdate, RunError>> {
        loop {
            match std::mem::replace(&mut self.state, RunState::Done) {
                RunState::Uploading => {
                    tracing::info!(client_id = %self.client_id, "Uploading sketch");
                    match self.pipeline.store.upload(&self.image).await {
                        Ok(image_ref) => self.state = RunState::Submitting { image_ref },
                        Err(e) => return Some(Err(self.fail(RunStage::Uploading, e.into()))),
                    }
                }

                RunState::Submitting { image_ref } => {
                    let handle = match self
                        .pipeline
                        .submitter
                        .submit(&image_ref, &self.guidance, &self.client_id)
                        .await
                    {
                        Ok(handle) => handle,
                        Err(e) => return Some(Err(self.fail(RunStage::Submitting, e.into()))),
                    };

                    let stream = match self.pipeline.events.open(&self.client_id).await {
                        Ok(stream) => stream,
                        Err(e) => return Some(Err(self.fail(RunStage::Streaming, e.into()))),
                    };

                    tracing::info!(
                        client_id = %self.client_id,
                        prompt_id = %handle.job_id,
                        "Waiting for progress events",
                    );
                    let tracker = CompletionTracker::new(
                        handle.job_id.clone(),
                        self.pipeline.settings.output_node.clone(),
                    );
                    self.state = RunState::Streaming(Box::new(Streaming {
                        handle,
                        stream,
                        tracker,
                        progress_log: Vec::new(),
                        deadline: Instant::now() + self.pipeline.settings.stream_timeout,
                    }));
                }

                RunState::Streaming(mut streaming) => {
                    let next =
                        tokio::time::timeout_at(streaming.deadline, streaming.stream.next_event())
                            .await;

                    let event = match next {
                        Ok(Some(event)) => event,
                        Ok(None) => {
                            streaming.stream.close().await;
                            let Streaming { progress_log, .. } = *streaming;
                            return Some(Err(self.fail(
                                RunStage::Streaming,
                                GenerationError::GenerationFailed {
                                    message: "progress stream ended before completion".to_string(),
                                    progress_log,
                                },
                            )));
                        }
                        Err(_elapsed) => {
                            streaming.stream.close().await;
                            self.pipeline.cancel_job(&streaming.handle).await;
                            let timeout = self.pipeline.settings.stream_timeout;
                            return Some(Err(
                                self.fail(RunStage::Streaming, GenerationError::TimedOut(timeout))
                            ));
                        }
                    };

                    match streaming.tracker.observe(&event) {
                        StreamSignal::Unrelated => {
                            tracing::trace!(
                                prompt_id = %streaming.handle.job_id,
                                other_prompt = ?event.prompt_id(),
                                "Skipping event for another prompt",
                            );
                            self.state = RunState::Streaming(streaming);
                        }
                        StreamSignal::Informational(status) => {
                            tracing::debug!(
                                client_id = %self.client_id,
                                prompt_id = %streaming.handle.job_id,
                                status = %status,
                                "Progress",
                            );
                            streaming.progress_log.push(status.clone());
                            self.state = RunState::Streaming(streaming);
                            return Some(Ok(RunUpdate::Status(status)));
                        }
                        StreamSignal::Succeeded => {
                            streaming.stream.close().await;
                            tracing::info!(
                                client_id = %self.client_id,
                                prompt_id = %streaming.handle.job_id,
                                node = %streaming.tracker.output_node(),
                                "Output node finished",
                            );
                            self.state = RunState::Finalizing {
                                handle: streaming.handle,
                            };
                        }
                        StreamSignal::Failed(message) => {
                            streaming.stream.close().await;
                            let Streaming { progress_log, .. } = *streaming;
                            return Some(Err(self.fail(
                                RunStage::Streaming,
                                GenerationError::GenerationFailed {
                                    message,
                                    progress_log,
                                },
                            )));
                        }
                    }
                }

                RunState::Finalizing { handle } => {
                    return Some(match self.pipeline.finalize(&handle).await {
                        Ok(artifact) => {
                            tracing::info!(
                                client_id = %self.client_id,
                                prompt_id = %handle.job_id,
                                filename = %artifact.filename,
                                size_bytes = artifact.bytes.len(),
                                "Generation succeeded",
                            );
                            Ok(RunUpdate::Completed(artifact))
                        }
                        Err(e) => Err(self.fail(RunStage::Finalizing, e)),
                    });
                }

                RunState::Done => return None,
            }
        }
    }

    fn fail(&mut self, stage: RunStage, source: GenerationError) -> RunError {
        self.state = RunState::Done;
        tracing::error!(
            client_id = %self.client_id,
            stage = %stage,
            error = %source,
            "Generation run failed",
        );
        RunError::new(stage, source)
    }
}
