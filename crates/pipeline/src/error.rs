use std::fmt;
use std::time::Duration;

use sketch3d_comfyui::api::ComfyUIApiError;
use sketch3d_comfyui::client::ComfyUIClientError;
use sketch3d_comfyui::store::StoreError;
use sketch3d_comfyui::workflow::WorkflowError;

/// Stage of a generation run in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Uploading,
    Submitting,
    Streaming,
    Finalizing,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Submitting => "submitting",
            Self::Streaming => "streaming",
            Self::Finalizing => "finalizing",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure kinds of a generation run, independent of the client layer
/// that detected them.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Network failure talking to the backend.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend answered with an error status, per-node errors, or a
    /// body that could not be parsed.
    #[error("Backend rejected the request: {0}")]
    BackendRejected(String),

    /// The workflow template is unreadable or lacks an injection node.
    #[error("Workflow template error: {0}")]
    Template(String),

    /// A history entry or artifact does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend reported a failed generation.
    #[error("Generation failed: {message}")]
    GenerationFailed {
        message: String,
        /// Status lines observed before the failure.
        progress_log: Vec<String>,
    },

    /// No terminal event arrived before the deadline.
    #[error("No completion signal within {0:?}")]
    TimedOut(Duration),

    /// The input image could not be prepared for upload.
    #[error("Invalid input image: {0}")]
    InvalidInput(String),
}

impl From<ComfyUIApiError> for GenerationError {
    fn from(err: ComfyUIApiError) -> Self {
        match err {
            ComfyUIApiError::Request(e) => Self::Transport(e.to_string()),
            ComfyUIApiError::NotFound(what) => Self::NotFound(what),
            ComfyUIApiError::NodeErrors(node_errors) => {
                Self::BackendRejected(format!("node errors: {node_errors}"))
            }
            other => Self::BackendRejected(other.to_string()),
        }
    }
}

impl From<StoreError> for GenerationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Encoding(e) => Self::InvalidInput(e.to_string()),
            StoreError::Api(e) => e.into(),
        }
    }
}

impl From<WorkflowError> for GenerationError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Api(e) => e.into(),
            WorkflowError::Rejected { node_errors } => {
                Self::BackendRejected(format!("node errors: {node_errors}"))
            }
            template @ (WorkflowError::Read { .. }
            | WorkflowError::Parse(_)
            | WorkflowError::NotAnObject
            | WorkflowError::MissingNode { .. }
            | WorkflowError::MissingInputs { .. }) => Self::Template(template.to_string()),
        }
    }
}

impl From<ComfyUIClientError> for GenerationError {
    fn from(err: ComfyUIClientError) -> Self {
        match err {
            ComfyUIClientError::Connection(msg) => Self::Transport(msg),
        }
    }
}

/// Terminal failure of a run: what went wrong and where.
#[derive(Debug, thiserror::Error)]
#[error("Generation run failed while {stage}: {source}")]
pub struct RunError {
    pub stage: RunStage,
    pub source: GenerationError,
}

impl RunError {
    pub fn new(stage: RunStage, source: GenerationError) -> Self {
        Self { stage, source }
    }

    /// Status lines collected before a generation failure; empty for
    /// every other kind of error.
    pub fn progress_log(&self) -> &[String] {
        match &self.source {
            GenerationError::GenerationFailed { progress_log, .. } => progress_log,
            _ => &[],
        }
    }
}
