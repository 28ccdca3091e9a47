//! ComfyUI WebSocket message types and parser.
//!
//! ComfyUI sends JSON messages over WebSocket with the shape
//! `{"type": "<kind>", "data": {...}}`. This module deserializes them
//! into a strongly-typed [`ComfyUIMessage`] enum.

use serde::Deserialize;

/// All known ComfyUI WebSocket message types.
///
/// Deserialized via the adjacently-tagged `"type"` field with
/// associated `"data"` content.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ComfyUIMessage {
    /// Server status broadcast (queue depth, etc.).
    #[serde(rename = "status")]
    Status(StatusData),

    /// A prompt has started executing.
    #[serde(rename = "execution_start")]
    ExecutionStart(PromptData),

    /// Some nodes were skipped because their outputs are cached.
    #[serde(rename = "execution_cached")]
    ExecutionCached(ExecutionCachedData),

    /// A specific node is currently executing (or execution finished when `node` is `None`).
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// Progress update from a long-running node (e.g. KSampler).
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// A node has finished and produced output.
    #[serde(rename = "executed")]
    Executed(ExecutedData),

    /// Execution failed with an error.
    #[serde(rename = "execution_error")]
    ExecutionError(ErrorData),

    /// Execution was interrupted from the server side.
    #[serde(rename = "execution_interrupted")]
    ExecutionInterrupted(InterruptedData),
}

impl ComfyUIMessage {
    /// The `type` discriminator this message was parsed from.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::ExecutionStart(_) => "execution_start",
            Self::ExecutionCached(_) => "execution_cached",
            Self::Executing(_) => "executing",
            Self::Progress(_) => "progress",
            Self::Executed(_) => "executed",
            Self::ExecutionError(_) => "execution_error",
            Self::ExecutionInterrupted(_) => "execution_interrupted",
        }
    }

    /// Prompt the message belongs to, when the server says so.
    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            Self::Status(_) => None,
            Self::ExecutionStart(data) => data.prompt_id.as_deref(),
            Self::ExecutionCached(data) => data.prompt_id.as_deref(),
            Self::Executing(data) => data.prompt_id.as_deref(),
            Self::Progress(data) => data.prompt_id.as_deref(),
            Self::Executed(data) => data.prompt_id.as_deref(),
            Self::ExecutionError(data) => data.prompt_id.as_deref(),
            Self::ExecutionInterrupted(data) => data.prompt_id.as_deref(),
        }
    }
}

/// Values of the `type` discriminator that [`ComfyUIMessage`] models.
/// Must list every [`ComfyUIMessage::kind`].
pub const KNOWN_MESSAGE_TYPES: &[&str] = &[
    "status",
    "execution_start",
    "execution_cached",
    "executing",
    "progress",
    "executed",
    "execution_error",
    "execution_interrupted",
];

/// Queue status information.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    #[serde(default)]
    pub status: QueueStatus,
}

/// Current queue state.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueStatus {
    #[serde(default)]
    pub exec_info: ExecInfo,
}

/// Execution queue statistics.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecInfo {
    #[serde(default)]
    pub queue_remaining: i32,
}

/// Payload carrying only the prompt identifier.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptData {
    #[serde(default)]
    pub prompt_id: Option<String>,
}

/// Payload for `execution_cached` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCachedData {
    #[serde(default)]
    pub prompt_id: Option<String>,
    /// Node IDs whose outputs were served from cache.
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Payload for `executing` messages.
///
/// When `node` is `None`, execution of the prompt has completed.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

/// Payload for `progress` messages (step-level progress within a node).
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    /// Current step number.
    pub value: i64,
    /// Total number of steps.
    pub max: i64,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

/// Payload for `executed` messages (node output).
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    /// The node that produced this output.
    pub node: String,
    /// Raw output value (images, filenames, etc.).
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

/// Payload for `execution_error` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    pub exception_message: String,
    #[serde(default)]
    pub exception_type: String,
}

/// Payload for `execution_interrupted` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct InterruptedData {
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
}

/// Why a text frame could not be turned into a [`ComfyUIMessage`].
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// Not JSON, no `type` field, or a known type with a malformed payload.
    #[error("Malformed ComfyUI message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Well-formed envelope with a `type` this client does not model
    /// (e.g. vendor extension messages).
    #[error("Unknown ComfyUI message type '{0}'")]
    UnknownType(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Parse a ComfyUI WebSocket text message into a typed enum.
///
/// Unknown `type` values are reported separately from malformed input
/// so callers can skip the former and surface the latter.
pub fn parse_message(text: &str) -> Result<ComfyUIMessage, MessageError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    if !KNOWN_MESSAGE_TYPES.contains(&envelope.kind.as_str()) {
        return Err(MessageError::UnknownType(envelope.kind));
    }
    Ok(serde_json::from_str(text)?)
}
