//! Progress events surfaced to the orchestrator.
//!
//! A [`ProgressEvent`] is the client-side view of one WebSocket message:
//! only the kinds the orchestrator reacts to, stripped of wire details.

use serde::Serialize;

use crate::messages::ComfyUIMessage;

/// A decoded progress notification for the current session.
///
/// `prompt_id` is the job the server attributed the message to. Servers
/// that omit it leave the field `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProgressEvent {
    /// Step-level progress within a node (step `value` of `max`).
    Progress {
        value: i64,
        max: i64,
        prompt_id: Option<String>,
    },

    /// A node started executing.
    ExecutingNode {
        node_id: String,
        prompt_id: Option<String>,
    },

    /// Nodes whose outputs were served from cache.
    CachedExecution {
        nodes: Vec<String>,
        prompt_id: Option<String>,
    },

    /// A node finished and produced output.
    Completed {
        node_id: String,
        prompt_id: Option<String>,
    },

    /// The backend reports the whole graph as done.
    Finished { prompt_id: Option<String> },

    /// The backend reported an error, or a message could not be decoded.
    Error {
        message: String,
        prompt_id: Option<String>,
    },
}

impl ProgressEvent {
    /// Map a parsed message to an event. Messages that carry nothing the
    /// orchestrator acts on (queue status, execution start) map to `None`.
    pub fn from_message(message: ComfyUIMessage) -> Option<Self> {
        let prompt_id = message.prompt_id().map(str::to_string);
        match message {
            ComfyUIMessage::Progress(data) => Some(Self::Progress {
                value: data.value,
                max: data.max,
                prompt_id,
            }),
            ComfyUIMessage::Executing(data) => Some(match data.node {
                Some(node_id) => Self::ExecutingNode { node_id, prompt_id },
                None => Self::Finished { prompt_id },
            }),
            ComfyUIMessage::ExecutionCached(data) => Some(Self::CachedExecution {
                nodes: data.nodes,
                prompt_id,
            }),
            ComfyUIMessage::Executed(data) => Some(Self::Completed {
                node_id: data.node,
                prompt_id,
            }),
            ComfyUIMessage::ExecutionError(data) => Some(Self::Error {
                message: match (data.node_id, data.exception_type.as_str()) {
                    (Some(node), "") => format!("node {node}: {}", data.exception_message),
                    (Some(node), kind) => {
                        format!("node {node}: {kind}: {}", data.exception_message)
                    }
                    (None, _) => data.exception_message,
                },
                prompt_id,
            }),
            ComfyUIMessage::ExecutionInterrupted(data) => Some(Self::Error {
                message: match data.node_id {
                    Some(node) => format!("execution interrupted at node {node}"),
                    None => "execution interrupted".to_string(),
                },
                prompt_id,
            }),
            ComfyUIMessage::Status(_) | ComfyUIMessage::ExecutionStart(_) => None,
        }
    }

    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            Self::Progress { prompt_id, .. }
            | Self::ExecutingNode { prompt_id, .. }
            | Self::CachedExecution { prompt_id, .. }
            | Self::Completed { prompt_id, .. }
            | Self::Finished { prompt_id }
            | Self::Error { prompt_id, .. } => prompt_id.as_deref(),
        }
    }

    /// Human-readable status line for the operator log.
    pub fn describe(&self) -> String {
        match self {
            Self::Progress { value, max, .. } => format!("Progress: {value}/{max}"),
            Self::ExecutingNode { node_id, .. } => format!("Executing node: {node_id}"),
            Self::CachedExecution { nodes, .. } => {
                format!("Cached execution: {}", nodes.join(", "))
            }
            Self::Completed { node_id, .. } => format!("Executed node: {node_id}"),
            Self::Finished { .. } => "Execution finished".to_string(),
            Self::Error { message, .. } => format!("Error: {message}"),
        }
    }
}
