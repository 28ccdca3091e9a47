//! Progress event stream for a single generation session.
//!
//! Reads raw frames from a ComfyUI WebSocket connection, parses them
//! into typed [`ComfyUIMessage`](crate::messages::ComfyUIMessage)
//! variants and hands them out one [`ProgressEvent`] at a time.  The
//! consumer pulls events at its own pace; nothing is buffered beyond what
//! the socket already holds.
//!
//! [`CompletionTracker`] decides which events end the stream for the
//! orchestrator: completion of the designated output node, or an error.
//! Prompts queued without a client ID are broadcast to every socket, so
//! the tracker also drops events that name a different prompt.

use async_trait::async_trait;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;

use crate::client::{ComfyUIClient, ComfyUIClientError, ComfyUIConnection, ComfyUIWsStream};
use crate::events::ProgressEvent;
use crate::messages::{parse_message, MessageError};

/// Opens per-session event streams.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Establish a persistent connection keyed by `session_id`.
    async fn open(&self, session_id: &str) -> Result<Box<dyn EventStream>, ComfyUIClientError>;
}

/// A pull-based, non-restartable sequence of progress events.
#[async_trait]
pub trait EventStream: Send {
    /// Wait for the next event. Returns `None` once the connection has
    /// closed or failed; every later call also returns `None`.
    async fn next_event(&mut self) -> Option<ProgressEvent>;

    /// Release the connection. Calling it again is a no-op.
    async fn close(&mut self);
}

#[async_trait]
impl EventSource for ComfyUIClient {
    async fn open(&self, session_id: &str) -> Result<Box<dyn EventStream>, ComfyUIClientError> {
        let conn = self.connect(session_id).await?;
        Ok(Box::new(ProgressStream::new(conn)))
    }
}

/// [`EventStream`] over a live ComfyUI WebSocket connection.
pub struct ProgressStream {
    client_id: String,
    ws_stream: Option<ComfyUIWsStream>,
    exhausted: bool,
}

impl ProgressStream {
    pub fn new(conn: ComfyUIConnection) -> Self {
        Self {
            client_id: conn.client_id,
            ws_stream: Some(conn.ws_stream),
            exhausted: false,
        }
    }
}

#[async_trait]
impl EventStream for ProgressStream {
    async fn next_event(&mut self) -> Option<ProgressEvent> {
        if self.exhausted {
            return None;
        }
        let ws_stream = self.ws_stream.as_mut()?;

        while let Some(msg_result) = ws_stream.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    if let Some(event) = decode_frame(&text) {
                        return Some(event);
                    }
                }
                Ok(Message::Binary(_)) => {
                    // ComfyUI sends binary messages for preview images.
                    tracing::trace!(client_id = %self.client_id, "Ignoring binary message (preview image)");
                }
                Ok(Message::Ping(_) | Message::Pong(_)) => {
                    // Handled automatically by tungstenite.
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!(client_id = %self.client_id, ?frame, "ComfyUI WebSocket closed");
                    break;
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => {
                    tracing::error!(client_id = %self.client_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }

        self.exhausted = true;
        None
    }

    async fn close(&mut self) {
        self.exhausted = true;
        if let Some(mut ws_stream) = self.ws_stream.take() {
            if let Err(e) = ws_stream.close(None).await {
                tracing::debug!(client_id = %self.client_id, error = %e, "WebSocket close handshake failed");
            }
            tracing::info!(client_id = %self.client_id, "Progress stream closed");
        }
    }
}

impl Drop for ProgressStream {
    fn drop(&mut self) {
        if self.ws_stream.is_some() {
            tracing::debug!(client_id = %self.client_id, "Progress stream dropped without close; socket released");
        }
    }
}

/// Decode one text frame.
///
/// Frames of a type this client does not model are skipped (`None`);
/// frames that fail to decode become [`ProgressEvent::Error`] so the
/// consumer decides whether that is fatal.
pub fn decode_frame(text: &str) -> Option<ProgressEvent> {
    match parse_message(text) {
        Ok(msg) => ProgressEvent::from_message(msg),
        Err(MessageError::UnknownType(kind)) => {
            tracing::trace!(kind = %kind, "Skipping unhandled ComfyUI message type");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, raw_message = %text, "Failed to parse ComfyUI message");
            Some(ProgressEvent::Error {
                message: format!("Error processing message: {e}"),
                prompt_id: None,
            })
        }
    }
}

/// How an event affects consumption of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    /// Advisory event; carries the status line to surface.
    Informational(String),
    /// The event belongs to another prompt and is not surfaced.
    Unrelated,
    /// The designated output node is done.
    Succeeded,
    /// Generation failed; carries the reason.
    Failed(String),
}

/// Recognises the terminal event for one job graph.
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    job_id: String,
    output_node: String,
    output_cached: bool,
}

impl CompletionTracker {
    /// * `job_id` - prompt ID returned by the queue endpoint.
    /// * `output_node` - node ID whose `executed` message means success.
    pub fn new(job_id: impl Into<String>, output_node: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            output_node: output_node.into(),
            output_cached: false,
        }
    }

    pub fn output_node(&self) -> &str {
        &self.output_node
    }

    /// Classify an event.
    ///
    /// Events without a prompt ID are attributed to this job. A cached
    /// output node produces no `executed` message, so the graph-finished
    /// marker counts as success once the output node has been reported
    /// cached.
    pub fn observe(&mut self, event: &ProgressEvent) -> StreamSignal {
        if event.prompt_id().is_some_and(|id| id != self.job_id) {
            return StreamSignal::Unrelated;
        }

        match event {
            ProgressEvent::Completed { node_id, .. } if *node_id == self.output_node => {
                StreamSignal::Succeeded
            }
            ProgressEvent::CachedExecution { nodes, .. } => {
                if nodes.iter().any(|n| *n == self.output_node) {
                    self.output_cached = true;
                }
                StreamSignal::Informational(event.describe())
            }
            ProgressEvent::Finished { .. } if self.output_cached => StreamSignal::Succeeded,
            ProgressEvent::Finished { .. } => StreamSignal::Failed(format!(
                "execution finished without output from node {}",
                self.output_node
            )),
            ProgressEvent::Error { message, .. } => StreamSignal::Failed(message.clone()),
            other => StreamSignal::Informational(other.describe()),
        }
    }
}
