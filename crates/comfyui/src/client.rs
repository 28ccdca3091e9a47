//! WebSocket client for connecting to a ComfyUI instance.
//!
//! [`ComfyUIClient`] holds the connection configuration for a single
//! ComfyUI instance.  Call [`ComfyUIClient::connect`] to establish a
//! live [`ComfyUIConnection`] over WebSocket for one session.

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// Raw WebSocket stream type used for ComfyUI connections.
pub type ComfyUIWsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for a ComfyUI instance's event endpoint.
#[derive(Debug, Clone)]
pub struct ComfyUIClient {
    ws_url: String,
}

/// A live WebSocket connection to a ComfyUI instance.
///
/// Holds the underlying `WebSocketStream` plus the session identifier
/// the server uses to address progress messages.
pub struct ComfyUIConnection {
    /// Client ID sent during the WebSocket handshake.
    pub client_id: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: ComfyUIWsStream,
}

impl ComfyUIClient {
    /// Create a new client targeting a ComfyUI instance.
    ///
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:8188`.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// WebSocket base URL (e.g. `ws://host:8188`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// URL of the event endpoint for a given session.
    pub fn session_url(&self, client_id: &str) -> String {
        format!("{}/ws?clientId={}", self.ws_url, client_id)
    }

    /// Connect to the ComfyUI WebSocket endpoint.
    ///
    /// `client_id` is appended as a query parameter so that ComfyUI
    /// addresses progress messages for prompts submitted with the same ID
    /// to this connection.
    pub async fn connect(&self, client_id: &str) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let url = self.session_url(client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            client_id = %client_id,
            "Connected to ComfyUI at {}",
            self.ws_url,
        );

        Ok(ComfyUIConnection {
            client_id: client_id.to_string(),
            ws_stream,
        })
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}
