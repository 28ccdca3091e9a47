//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the ComfyUI HTTP API (image upload, workflow submission, queue
//! deletion, history retrieval, file download) using [`reqwest`], behind
//! the [`ComfyBackend`] trait so that the store, the submitter, and the
//! orchestrator can run against an in-memory fake in tests.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;

use crate::types::{ArtifactCategory, ArtifactLocator, HistoryRecord, ImageReference, JobHandle};

/// The HTTP surface of a ComfyUI server used by this client.
#[async_trait]
pub trait ComfyBackend: Send + Sync {
    /// `POST /upload/image` with the encoded image as a multipart file.
    async fn upload_image(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<ImageReference, ComfyUIApiError>;

    /// `POST /prompt` with the workflow graph and the session client ID.
    async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<JobHandle, ComfyUIApiError>;

    /// `POST /queue` asking ComfyUI to drop a queued prompt.
    async fn cancel_execution(&self, prompt_id: &str) -> Result<(), ComfyUIApiError>;

    /// `GET /history/{prompt_id}`, unwrapped to the entry for that prompt.
    async fn get_history(&self, prompt_id: &str) -> Result<HistoryRecord, ComfyUIApiError>;

    /// `GET /view` for a stored or generated file.
    async fn view(&self, locator: &ArtifactLocator) -> Result<Vec<u8>, ComfyUIApiError>;
}

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// ComfyUI refused the workflow graph during validation. Holds the
    /// `node_errors` object keyed by node id.
    #[error("ComfyUI rejected the workflow: {0}")]
    NodeErrors(serde_json::Value),

    /// The requested file or history entry does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The response body could not be decoded into the expected shape.
    #[error("Invalid response from ComfyUI: {0}")]
    InvalidResponse(String),
}

/// Body shape ComfyUI uses when `/prompt` fails validation (HTTP 400).
#[derive(Debug, serde::Deserialize)]
struct ValidationFailure {
    #[serde(default)]
    node_errors: serde_json::Map<String, serde_json::Value>,
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for sharing a connection pool with other clients).
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    ///
    /// Decoding failures are reported as [`ComfyUIApiError::InvalidResponse`]
    /// rather than as transport errors.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            ComfyUIApiError::InvalidResponse(format!(
                "{e} (body: {})",
                String::from_utf8_lossy(&body)
            ))
        })
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ComfyUIApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ComfyBackend for ComfyUIApi {
    async fn upload_image(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<ImageReference, ComfyUIApiError> {
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime)?;
        let form = Form::new()
            .part("image", part)
            .text("type", ArtifactCategory::Input.as_str())
            .text("overwrite", "false");

        tracing::debug!(filename, "Uploading image to ComfyUI");

        let response = self
            .client
            .post(format!("{}/upload/image", self.api_url))
            .multipart(form)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Sends `{"prompt": .., "client_id": ..}`.  A validation failure
    /// (HTTP 400 carrying `node_errors`) is surfaced as
    /// [`ComfyUIApiError::NodeErrors`].
    async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<JobHandle, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::BAD_REQUEST {
            let text = response.text().await?;
            return match serde_json::from_str::<ValidationFailure>(&text) {
                Ok(failure) if !failure.node_errors.is_empty() => {
                    Err(ComfyUIApiError::NodeErrors(serde_json::Value::Object(
                        failure.node_errors,
                    )))
                }
                _ => Err(ComfyUIApiError::ApiError {
                    status: StatusCode::BAD_REQUEST.as_u16(),
                    body: text,
                }),
            };
        }

        Self::parse_response(response).await
    }

    async fn cancel_execution(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let body = serde_json::json!({
            "delete": [prompt_id],
        });

        let response = self
            .client
            .post(format!("{}/queue", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// ComfyUI answers `{}` for unknown prompts; that case is reported as
    /// [`ComfyUIApiError::NotFound`].
    async fn get_history(&self, prompt_id: &str) -> Result<HistoryRecord, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        let mut history: serde_json::Map<String, serde_json::Value> =
            Self::parse_response(response).await?;

        let entry = history
            .remove(prompt_id)
            .ok_or_else(|| ComfyUIApiError::NotFound(format!("history for prompt {prompt_id}")))?;

        serde_json::from_value(entry)
            .map_err(|e| ComfyUIApiError::InvalidResponse(format!("history entry: {e}")))
    }

    async fn view(&self, locator: &ArtifactLocator) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[
                ("filename", locator.filename.as_str()),
                ("subfolder", locator.subfolder.as_str()),
                ("type", locator.category.as_str()),
            ])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ComfyUIApiError::NotFound(format!(
                "{} in {}/{}",
                locator.filename, locator.category, locator.subfolder
            )));
        }

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
