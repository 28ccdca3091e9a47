//! Speech-to-text for voice-supplied guidance.
//!
//! [`Transcriber`] turns an already-compressed audio clip into text.
//! [`GroqTranscriber`] implements it against an OpenAI-compatible
//! `/audio/transcriptions` endpoint (Groq by default).

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

/// Default OpenAI-compatible API base.
pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1";

/// English-only distilled Whisper model.
pub const DEFAULT_MODEL: &str = "distil-whisper-large-v3-en";

/// Filename sent with the audio part; the server sniffs the codec from it.
pub const AUDIO_FILENAME: &str = "audio.ogg";

const AUDIO_MIME: &str = "audio/ogg";

/// Converts recorded speech into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, TranscriptionError>;
}

/// Errors from transcription.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Transcription API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Invalid transcription response: {0}")]
    InvalidResponse(String),

    #[error("GROQ_API_KEY is not set")]
    MissingApiKey,

    #[error("Audio clip is empty")]
    EmptyAudio,
}

/// `verbose_json` carries segments and timings too; only the text is used.
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// HTTP transcriber for OpenAI-compatible speech endpoints.
#[derive(Clone)]
pub struct GroqTranscriber {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    language: String,
}

impl std::fmt::Debug for GroqTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqTranscriber")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl GroqTranscriber {
    pub fn new(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            language: "en".to_string(),
        }
    }

    /// Load credentials from the environment.
    ///
    /// | Env Var        | Default                            |
    /// |----------------|------------------------------------|
    /// | `GROQ_API_KEY` | required                           |
    /// | `GROQ_API_URL` | `https://api.groq.com/openai/v1`   |
    pub fn from_env() -> Result<Self, TranscriptionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, TranscriptionError> {
        let api_key = lookup("GROQ_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or(TranscriptionError::MissingApiKey)?;
        let api_url = lookup("GROQ_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        Ok(Self::new(api_key, api_url))
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl Transcriber for GroqTranscriber {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, TranscriptionError> {
        if audio.is_empty() {
            return Err(TranscriptionError::EmptyAudio);
        }
        let size_bytes = audio.len();

        let part = Part::bytes(audio)
            .file_name(AUDIO_FILENAME)
            .mime_str(AUDIO_MIME)?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", self.language.clone())
            .text("response_format", "verbose_json");

        tracing::debug!(model = %self.model, size_bytes, "Sending audio for transcription");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.api_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TranscriptionError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let parsed: TranscriptionResponse = serde_json::from_slice(&body)
            .map_err(|e| TranscriptionError::InvalidResponse(e.to_string()))?;

        let text = parsed.text.trim().to_string();
        tracing::info!(chars = text.len(), "Transcription received");
        Ok(text)
    }
}
