use std::path::PathBuf;
use std::time::Duration;

use sketch3d_comfyui::types::{ArtifactCategory, OutputDefaults};
use sketch3d_comfyui::workflow::InjectionPoints;

/// Default ComfyUI HTTP base URL.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8188";

/// Default workflow template location, relative to the working directory.
pub const DEFAULT_TEMPLATE_PATH: &str = "prompts/sketch23d_api_faster.json";

/// Default node whose `executed` message marks the 3D export as done.
pub const DEFAULT_OUTPUT_NODE: &str = "154";

/// Pipeline configuration loaded from environment variables.
///
/// All fields have defaults that match the bundled workflow template
/// and a ComfyUI instance on the local machine.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// ComfyUI HTTP base URL.
    pub api_url: String,
    /// ComfyUI WebSocket base URL (derived from `api_url` unless set).
    pub ws_url: String,
    /// Path of the API-format workflow template.
    pub template_path: PathBuf,
    /// Node ids receiving the sketch filename and guidance text.
    pub injection: InjectionPoints,
    /// Node id whose completion means the model is ready.
    pub output_node: String,
    /// Where bare output filenames live on the server.
    pub output: OutputDefaults,
    /// Pause between the completion signal and the history lookup.
    pub finalize_grace: Duration,
    /// Upper bound on the time spent waiting for progress events.
    pub stream_timeout: Duration,
}

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: "ws://127.0.0.1:8188".to_string(),
            template_path: PathBuf::from(DEFAULT_TEMPLATE_PATH),
            injection: InjectionPoints::default(),
            output_node: DEFAULT_OUTPUT_NODE.to_string(),
            output: OutputDefaults::default(),
            finalize_grace: Duration::from_millis(1000),
            stream_timeout: Duration::from_secs(600),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                               |
    /// |--------------------------|---------------------------------------|
    /// | `COMFYUI_API_URL`        | `http://127.0.0.1:8188`               |
    /// | `COMFYUI_WS_URL`         | API URL with `ws://` / `wss://`       |
    /// | `WORKFLOW_TEMPLATE_PATH` | `prompts/sketch23d_api_faster.json`   |
    /// | `WORKFLOW_IMAGE_NODE`    | `196`                                 |
    /// | `WORKFLOW_TEXT_NODE`     | `192`                                 |
    /// | `WORKFLOW_OUTPUT_NODE`   | `154`                                 |
    /// | `OUTPUT_SUBFOLDER`       | `3D`                                  |
    /// | `OUTPUT_TYPE`            | `output`                              |
    /// | `FINALIZE_GRACE_MS`      | `1000`                                |
    /// | `STREAM_TIMEOUT_SECS`    | `600`                                 |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading variables through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_url = var("COMFYUI_API_URL")
            .unwrap_or(defaults.api_url)
            .trim_end_matches('/')
            .to_string();

        let ws_url = match var("COMFYUI_WS_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => derive_ws_url(&api_url)?,
        };

        let template_path = var("WORKFLOW_TEMPLATE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.template_path);

        let injection = InjectionPoints {
            image_node: var("WORKFLOW_IMAGE_NODE").unwrap_or(defaults.injection.image_node),
            text_node: var("WORKFLOW_TEXT_NODE").unwrap_or(defaults.injection.text_node),
        };

        let output_node = var("WORKFLOW_OUTPUT_NODE").unwrap_or(defaults.output_node);

        let category = match var("OUTPUT_TYPE") {
            Some(value) => value
                .parse::<ArtifactCategory>()
                .map_err(|_| ConfigError::Invalid {
                    var: "OUTPUT_TYPE",
                    value,
                    expected: "one of input, output, temp",
                })?,
            None => defaults.output.category,
        };
        let output = OutputDefaults {
            subfolder: var("OUTPUT_SUBFOLDER").unwrap_or(defaults.output.subfolder),
            category,
        };

        let finalize_grace = match var("FINALIZE_GRACE_MS") {
            Some(value) => Duration::from_millis(parse_u64("FINALIZE_GRACE_MS", value)?),
            None => defaults.finalize_grace,
        };

        let stream_timeout = match var("STREAM_TIMEOUT_SECS") {
            Some(value) => match parse_u64("STREAM_TIMEOUT_SECS", value.clone())? {
                0 => {
                    return Err(ConfigError::Invalid {
                        var: "STREAM_TIMEOUT_SECS",
                        value,
                        expected: "a positive number of seconds",
                    })
                }
                secs => Duration::from_secs(secs),
            },
            None => defaults.stream_timeout,
        };

        Ok(Self {
            api_url,
            ws_url,
            template_path,
            injection,
            output_node,
            output,
            finalize_grace,
            stream_timeout,
        })
    }
}

/// Map an HTTP base URL onto the matching WebSocket scheme.
pub fn derive_ws_url(api_url: &str) -> Result<String, ConfigError> {
    let trimmed = api_url.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("https://") {
        Ok(format!("wss://{rest}"))
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        Ok(format!("ws://{rest}"))
    } else {
        Err(ConfigError::Invalid {
            var: "COMFYUI_API_URL",
            value: api_url.to_string(),
            expected: "an http:// or https:// URL",
        })
    }
}

fn parse_u64(var: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        var,
        value,
        expected: "a non-negative integer",
    })
}
