//! Wire-level data types shared by the ComfyUI REST client, the artifact
//! store, and the job submission client.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Key under which the 3D export nodes list their produced files.
pub const OUTPUT_RESULT_KEY: &str = "result";

/// Storage area of a file on the ComfyUI server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactCategory {
    Input,
    Output,
    Temp,
}

impl ArtifactCategory {
    /// Value used in the `type` form field / query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Temp => "temp",
        }
    }
}

impl fmt::Display for ArtifactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(Self::Input),
            "output" => Ok(Self::Output),
            "temp" => Ok(Self::Temp),
            other => Err(format!(
                "Unknown artifact category '{other}'. Must be one of: input, output, temp"
            )),
        }
    }
}

/// Reference to an image stored by `/upload/image`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    /// Stored filename (content-addressed by the uploader).
    pub name: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type")]
    pub category: ArtifactCategory,
}

/// Three-part address of a file served by `/view`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocator {
    pub filename: String,
    pub subfolder: String,
    pub category: ArtifactCategory,
}

/// Response returned by the ComfyUI `/prompt` endpoint after queuing a
/// workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct JobHandle {
    /// Server-assigned identifier for the queued prompt.
    #[serde(rename = "prompt_id")]
    pub job_id: String,
    /// Position in the execution queue.
    #[serde(rename = "number", default)]
    pub queue_position: i64,
    /// Per-node validation errors. Non-empty means the graph was rejected.
    #[serde(default)]
    pub node_errors: serde_json::Map<String, serde_json::Value>,
}

impl JobHandle {
    pub fn has_node_errors(&self) -> bool {
        !self.node_errors.is_empty()
    }
}

/// One entry of the `/history/{prompt_id}` response.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub prompt: serde_json::Value,
    /// Node ID -> produced-file descriptors.
    #[serde(default)]
    pub outputs: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub status: serde_json::Value,
    #[serde(default)]
    pub meta: serde_json::Value,
}

/// Where to look for an artifact when the history entry only carries a
/// bare filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDefaults {
    pub subfolder: String,
    pub category: ArtifactCategory,
}

impl Default for OutputDefaults {
    fn default() -> Self {
        Self {
            subfolder: "3D".to_string(),
            category: ArtifactCategory::Output,
        }
    }
}

impl HistoryRecord {
    /// Resolve the first produced file of `node_id` into a locator.
    ///
    /// Accepts either a bare filename (`"chair.glb"`) or a ComfyUI file
    /// descriptor (`{"filename": .., "subfolder": .., "type": ..}`);
    /// missing descriptor fields fall back to `defaults`.
    pub fn output_locator(&self, node_id: &str, defaults: &OutputDefaults) -> Option<ArtifactLocator> {
        let first = self
            .outputs
            .get(node_id)?
            .get(OUTPUT_RESULT_KEY)?
            .as_array()?
            .first()?;

        match first {
            serde_json::Value::String(filename) => Some(ArtifactLocator {
                filename: filename.clone(),
                subfolder: defaults.subfolder.clone(),
                category: defaults.category,
            }),
            serde_json::Value::Object(desc) => {
                let filename = desc.get("filename")?.as_str()?.to_string();
                let subfolder = desc
                    .get("subfolder")
                    .and_then(|v| v.as_str())
                    .map_or_else(|| defaults.subfolder.clone(), str::to_string);
                let category = desc
                    .get("type")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.category);
                Some(ArtifactLocator {
                    filename,
                    subfolder,
                    category,
                })
            }
            _ => None,
        }
    }
}
