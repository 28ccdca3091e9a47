//! Workflow templates and job submission.
//!
//! A workflow template is a ComfyUI API-format graph (`node id ->
//! {class_type, inputs}`) stored as JSON. The client treats it as opaque
//! except for two injection points: the node that loads the uploaded
//! sketch and the node that receives the text guidance.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::{ComfyBackend, ComfyUIApiError};
use crate::types::{ImageReference, JobHandle};

/// Input field set on the image injection node.
pub const IMAGE_INPUT: &str = "image";

/// Input field set on the text injection node.
pub const TEXT_INPUT: &str = "text";

/// Node IDs of the two mutable slots in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionPoints {
    /// Node whose `inputs.image` receives the uploaded filename.
    pub image_node: String,
    /// Node whose `inputs.text` receives the guidance text.
    pub text_node: String,
}

impl Default for InjectionPoints {
    fn default() -> Self {
        Self {
            image_node: "196".to_string(),
            text_node: "192".to_string(),
        }
    }
}

/// Errors from template handling and submission.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Failed to read workflow template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workflow template is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Workflow template must be a JSON object keyed by node id")]
    NotAnObject,

    #[error("Workflow template has no {role} node '{node_id}'")]
    MissingNode { role: &'static str, node_id: String },

    #[error("Workflow node '{node_id}' has no inputs object")]
    MissingInputs { node_id: String },

    /// The queue request failed.
    #[error(transparent)]
    Api(ComfyUIApiError),

    /// ComfyUI accepted the request but reported per-node errors.
    #[error("ComfyUI rejected the workflow: {node_errors}")]
    Rejected { node_errors: serde_json::Value },
}

impl WorkflowError {
    /// True for errors caused by the template itself (deployment
    /// problems), as opposed to the backend's answer.
    pub fn is_template_error(&self) -> bool {
        matches!(
            self,
            Self::Read { .. }
                | Self::Parse(_)
                | Self::NotAnObject
                | Self::MissingNode { .. }
                | Self::MissingInputs { .. }
        )
    }
}

impl From<ComfyUIApiError> for WorkflowError {
    fn from(err: ComfyUIApiError) -> Self {
        match err {
            ComfyUIApiError::NodeErrors(node_errors) => Self::Rejected { node_errors },
            other => Self::Api(other),
        }
    }
}

/// A parsed workflow graph.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    graph: serde_json::Map<String, serde_json::Value>,
}

impl WorkflowTemplate {
    /// Read and parse a template file.
    pub async fn load(path: &Path) -> Result<Self, WorkflowError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| WorkflowError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, WorkflowError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, WorkflowError> {
        match value {
            serde_json::Value::Object(graph) => Ok(Self { graph }),
            _ => Err(WorkflowError::NotAnObject),
        }
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.graph.keys().map(String::as_str)
    }

    /// Check that both injection points exist and have an `inputs` object.
    pub fn validate(&self, points: &InjectionPoints) -> Result<(), WorkflowError> {
        for (role, node_id) in [("image", &points.image_node), ("text", &points.text_node)] {
            let node = self
                .graph
                .get(node_id)
                .ok_or_else(|| WorkflowError::MissingNode {
                    role,
                    node_id: node_id.clone(),
                })?;
            if !node.get("inputs").is_some_and(serde_json::Value::is_object) {
                return Err(WorkflowError::MissingInputs {
                    node_id: node_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Produce a concrete job graph with the image filename and guidance
    /// text written into the injection points. The template is unchanged.
    pub fn inject(
        &self,
        points: &InjectionPoints,
        image_name: &str,
        guidance: &str,
    ) -> Result<serde_json::Value, WorkflowError> {
        self.validate(points)?;

        let mut graph = self.graph.clone();
        set_input(&mut graph, &points.image_node, IMAGE_INPUT, image_name);
        set_input(&mut graph, &points.text_node, TEXT_INPUT, guidance);
        Ok(serde_json::Value::Object(graph))
    }
}

fn set_input(
    graph: &mut serde_json::Map<String, serde_json::Value>,
    node_id: &str,
    input: &str,
    value: &str,
) {
    if let Some(inputs) = graph
        .get_mut(node_id)
        .and_then(|node| node.get_mut("inputs"))
        .and_then(serde_json::Value::as_object_mut)
    {
        inputs.insert(input.to_string(), serde_json::Value::String(value.to_string()));
    }
}

/// Loads the template, injects per-request values and queues the job.
#[derive(Clone)]
pub struct JobSubmitter {
    backend: Arc<dyn ComfyBackend>,
    template_path: PathBuf,
    points: InjectionPoints,
}

impl JobSubmitter {
    pub fn new(
        backend: Arc<dyn ComfyBackend>,
        template_path: impl Into<PathBuf>,
        points: InjectionPoints,
    ) -> Self {
        Self {
            backend,
            template_path: template_path.into(),
            points,
        }
    }

    /// Queue a job for `image_ref` guided by `guidance`.
    ///
    /// The template is re-read on every call; template problems are
    /// reported before anything is sent to the queue endpoint.
    pub async fn submit(
        &self,
        image_ref: &ImageReference,
        guidance: &str,
        client_id: &str,
    ) -> Result<JobHandle, WorkflowError> {
        let template = WorkflowTemplate::load(&self.template_path).await?;
        let graph = template.inject(&self.points, &image_ref.name, guidance)?;

        let handle = self.backend.submit_workflow(&graph, client_id).await?;
        if handle.has_node_errors() {
            return Err(WorkflowError::Rejected {
                node_errors: serde_json::Value::Object(handle.node_errors),
            });
        }

        tracing::info!(
            prompt_id = %handle.job_id,
            queue_position = handle.queue_position,
            client_id = %client_id,
            "Workflow submitted to ComfyUI",
        );
        Ok(handle)
    }
}
