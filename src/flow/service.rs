use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::flow::context::DispatchContext;
use crate::flow::node::AutomationNode;

/// An output of a service. The default output has an empty uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub uid: String,
    #[serde(default)]
    pub label: String,
}

impl Edge {
    pub fn new(uid: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            label: label.into(),
        }
    }

    /// The default output every service exposes
    pub fn default_output() -> Self {
        Self::new("", "")
    }
}

fn default_status() -> u16 {
    200
}

/// What a service hands back after dispatching a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub data: Value,
    /// Output taken by this dispatch. Empty means the default output.
    #[serde(default)]
    pub output_uid: String,
    #[serde(default = "default_status")]
    pub status: u16,
}

impl DispatchResult {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            output_uid: String::new(),
            status: default_status(),
        }
    }

    pub fn with_output(mut self, uid: impl Into<String>) -> Self {
        self.output_uid = uid.into();
        self
    }

    /// Number of iterations a container runs for this result, read from
    /// `data["results"]`.
    pub fn iteration_count(&self) -> Option<usize> {
        self.data.get("results")?.as_array().map(Vec::len)
    }
}

/// Errors a service can raise while dispatching
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    /// The service configuration is incomplete or invalid
    #[error("{0}")]
    ImproperlyConfigured(String),

    #[error("{0}")]
    Failed(String),
}

/// The action a node performs when dispatched.
///
/// Implementations own their configuration; the engine only sees the
/// outputs they expose and the result of a dispatch.
#[async_trait]
pub trait Service: Send + Sync {
    /// Outputs exposed by this service. Always includes the default output.
    fn edges(&self) -> Vec<Edge>;

    /// Configuration snapshot, used for export and duplication
    fn export(&self) -> Value;

    /// Run the service for `node` with the results gathered so far
    async fn dispatch(
        &self,
        node: &AutomationNode,
        context: &DispatchContext,
    ) -> Result<DispatchResult, ServiceError>;

    /// Label of the output with the given uid
    fn edge_label(&self, uid: &str) -> Option<String> {
        self.edges()
            .into_iter()
            .find(|edge| edge.uid == uid)
            .map(|edge| edge.label)
    }
}
