// SPDX-License-Identifier: MIT

//! Node primitives shared by the graph, the node types and the dispatcher

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::flow::service::Service;

/// Identifier of an automation node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Identifier of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub u64);

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self(1)
    }
}

/// Where a node sits relative to its reference node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// Follows the reference on one of its outputs
    #[default]
    South,
    /// First child of a container reference
    Child,
}

impl Placement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Placement::South => "south",
            Placement::Child => "child",
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A slot in the graph: `(reference, placement, output)`.
///
/// A `None` reference designates the root slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub reference: Option<NodeId>,
    #[serde(default)]
    pub placement: Placement,
    #[serde(default)]
    pub output: String,
}

impl Position {
    pub fn root() -> Self {
        Self {
            reference: None,
            placement: Placement::South,
            output: String::new(),
        }
    }

    pub fn south(reference: NodeId, output: impl Into<String>) -> Self {
        Self {
            reference: Some(reference),
            placement: Placement::South,
            output: output.into(),
        }
    }

    pub fn child(reference: NodeId) -> Self {
        Self {
            reference: Some(reference),
            placement: Placement::Child,
            output: String::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.reference.is_none()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reference {
            None => f.write_str("root"),
            Some(reference) if self.output.is_empty() => {
                write!(f, "{} of {}", self.placement, reference)
            }
            Some(reference) => {
                write!(f, "{} of {} on '{}'", self.placement, reference, self.output)
            }
        }
    }
}

/// A node of a workflow together with its configured service
#[derive(Clone)]
pub struct AutomationNode {
    pub id: NodeId,
    pub workflow_id: WorkflowId,
    /// Registered node type name
    pub node_type: String,
    pub label: String,
    pub service: Arc<dyn Service>,
}

impl AutomationNode {
    /// Label used when rendering the graph. Falls back to the type name.
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.node_type
        } else {
            &self.label
        }
    }

    /// Whether the service exposes the given output uid
    pub fn has_output(&self, uid: &str) -> bool {
        self.service.edges().iter().any(|edge| edge.uid == uid)
    }

    /// Serializable snapshot of this node
    pub fn export(&self) -> NodeExport {
        NodeExport {
            id: self.id,
            node_type: self.node_type.clone(),
            label: self.label.clone(),
            service: self.service.export(),
        }
    }
}

impl fmt::Debug for AutomationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutomationNode")
            .field("id", &self.id)
            .field("workflow_id", &self.workflow_id)
            .field("node_type", &self.node_type)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Export form of a node, used by fixtures and workflow duplication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExport {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub service: Value,
}
