// SPDX-License-Identifier: MIT

//! Typed error handling for flowgraph-rs
//!
//! Every error kind maps to a machine-readable code. Structural violations and
//! missing nodes are user-correctable; graph corruption and unexpected dispatch
//! failures are not.

use thiserror::Error;

use crate::flow::node::NodeId;

/// Top-level error type for flowgraph-rs
#[derive(Debug, Error)]
pub enum FlowError {
    /// Structural violations and missing nodes
    #[error(transparent)]
    Node(#[from] NodeError),

    /// Adjacency structure errors
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Errors raised while walking a workflow
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Trash and restoration errors
    #[error(transparent)]
    Trash(#[from] TrashError),

    /// Configuration errors (invalid env values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Structural legality and lookup errors for automation nodes
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NodeError {
    #[error("The node {0} does not exist.")]
    DoesNotExist(NodeId),

    #[error("The node {0} does not belong to the workflow.")]
    NotInWorkflow(NodeId),

    #[error("Invalid reference node: {0}")]
    ReferenceNodeInvalid(String),

    #[error("Output '{output}' doesn't exist on node {node_id}")]
    MissingOutput { node_id: NodeId, output: String },

    #[error("A trigger node already exists in this workflow")]
    TriggerAlreadyExists,

    #[error("The first node of a workflow must be a trigger")]
    FirstNodeMustBeTrigger,

    #[error("A trigger node must be the first node of the workflow")]
    TriggerMustBeFirstNode,

    #[error("{0}")]
    NotDeletable(String),

    #[error("{0}")]
    NotReplaceable(String),

    #[error("{0}")]
    NotMovable(String),

    #[error("{0}")]
    MisconfiguredService(String),

    #[error("Unknown node type: {0}")]
    UnknownType(String),
}

/// Errors of the adjacency structure itself
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphError {
    #[error("Node {0} not found in the graph")]
    NodeNotFoundInGraph(NodeId),

    #[error("Invalid graph blob: {0}")]
    InvalidBlob(String),

    #[error("No {kind} mapping for '{key}'")]
    MissingMapping { kind: &'static str, key: String },

    #[error("Node {0} has more than one incoming edge")]
    MultipleIncomingEdges(NodeId),

    #[error("Node {0} is referenced but has no entry")]
    DanglingReference(NodeId),

    #[error("Node {0} is not reachable from the first node")]
    Unreachable(NodeId),
}

/// Errors raised while dispatching a workflow
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("The node {node_id} is misconfigured and cannot be dispatched. {message}")]
    Misconfigured { node_id: NodeId, message: String },

    #[error("The node {node_id} failed to dispatch: {message}")]
    Failed { node_id: NodeId, message: String },

    #[error("The container node {0} did not return a list of results to iterate on")]
    InvalidIterationData(NodeId),

    #[error("The workflow has no trigger node")]
    NoTrigger,
}

/// Trash service errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TrashError {
    #[error("The node {0} is not in the trash")]
    NotTrashed(NodeId),

    #[error("The node {0} is already in the trash")]
    AlreadyTrashed(NodeId),

    #[error("{0}")]
    RestorationDisallowed(String),
}

impl FlowError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            FlowError::Node(e) => e.code(),
            FlowError::Graph(e) => e.code(),
            FlowError::Dispatch(e) => e.code(),
            FlowError::Trash(e) => e.code(),
            FlowError::Config(_) => "ERROR_CONFIGURATION",
            FlowError::Io(_) => "ERROR_IO",
            FlowError::Json(_) | FlowError::Yaml(_) => "ERROR_SERIALIZATION",
        }
    }

    /// Whether the caller can fix the problem (4xx) rather than it being a
    /// bug or corrupted data (5xx).
    pub fn is_user_error(&self) -> bool {
        match self {
            FlowError::Node(_) | FlowError::Trash(_) => true,
            FlowError::Dispatch(e) => matches!(
                e,
                DispatchError::Misconfigured { .. } | DispatchError::NoTrigger
            ),
            _ => false,
        }
    }
}

impl NodeError {
    pub fn code(&self) -> &'static str {
        match self {
            NodeError::DoesNotExist(_) => "ERROR_AUTOMATION_NODE_DOES_NOT_EXIST",
            NodeError::NotInWorkflow(_) => "ERROR_AUTOMATION_NODE_NOT_IN_WORKFLOW",
            NodeError::ReferenceNodeInvalid(_) => "ERROR_AUTOMATION_NODE_REFERENCE_NODE_INVALID",
            NodeError::MissingOutput { .. } => "ERROR_AUTOMATION_NODE_MISSING_OUTPUT",
            NodeError::TriggerAlreadyExists => "ERROR_AUTOMATION_TRIGGER_NODE_ALREADY_EXISTS",
            NodeError::FirstNodeMustBeTrigger => "ERROR_AUTOMATION_FIRST_NODE_MUST_BE_TRIGGER",
            NodeError::TriggerMustBeFirstNode => "ERROR_AUTOMATION_TRIGGER_MUST_BE_FIRST_NODE",
            NodeError::NotDeletable(_) => "ERROR_AUTOMATION_NODE_NOT_DELETABLE",
            NodeError::NotReplaceable(_) => "ERROR_AUTOMATION_NODE_NOT_REPLACEABLE",
            NodeError::NotMovable(_) => "ERROR_AUTOMATION_NODE_NOT_MOVABLE",
            NodeError::MisconfiguredService(_) => "ERROR_AUTOMATION_NODE_MISCONFIGURED_SERVICE",
            NodeError::UnknownType(_) => "ERROR_AUTOMATION_NODE_TYPE_DOES_NOT_EXIST",
        }
    }
}

impl GraphError {
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::NodeNotFoundInGraph(_) => "ERROR_AUTOMATION_NODE_NOT_FOUND_IN_GRAPH",
            GraphError::InvalidBlob(_) => "ERROR_AUTOMATION_GRAPH_INVALID",
            GraphError::MissingMapping { .. } => "ERROR_AUTOMATION_GRAPH_MISSING_MAPPING",
            GraphError::MultipleIncomingEdges(_)
            | GraphError::DanglingReference(_)
            | GraphError::Unreachable(_) => "ERROR_AUTOMATION_GRAPH_CORRUPTED",
        }
    }
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Misconfigured { .. } => "ERROR_AUTOMATION_NODE_MISCONFIGURED_SERVICE",
            DispatchError::Failed { .. } => "ERROR_AUTOMATION_NODE_DISPATCH_FAILED",
            DispatchError::InvalidIterationData(_) => {
                "ERROR_AUTOMATION_NODE_INVALID_ITERATION_DATA"
            }
            DispatchError::NoTrigger => "ERROR_AUTOMATION_WORKFLOW_HAS_NO_TRIGGER",
        }
    }
}

impl TrashError {
    pub fn code(&self) -> &'static str {
        match self {
            TrashError::NotTrashed(_) => "ERROR_TRASH_ITEM_DOES_NOT_EXIST",
            TrashError::AlreadyTrashed(_) => "ERROR_TRASH_ITEM_ALREADY_TRASHED",
            TrashError::RestorationDisallowed(_) => "ERROR_CANNOT_RESTORE_ITEM",
        }
    }
}
