// SPDX-License-Identifier: MIT

//! Node type descriptors and their structural legality hooks
//!
//! Each registered type belongs to one of four kinds. The kind decides which
//! structural edits are legal: a trigger only lives at the root, a container
//! owns children, a router owns its branch outputs, an action is free.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::scripted::ScriptedService;
use crate::automation::workflow::Workflow;
use crate::flow::{AutomationNode, FlowError, NodeError, Placement, Service};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Trigger,
    Action,
    Container,
    Router,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Trigger => "trigger",
            NodeKind::Action => "action",
            NodeKind::Container => "container",
            NodeKind::Router => "router",
        };
        f.write_str(name)
    }
}

/// Descriptor of a node type.
///
/// The `before_*` hooks run before the matching mutation and must leave the
/// workflow untouched when they fail.
pub trait NodeType: Send + Sync {
    fn type_name(&self) -> &str;

    fn kind(&self) -> NodeKind;

    fn is_workflow_trigger(&self) -> bool {
        self.kind() == NodeKind::Trigger
    }

    fn is_container(&self) -> bool {
        self.kind() == NodeKind::Container
    }

    /// Triggers replace triggers and actions replace actions
    fn is_replaceable_with(&self, other: &dyn NodeType) -> bool {
        self.is_workflow_trigger() == other.is_workflow_trigger()
    }

    /// Build the service of a node of this type from its configuration
    fn build_service(&self, config: &Value) -> Result<Arc<dyn Service>, NodeError>;

    /// Complete the configuration of a freshly created node
    fn prepare_config(&self, config: Value) -> Value {
        config
    }

    fn before_create(
        &self,
        workflow: &Workflow,
        reference: Option<&AutomationNode>,
        _placement: Placement,
        _output: &str,
    ) -> Result<(), FlowError> {
        if self.is_workflow_trigger() {
            if workflow.graph().root().is_some() {
                return Err(NodeError::TriggerAlreadyExists.into());
            }
            if reference.is_some() {
                return Err(NodeError::TriggerMustBeFirstNode.into());
            }
        } else if reference.is_none() {
            return Err(NodeError::FirstNodeMustBeTrigger.into());
        }
        Ok(())
    }

    fn before_delete(&self, workflow: &Workflow, node: &AutomationNode) -> Result<(), FlowError> {
        match self.kind() {
            NodeKind::Trigger => {
                if !workflow.graph().next_nodes(node.id, None)?.is_empty() {
                    return Err(NodeError::NotDeletable(
                        "Trigger nodes cannot be deleted if they are followed by other nodes."
                            .to_string(),
                    )
                    .into());
                }
            }
            NodeKind::Container => {
                if !workflow.graph().children(node.id)?.is_empty() {
                    return Err(NodeError::NotDeletable(
                        "Container nodes cannot be deleted if they have one or more children nodes."
                            .to_string(),
                    )
                    .into());
                }
            }
            NodeKind::Router => {
                if has_node_on_edge(workflow, node)? {
                    return Err(NodeError::NotDeletable(
                        "Router nodes cannot be deleted if they have one or more output nodes."
                            .to_string(),
                    )
                    .into());
                }
            }
            NodeKind::Action => {}
        }
        Ok(())
    }

    fn before_replace(
        &self,
        workflow: &Workflow,
        node: &AutomationNode,
        new_type: &dyn NodeType,
    ) -> Result<(), FlowError> {
        match self.kind() {
            NodeKind::Container if !workflow.graph().children(node.id)?.is_empty() => {
                return Err(NodeError::NotReplaceable(
                    "Container nodes cannot be replaced if they have one or more children nodes."
                        .to_string(),
                )
                .into());
            }
            NodeKind::Router if has_node_on_edge(workflow, node)? => {
                return Err(NodeError::NotReplaceable(
                    "Router nodes cannot be replaced if they have one or more output nodes."
                        .to_string(),
                )
                .into());
            }
            _ => {}
        }

        if !self.is_replaceable_with(new_type) {
            return Err(NodeError::NotReplaceable(format!(
                "A {} node cannot be replaced with a {} node.",
                self.kind(),
                new_type.kind()
            ))
            .into());
        }
        Ok(())
    }

    fn before_move(
        &self,
        workflow: &Workflow,
        node: &AutomationNode,
        reference: Option<&AutomationNode>,
        _placement: Placement,
        _output: &str,
    ) -> Result<(), FlowError> {
        match self.kind() {
            NodeKind::Trigger => {
                return Err(
                    NodeError::NotMovable("Trigger nodes cannot be moved.".to_string()).into(),
                )
            }
            NodeKind::Router if has_node_on_edge(workflow, node)? => {
                return Err(NodeError::NotMovable(
                    "Router nodes cannot be moved if they have one or more output nodes."
                        .to_string(),
                )
                .into());
            }
            NodeKind::Container => {
                if let Some(reference) = reference {
                    if workflow.graph().descendants(node.id)?.contains(&reference.id) {
                        return Err(NodeError::NotMovable(
                            "A container node cannot be moved inside itself.".to_string(),
                        )
                        .into());
                    }
                }
            }
            _ => {}
        }

        if reference.is_none() {
            return Err(NodeError::FirstNodeMustBeTrigger.into());
        }
        Ok(())
    }

    /// Check an update doesn't drop an output that still leads somewhere
    fn before_update(
        &self,
        workflow: &Workflow,
        node: &AutomationNode,
        new_service: &dyn Service,
    ) -> Result<(), FlowError> {
        if self.kind() != NodeKind::Router {
            return Ok(());
        }

        let kept: Vec<String> = new_service.edges().into_iter().map(|e| e.uid).collect();
        for edge in node.service.edges() {
            if edge.uid.is_empty() || kept.contains(&edge.uid) {
                continue;
            }
            if !workflow.graph().next_nodes(node.id, Some(&edge.uid))?.is_empty() {
                return Err(NodeError::MisconfiguredService(format!(
                    "The edge '{}' cannot be removed as it has one or more output nodes.",
                    edge.label
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// Whether any non-default output of `node` leads to another node
pub fn has_node_on_edge(workflow: &Workflow, node: &AutomationNode) -> Result<bool, FlowError> {
    for edge in node.service.edges() {
        if edge.uid.is_empty() {
            continue;
        }
        if !workflow.graph().next_nodes(node.id, Some(&edge.uid))?.is_empty() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Node type backed by [`ScriptedService`]
#[derive(Debug, Clone)]
pub struct BuiltinNodeType {
    name: String,
    kind: NodeKind,
}

impl BuiltinNodeType {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

impl NodeType for BuiltinNodeType {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn build_service(&self, config: &Value) -> Result<Arc<dyn Service>, NodeError> {
        Ok(Arc::new(ScriptedService::from_value(config)?))
    }

    /// Routers start with one branch
    fn prepare_config(&self, config: Value) -> Value {
        if self.kind != NodeKind::Router {
            return config;
        }

        let mut config = match config {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let has_edges = config
            .get("edges")
            .and_then(Value::as_array)
            .is_some_and(|edges| !edges.is_empty());
        if !has_edges {
            config.insert(
                "edges".to_string(),
                json!([{"uid": Uuid::new_v4().to_string(), "label": "Branch"}]),
            );
        }
        Value::Object(config)
    }
}

/// Types available out of the box
pub fn builtin_types() -> Vec<Arc<dyn NodeType>> {
    [
        ("rows_created", NodeKind::Trigger),
        ("rows_updated", NodeKind::Trigger),
        ("periodic", NodeKind::Trigger),
        ("http_trigger", NodeKind::Trigger),
        ("create_row", NodeKind::Action),
        ("update_row", NodeKind::Action),
        ("http_request", NodeKind::Action),
        ("smtp_email", NodeKind::Action),
        ("iterator", NodeKind::Container),
        ("router", NodeKind::Router),
    ]
    .into_iter()
    .map(|(name, kind)| Arc::new(BuiltinNodeType::new(name, kind)) as Arc<dyn NodeType>)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaceable_pairs() {
        let trigger = BuiltinNodeType::new("periodic", NodeKind::Trigger);
        let other_trigger = BuiltinNodeType::new("rows_created", NodeKind::Trigger);
        let action = BuiltinNodeType::new("smtp_email", NodeKind::Action);
        let router = BuiltinNodeType::new("router", NodeKind::Router);

        assert!(trigger.is_replaceable_with(&other_trigger));
        assert!(action.is_replaceable_with(&router));
        assert!(!trigger.is_replaceable_with(&action));
        assert!(!action.is_replaceable_with(&trigger));
    }

    #[test]
    fn test_router_config_gets_a_branch() {
        let router = BuiltinNodeType::new("router", NodeKind::Router);
        let config = router.prepare_config(Value::Null);
        let edges = config["edges"].as_array().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0]["label"], "Branch");
        assert!(Uuid::parse_str(edges[0]["uid"].as_str().unwrap()).is_ok());

        let configured = json!({"edges": [{"uid": "a", "label": "A"}]});
        assert_eq!(router.prepare_config(configured.clone()), configured);
    }

    #[test]
    fn test_action_config_is_untouched() {
        let action = BuiltinNodeType::new("http_request", NodeKind::Action);
        assert_eq!(action.prepare_config(json!({"data": 1})), json!({"data": 1}));
    }

    #[test]
    fn test_builtin_types_cover_every_kind() {
        let types = builtin_types();
        for kind in [
            NodeKind::Trigger,
            NodeKind::Action,
            NodeKind::Container,
            NodeKind::Router,
        ] {
            assert!(types.iter().any(|t| t.kind() == kind), "missing {}", kind);
        }
        assert!(types.iter().any(|t| t.type_name() == "iterator" && t.is_container()));
    }
}
