//! Undoable node actions
//!
//! Each `do_*` function performs a mutation through [`NodeService`] and
//! returns the action describing it. Undoing an action applies its inverse
//! mutation; redoing it applies the original mutation again.

use crate::automation::service::{NodeService, NodeValues};
use crate::automation::workflow::Workflow;
use crate::flow::{AutomationNode, FlowError, NodeId, Position};

#[derive(Debug, Clone, PartialEq)]
pub enum NodeAction {
    Create {
        node_id: NodeId,
    },
    Update {
        node_id: NodeId,
        original_values: NodeValues,
        new_values: NodeValues,
    },
    Delete {
        node_id: NodeId,
    },
    Duplicate {
        source_id: NodeId,
        node_id: NodeId,
    },
    Replace {
        node_id: NodeId,
        node_type: String,
        original_node_id: NodeId,
        original_node_type: String,
    },
    Move {
        node_id: NodeId,
        origin: Position,
        destination: Position,
    },
}

impl NodeAction {
    pub fn action_type(&self) -> &'static str {
        match self {
            NodeAction::Create { .. } => "create_automation_node",
            NodeAction::Update { .. } => "update_automation_node",
            NodeAction::Delete { .. } => "delete_automation_node",
            NodeAction::Duplicate { .. } => "duplicate_automation_node",
            NodeAction::Replace { .. } => "replace_automation_node",
            NodeAction::Move { .. } => "move_automation_node",
        }
    }

    pub fn description(&self) -> String {
        match self {
            NodeAction::Create { node_id } => format!("Node ({}) created", node_id),
            NodeAction::Update { node_id, .. } => format!("Node ({}) updated", node_id),
            NodeAction::Delete { node_id } => format!("Node ({}) deleted", node_id),
            NodeAction::Duplicate { source_id, node_id } => {
                format!("Node ({}) duplicated from ({})", node_id, source_id)
            }
            NodeAction::Replace {
                node_id,
                original_node_id,
                ..
            } => format!("Node ({}) replaced with ({})", original_node_id, node_id),
            NodeAction::Move { node_id, .. } => format!("Node ({}) moved", node_id),
        }
    }

    pub async fn undo(
        &self,
        service: &NodeService,
        workflow: &mut Workflow,
    ) -> Result<(), FlowError> {
        log::debug!("Undoing {}: {}", self.action_type(), self.description());
        match self {
            NodeAction::Create { node_id } | NodeAction::Duplicate { node_id, .. } => {
                service.delete_node(workflow, *node_id, None).await?;
            }
            NodeAction::Update {
                node_id,
                original_values,
                ..
            } => {
                service
                    .update_node(workflow, *node_id, original_values.clone())
                    .await?;
            }
            NodeAction::Delete { node_id } => {
                service.restore_node(workflow, *node_id).await?;
            }
            NodeAction::Replace {
                node_id,
                original_node_id,
                ..
            } => {
                service
                    .restore_replaced(workflow, *node_id, *original_node_id)
                    .await?;
            }
            NodeAction::Move { node_id, origin, .. } => {
                service.move_node(workflow, *node_id, origin).await?;
            }
        }
        Ok(())
    }

    pub async fn redo(
        &self,
        service: &NodeService,
        workflow: &mut Workflow,
    ) -> Result<(), FlowError> {
        log::debug!("Redoing {}: {}", self.action_type(), self.description());
        match self {
            NodeAction::Create { node_id } | NodeAction::Duplicate { node_id, .. } => {
                service.restore_node(workflow, *node_id).await?;
            }
            NodeAction::Update {
                node_id,
                new_values,
                ..
            } => {
                service
                    .update_node(workflow, *node_id, new_values.clone())
                    .await?;
            }
            NodeAction::Delete { node_id } => {
                service.delete_node(workflow, *node_id, None).await?;
            }
            NodeAction::Replace {
                node_id,
                original_node_id,
                ..
            } => {
                service
                    .restore_replaced(workflow, *original_node_id, *node_id)
                    .await?;
            }
            NodeAction::Move {
                node_id,
                destination,
                ..
            } => {
                service.move_node(workflow, *node_id, destination).await?;
            }
        }
        Ok(())
    }
}

pub async fn do_create(
    service: &NodeService,
    workflow: &mut Workflow,
    node_type: &str,
    values: NodeValues,
    position: &Position,
) -> Result<(AutomationNode, NodeAction), FlowError> {
    let node = service.create_node(workflow, node_type, values, position).await?;
    let action = NodeAction::Create { node_id: node.id };
    Ok((node, action))
}

pub async fn do_update(
    service: &NodeService,
    workflow: &mut Workflow,
    node_id: NodeId,
    values: NodeValues,
) -> Result<(AutomationNode, NodeAction), FlowError> {
    let updated = service.update_node(workflow, node_id, values).await?;
    let action = NodeAction::Update {
        node_id,
        original_values: updated.original_values,
        new_values: updated.new_values,
    };
    Ok((updated.node, action))
}

pub async fn do_delete(
    service: &NodeService,
    workflow: &mut Workflow,
    node_id: NodeId,
    actor: Option<&str>,
) -> Result<NodeAction, FlowError> {
    service.delete_node(workflow, node_id, actor).await?;
    Ok(NodeAction::Delete { node_id })
}

pub async fn do_duplicate(
    service: &NodeService,
    workflow: &mut Workflow,
    source_id: NodeId,
) -> Result<(AutomationNode, NodeAction), FlowError> {
    let node = service.duplicate_node(workflow, source_id).await?;
    let action = NodeAction::Duplicate {
        source_id,
        node_id: node.id,
    };
    Ok((node, action))
}

pub async fn do_replace(
    service: &NodeService,
    workflow: &mut Workflow,
    node_id: NodeId,
    new_type: &str,
    actor: Option<&str>,
) -> Result<(AutomationNode, NodeAction), FlowError> {
    let replaced = service
        .replace_node(workflow, node_id, new_type, None, actor)
        .await?;
    let action = NodeAction::Replace {
        node_id: replaced.node.id,
        node_type: replaced.node.node_type.clone(),
        original_node_id: replaced.original_node_id,
        original_node_type: replaced.original_node_type,
    };
    Ok((replaced.node, action))
}

pub async fn do_move(
    service: &NodeService,
    workflow: &mut Workflow,
    node_id: NodeId,
    destination: &Position,
) -> Result<NodeAction, FlowError> {
    let moved = service.move_node(workflow, node_id, destination).await?;
    Ok(NodeAction::Move {
        node_id: moved.node_id,
        origin: moved.origin,
        destination: moved.destination,
    })
}

/// Undo and redo stacks of one editing session
#[derive(Debug, Default)]
pub struct ActionHistory {
    undo: Vec<NodeAction>,
    redo: Vec<NodeAction>,
}

impl ActionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a performed action. Anything undone so far can no longer be redone.
    pub fn push(&mut self, action: NodeAction) {
        self.redo.clear();
        self.undo.push(action);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Undo the latest action. Returns it, or `None` when there is nothing to undo.
    ///
    /// A failed undo keeps the action on the undo stack.
    pub async fn undo(
        &mut self,
        service: &NodeService,
        workflow: &mut Workflow,
    ) -> Result<Option<NodeAction>, FlowError> {
        let Some(action) = self.undo.pop() else {
            return Ok(None);
        };
        if let Err(e) = action.undo(service, workflow).await {
            self.undo.push(action);
            return Err(e);
        }
        self.redo.push(action.clone());
        Ok(Some(action))
    }

    pub async fn redo(
        &mut self,
        service: &NodeService,
        workflow: &mut Workflow,
    ) -> Result<Option<NodeAction>, FlowError> {
        let Some(action) = self.redo.pop() else {
            return Ok(None);
        };
        if let Err(e) = action.redo(service, workflow).await {
            self.redo.push(action);
            return Err(e);
        }
        self.undo.push(action.clone());
        Ok(Some(action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::nodes::NodeTypeRegistry;
    use crate::flow::{NodeError, WorkflowId};
    use serde_json::json;

    async fn setup() -> (NodeService, Workflow, AutomationNode) {
        let service = NodeService::new(NodeTypeRegistry::with_builtin_types().await);
        let mut workflow = Workflow::new(WorkflowId(1), "Actions");
        let trigger = service
            .create_node(
                &mut workflow,
                "rows_created",
                NodeValues::label("Trigger"),
                &Position::root(),
            )
            .await
            .unwrap();
        (service, workflow, trigger)
    }

    #[tokio::test]
    async fn test_create_undo_redo() {
        let (service, mut workflow, trigger) = setup().await;
        let mut history = ActionHistory::new();

        let (node, action) = do_create(
            &service,
            &mut workflow,
            "create_row",
            NodeValues::label("Create"),
            &Position::south(trigger.id, ""),
        )
        .await
        .unwrap();
        assert_eq!(action.action_type(), "create_automation_node");
        history.push(action);
        let after_create = workflow.graph().to_blob();

        history.undo(&service, &mut workflow).await.unwrap();
        assert!(!workflow.contains_node(node.id));
        assert_eq!(
            workflow.graph().to_blob(),
            json!({"0": trigger.id.0, trigger.id.to_string(): {}})
        );

        history.redo(&service, &mut workflow).await.unwrap();
        assert_eq!(workflow.node(node.id).unwrap().label, "Create");
        assert_eq!(workflow.graph().to_blob(), after_create);
    }

    #[tokio::test]
    async fn test_update_undo_redo() {
        let (service, mut workflow, trigger) = setup().await;
        let (_, action) = do_update(
            &service,
            &mut workflow,
            trigger.id,
            NodeValues::label("Renamed"),
        )
        .await
        .unwrap();

        action.undo(&service, &mut workflow).await.unwrap();
        assert_eq!(workflow.node(trigger.id).unwrap().label, "Trigger");
        action.redo(&service, &mut workflow).await.unwrap();
        assert_eq!(workflow.node(trigger.id).unwrap().label, "Renamed");
    }

    #[tokio::test]
    async fn test_move_undo_redo() {
        let (service, mut workflow, trigger) = setup().await;
        let first = service
            .create_node(
                &mut workflow,
                "create_row",
                NodeValues::default(),
                &Position::south(trigger.id, ""),
            )
            .await
            .unwrap();
        let second = service
            .create_node(
                &mut workflow,
                "update_row",
                NodeValues::default(),
                &Position::south(first.id, ""),
            )
            .await
            .unwrap();
        let before = workflow.graph().to_blob();

        let action = do_move(&service, &mut workflow, second.id, &Position::south(trigger.id, ""))
            .await
            .unwrap();
        assert_eq!(action.description(), format!("Node ({}) moved", second.id));
        assert_eq!(workflow.graph().next_nodes(trigger.id, None).unwrap(), vec![second.id]);

        action.undo(&service, &mut workflow).await.unwrap();
        assert_eq!(workflow.graph().to_blob(), before);
        action.redo(&service, &mut workflow).await.unwrap();
        assert_eq!(workflow.graph().next_nodes(second.id, None).unwrap(), vec![first.id]);
    }

    #[tokio::test]
    async fn test_replace_undo_redo() {
        let (service, mut workflow, trigger) = setup().await;
        let action_node = service
            .create_node(
                &mut workflow,
                "create_row",
                NodeValues::label("Create"),
                &Position::south(trigger.id, ""),
            )
            .await
            .unwrap();

        let (replacement, action) =
            do_replace(&service, &mut workflow, action_node.id, "smtp_email", None)
                .await
                .unwrap();
        assert!(!workflow.contains_node(action_node.id));
        assert_eq!(workflow.graph().next_nodes(trigger.id, None).unwrap(), vec![replacement.id]);

        // A node trashed by a replace only comes back through the undo
        let err = service.restore_node(&mut workflow, action_node.id).await.unwrap_err();
        assert_eq!(err.code(), "ERROR_CANNOT_RESTORE_ITEM");

        action.undo(&service, &mut workflow).await.unwrap();
        assert_eq!(workflow.node(action_node.id).unwrap().label, "Create");
        assert!(!workflow.contains_node(replacement.id));
        assert_eq!(workflow.graph().next_nodes(trigger.id, None).unwrap(), vec![action_node.id]);

        action.redo(&service, &mut workflow).await.unwrap();
        assert!(workflow.contains_node(replacement.id));
        assert_eq!(workflow.graph().next_nodes(trigger.id, None).unwrap(), vec![replacement.id]);
    }

    #[tokio::test]
    async fn test_delete_undo_restores_position() {
        let (service, mut workflow, trigger) = setup().await;
        let first = service
            .create_node(
                &mut workflow,
                "create_row",
                NodeValues::default(),
                &Position::south(trigger.id, ""),
            )
            .await
            .unwrap();
        let second = service
            .create_node(
                &mut workflow,
                "update_row",
                NodeValues::default(),
                &Position::south(first.id, ""),
            )
            .await
            .unwrap();
        let before = workflow.graph().to_blob();

        let action = do_delete(&service, &mut workflow, first.id, Some("alice")).await.unwrap();
        assert_eq!(workflow.graph().next_nodes(trigger.id, None).unwrap(), vec![second.id]);
        assert_eq!(
            service.trash().entry(first.id).unwrap().trashed_by,
            Some("alice".to_string())
        );

        action.undo(&service, &mut workflow).await.unwrap();
        assert_eq!(workflow.graph().to_blob(), before);
    }

    #[tokio::test]
    async fn test_duplicate_undo() {
        let (service, mut workflow, trigger) = setup().await;
        let source = service
            .create_node(
                &mut workflow,
                "http_request",
                NodeValues::label("Call").with_service(json!({"data": {"url": "x"}})),
                &Position::south(trigger.id, ""),
            )
            .await
            .unwrap();

        let (copy, action) = do_duplicate(&service, &mut workflow, source.id).await.unwrap();
        assert_eq!(copy.label, "Call");
        assert_eq!(copy.service.export()["data"], json!({"url": "x"}));
        assert_eq!(workflow.graph().next_nodes(source.id, None).unwrap(), vec![copy.id]);

        action.undo(&service, &mut workflow).await.unwrap();
        assert!(!workflow.contains_node(copy.id));
        assert_eq!(workflow.graph().next_nodes(source.id, None).unwrap(), Vec::<NodeId>::new());
    }

    #[tokio::test]
    async fn test_history_push_clears_redo() {
        let (service, mut workflow, trigger) = setup().await;
        let mut history = ActionHistory::new();
        assert!(history.undo(&service, &mut workflow).await.unwrap().is_none());

        let (_, action) = do_update(&service, &mut workflow, trigger.id, NodeValues::label("A"))
            .await
            .unwrap();
        history.push(action);
        history.undo(&service, &mut workflow).await.unwrap();
        assert!(history.can_redo());

        let (_, action) = do_update(&service, &mut workflow, trigger.id, NodeValues::label("B"))
            .await
            .unwrap();
        history.push(action);
        assert!(!history.can_redo());
        assert!(history.redo(&service, &mut workflow).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_undo_keeps_action() {
        let (service, mut workflow, trigger) = setup().await;
        let mut history = ActionHistory::new();
        let (node, action) = do_create(
            &service,
            &mut workflow,
            "create_row",
            NodeValues::default(),
            &Position::south(trigger.id, ""),
        )
        .await
        .unwrap();
        history.push(action);

        // The node disappears behind the history's back
        service.delete_node(&mut workflow, node.id, None).await.unwrap();
        let err = history.undo(&service, &mut workflow).await.unwrap_err();
        assert!(matches!(err, FlowError::Node(NodeError::DoesNotExist(_))));
        assert!(history.can_undo());
    }

    #[tokio::test]
    async fn test_failed_replace_undo_keeps_original_in_trash() {
        let (service, mut workflow, trigger) = setup().await;
        let mut history = ActionHistory::new();
        let original = service
            .create_node(
                &mut workflow,
                "create_row",
                NodeValues::label("Original"),
                &Position::south(trigger.id, ""),
            )
            .await
            .unwrap();
        let (replacement, action) =
            do_replace(&service, &mut workflow, original.id, "smtp_email", None)
                .await
                .unwrap();
        history.push(action);

        // The replacement is gone, so there is nothing to swap back
        service
            .delete_node(&mut workflow, replacement.id, None)
            .await
            .unwrap();
        let err = history.undo(&service, &mut workflow).await.unwrap_err();
        assert!(matches!(err, FlowError::Node(NodeError::DoesNotExist(_))));
        assert!(history.can_undo());
        assert!(service.trash().entry(original.id).unwrap().is_managed());
        assert!(!workflow.contains_node(original.id));

        // Once the replacement is back the undo goes through
        service
            .restore_node(&mut workflow, replacement.id)
            .await
            .unwrap();
        history.undo(&service, &mut workflow).await.unwrap();
        assert_eq!(workflow.node(original.id).unwrap().label, "Original");
        assert!(service.trash().entry(original.id).is_none());
        assert!(service.trash().entry(replacement.id).unwrap().is_managed());
        assert_eq!(
            workflow.graph().next_nodes(trigger.id, None).unwrap(),
            vec![original.id]
        );
        workflow.graph().validate().unwrap();
    }
}
