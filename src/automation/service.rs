// SPDX-License-Identifier: MIT

//! Structural mutations of a workflow
//!
//! Every operation validates the request, asks the node type whether the edit
//! is legal, rewires the graph, persists it and returns what undo/redo needs.
//! A failed operation leaves the workflow and its graph untouched.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::automation::cache::LocalCache;
use crate::automation::config::EngineConfig;
use crate::automation::graph::IdMapping;
use crate::automation::nodes::{NodeType, NodeTypeRegistry};
use crate::automation::persistence::{GraphPersistence, MemoryPersistence};
use crate::automation::trash::{MemoryTrash, TrashEntry, TrashOperation, TrashStore};
use crate::automation::workflow::Workflow;
use crate::flow::{
    AutomationNode, FlowError, NodeError, NodeExport, NodeId, Placement, Position, TrashError,
    WorkflowId,
};

/// Editable values of a node. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Value>,
}

impl NodeValues {
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            service: None,
        }
    }

    pub fn with_service(mut self, service: Value) -> Self {
        self.service = Some(service);
        self
    }

    /// Every value of `node`
    pub fn of(node: &AutomationNode) -> Self {
        Self {
            label: Some(node.label.clone()),
            service: Some(node.service.export()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdatedNode {
    pub node: AutomationNode,
    pub original_values: NodeValues,
    pub new_values: NodeValues,
}

#[derive(Debug, Clone)]
pub struct ReplacedNode {
    pub node: AutomationNode,
    pub original_node_id: NodeId,
    pub original_node_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeMove {
    pub node_id: NodeId,
    pub origin: Position,
    pub destination: Position,
}

fn nodes_cache_key(workflow_id: WorkflowId) -> String {
    format!("wa_get_{}_nodes", workflow_id)
}

#[derive(Clone)]
pub struct NodeService {
    registry: NodeTypeRegistry,
    trash: Arc<dyn TrashStore>,
    persistence: Arc<dyn GraphPersistence>,
    cache: LocalCache<Vec<AutomationNode>>,
    ids: Arc<AtomicU64>,
}

impl NodeService {
    pub fn new(registry: NodeTypeRegistry) -> Self {
        Self {
            registry,
            trash: Arc::new(MemoryTrash::new()),
            persistence: Arc::new(MemoryPersistence::new()),
            cache: LocalCache::default(),
            ids: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn from_config(registry: NodeTypeRegistry, config: &EngineConfig) -> Self {
        Self {
            persistence: config.persistence(),
            cache: LocalCache::new(config.node_cache),
            ..Self::new(registry)
        }
    }

    pub fn with_trash(mut self, trash: Arc<dyn TrashStore>) -> Self {
        self.trash = trash;
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn GraphPersistence>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn registry(&self) -> &NodeTypeRegistry {
        &self.registry
    }

    pub fn trash(&self) -> &Arc<dyn TrashStore> {
        &self.trash
    }

    pub fn cache(&self) -> &LocalCache<Vec<AutomationNode>> {
        &self.cache
    }

    fn next_id(&self) -> NodeId {
        NodeId(self.ids.fetch_add(1, Ordering::SeqCst))
    }

    /// Make sure fresh ids never collide with the nodes of `workflow`
    pub fn reserve_ids(&self, workflow: &Workflow) {
        let graph_ids = workflow.graph().node_ids();
        let node_ids = workflow.nodes().map(|node| node.id);
        if let Some(max) = graph_ids.chain(node_ids).map(|id| id.0).max() {
            self.ids.fetch_max(max + 1, Ordering::SeqCst);
        }
    }

    /// Live nodes of the workflow, memoized until the next mutation
    pub fn get_nodes(&self, workflow: &Workflow) -> Arc<Vec<AutomationNode>> {
        self.cache
            .get_or_insert_with(&nodes_cache_key(workflow.id()), || {
                workflow.nodes().cloned().collect()
            })
    }

    fn commit(&self, workflow: &Workflow) -> Result<(), FlowError> {
        self.cache.invalidate(&nodes_cache_key(workflow.id()));
        self.persistence
            .save_graph(workflow.id(), &workflow.graph().to_blob())
    }

    fn import_node(
        &self,
        workflow_id: WorkflowId,
        node_type: &dyn NodeType,
        export: NodeExport,
    ) -> Result<AutomationNode, FlowError> {
        Ok(AutomationNode {
            id: self.next_id(),
            workflow_id,
            node_type: node_type.type_name().to_string(),
            label: export.label,
            service: node_type.build_service(&export.service)?,
        })
    }

    fn resolve_reference<'w>(
        &self,
        workflow: &'w Workflow,
        reference: Option<NodeId>,
    ) -> Result<Option<&'w AutomationNode>, NodeError> {
        match reference {
            None => Ok(None),
            Some(id) => workflow.node(id).map(Some).map_err(|_| {
                NodeError::ReferenceNodeInvalid(format!("The reference node {} doesn't exist", id))
            }),
        }
    }

    async fn check_position(
        &self,
        workflow: &Workflow,
        reference: Option<&AutomationNode>,
        placement: Placement,
        output: &str,
    ) -> Result<(), FlowError> {
        let Some(reference) = reference else {
            return Ok(());
        };

        if reference.workflow_id != workflow.id() || !workflow.graph().contains(reference.id) {
            return Err(NodeError::ReferenceNodeInvalid(format!(
                "The reference node {} doesn't exist",
                reference.id
            ))
            .into());
        }
        if !reference.has_output(output) {
            return Err(NodeError::MissingOutput {
                node_id: reference.id,
                output: output.to_string(),
            }
            .into());
        }
        if placement == Placement::Child {
            let reference_type = self.registry.require(&reference.node_type).await?;
            if !reference_type.is_container() {
                return Err(NodeError::ReferenceNodeInvalid(format!(
                    "The reference node {} can't have child",
                    reference.id
                ))
                .into());
            }
        }
        Ok(())
    }

    pub async fn create_node(
        &self,
        workflow: &mut Workflow,
        node_type: &str,
        values: NodeValues,
        position: &Position,
    ) -> Result<AutomationNode, FlowError> {
        let node_type = self.registry.require(node_type).await?;
        let reference = self.resolve_reference(workflow, position.reference)?;
        self.check_position(workflow, reference, position.placement, &position.output)
            .await?;
        node_type.before_create(workflow, reference, position.placement, &position.output)?;

        let config = node_type.prepare_config(values.service.unwrap_or(Value::Null));
        let node = AutomationNode {
            id: self.next_id(),
            workflow_id: workflow.id(),
            node_type: node_type.type_name().to_string(),
            label: values.label.unwrap_or_default(),
            service: node_type.build_service(&config)?,
        };

        workflow.graph_mut().insert(
            node.id,
            position.reference,
            position.placement,
            &position.output,
        )?;
        workflow.add_node(node.clone());
        self.commit(workflow)?;

        log::info!("Created node {} ({}) at {}", node.id, node.node_type, position);
        Ok(node)
    }

    pub async fn update_node(
        &self,
        workflow: &mut Workflow,
        node_id: NodeId,
        values: NodeValues,
    ) -> Result<UpdatedNode, FlowError> {
        let node = workflow.node(node_id)?.clone();
        let node_type = self.registry.require(&node.node_type).await?;
        let original_values = NodeValues::of(&node);

        let service = match &values.service {
            Some(config) => {
                let service = node_type.build_service(config)?;
                node_type.before_update(workflow, &node, service.as_ref())?;
                service
            }
            None => node.service.clone(),
        };
        let updated = AutomationNode {
            label: values.label.unwrap_or_else(|| node.label.clone()),
            service,
            ..node
        };
        let new_values = NodeValues::of(&updated);

        workflow.add_node(updated.clone());
        self.cache.invalidate(&nodes_cache_key(workflow.id()));

        log::info!("Updated node {}", node_id);
        Ok(UpdatedNode {
            node: updated,
            original_values,
            new_values,
        })
    }

    pub async fn delete_node(
        &self,
        workflow: &mut Workflow,
        node_id: NodeId,
        actor: Option<&str>,
    ) -> Result<AutomationNode, FlowError> {
        let node = workflow.node(node_id)?.clone();
        let node_type = self.registry.require(&node.node_type).await?;
        node_type.before_delete(workflow, &node)?;

        let position = workflow.graph().position(node_id)?;
        let mut graph = workflow.graph().clone();
        graph.remove(node_id, false)?;

        self.trash.trash(TrashEntry {
            node: node.clone(),
            workflow_id: workflow.id(),
            trashed_by: actor.map(str::to_string),
            trashed_at: Utc::now(),
            operation: TrashOperation::Delete,
            position: Some(position),
        })?;

        workflow.set_graph(graph);
        workflow.take_node(node_id);
        workflow.clear_simulate_until_node_if(node_id);
        self.commit(workflow)?;

        log::info!("Deleted node {} ({})", node_id, node.node_type);
        Ok(node)
    }

    /// Bring a deleted node back at the position it was deleted from
    pub async fn restore_node(
        &self,
        workflow: &mut Workflow,
        node_id: NodeId,
    ) -> Result<AutomationNode, FlowError> {
        let entry = self
            .trash
            .entry(node_id)
            .ok_or(TrashError::NotTrashed(node_id))?;
        if entry.workflow_id != workflow.id() {
            return Err(NodeError::NotInWorkflow(node_id).into());
        }
        if entry.is_managed() {
            return Err(TrashError::RestorationDisallowed(format!(
                "{} was trashed by a replace and can only come back through its undo",
                entry.name()
            ))
            .into());
        }

        let position = entry.position.clone().ok_or_else(|| {
            TrashError::RestorationDisallowed(format!(
                "{} has no recorded position",
                entry.name()
            ))
        })?;
        match position.reference {
            Some(reference) => {
                let reference = workflow.node(reference).map_err(|_| {
                    TrashError::RestorationDisallowed(
                        "This automation node cannot be restored as its reference node has been deleted."
                            .to_string(),
                    )
                })?;
                if !reference.has_output(&position.output) {
                    return Err(TrashError::RestorationDisallowed(
                        "This automation node cannot be restored as its branch has been deleted."
                            .to_string(),
                    )
                    .into());
                }
            }
            None => {
                let node_type = self.registry.require(&entry.node.node_type).await?;
                if node_type.is_workflow_trigger() && workflow.graph().root().is_some() {
                    return Err(TrashError::RestorationDisallowed(
                        "This trigger cannot be restored as the workflow already has one."
                            .to_string(),
                    )
                    .into());
                }
            }
        }

        let entry = self.trash.restore(node_id, false)?;
        workflow.graph_mut().insert(
            node_id,
            position.reference,
            position.placement,
            &position.output,
        )?;
        workflow.add_node(entry.node.clone());
        self.commit(workflow)?;

        log::info!("Restored node {} at {}", node_id, position);
        Ok(entry.node)
    }

    /// Put a node trashed by a replace back in place of `node_id`.
    ///
    /// The trashed node leaves the trash only once the swap succeeded, so a
    /// failed attempt can be retried.
    pub async fn restore_replaced(
        &self,
        workflow: &mut Workflow,
        node_id: NodeId,
        trashed_id: NodeId,
    ) -> Result<ReplacedNode, FlowError> {
        let entry = self
            .trash
            .entry(trashed_id)
            .ok_or(TrashError::NotTrashed(trashed_id))?;
        if !entry.is_managed() {
            return Err(TrashError::RestorationDisallowed(format!(
                "The node {} was not trashed by a replace",
                trashed_id
            ))
            .into());
        }

        let node_type = entry.node.node_type.clone();
        let replaced = self
            .replace_node(workflow, node_id, &node_type, Some(entry.node), None)
            .await?;
        self.trash.restore(trashed_id, true)?;
        Ok(replaced)
    }

    pub async fn duplicate_node(
        &self,
        workflow: &mut Workflow,
        source_id: NodeId,
    ) -> Result<AutomationNode, FlowError> {
        let source = workflow.node(source_id)?.clone();
        let node_type = self.registry.require(&source.node_type).await?;
        node_type.before_create(workflow, Some(&source), Placement::South, "")?;

        let node = self.import_node(workflow.id(), node_type.as_ref(), source.export())?;
        workflow
            .graph_mut()
            .insert(node.id, Some(source.id), Placement::South, "")?;
        workflow.add_node(node.clone());
        self.commit(workflow)?;

        log::info!("Duplicated node {} as {}", source_id, node.id);
        Ok(node)
    }

    /// Put a node of `new_type` in place of `node_id`.
    ///
    /// `existing` reuses a node taken back from the trash instead of creating
    /// one; undo and redo go through this path.
    pub async fn replace_node(
        &self,
        workflow: &mut Workflow,
        node_id: NodeId,
        new_type: &str,
        existing: Option<AutomationNode>,
        actor: Option<&str>,
    ) -> Result<ReplacedNode, FlowError> {
        let old = workflow.node(node_id)?.clone();

        let new_node = match existing {
            Some(node) => node,
            None => {
                let old_type = self.registry.require(&old.node_type).await?;
                let new_type = self.registry.require(new_type).await?;
                old_type.before_replace(workflow, &old, new_type.as_ref())?;

                let config = new_type.prepare_config(Value::Null);
                AutomationNode {
                    id: self.next_id(),
                    workflow_id: workflow.id(),
                    node_type: new_type.type_name().to_string(),
                    label: String::new(),
                    service: new_type.build_service(&config)?,
                }
            }
        };

        let position = workflow.graph().position(node_id)?;
        let mut graph = workflow.graph().clone();
        graph.replace(node_id, new_node.id)?;

        self.trash.trash(TrashEntry {
            node: old.clone(),
            workflow_id: workflow.id(),
            trashed_by: actor.map(str::to_string),
            trashed_at: Utc::now(),
            operation: TrashOperation::Replace,
            position: Some(position),
        })?;

        workflow.set_graph(graph);
        workflow.take_node(node_id);
        workflow.add_node(new_node.clone());
        workflow.clear_simulate_until_node_if(node_id);
        self.commit(workflow)?;

        log::info!(
            "Replaced node {} ({}) with {} ({})",
            node_id,
            old.node_type,
            new_node.id,
            new_node.node_type
        );
        Ok(ReplacedNode {
            node: new_node,
            original_node_id: node_id,
            original_node_type: old.node_type,
        })
    }

    pub async fn move_node(
        &self,
        workflow: &mut Workflow,
        node_id: NodeId,
        destination: &Position,
    ) -> Result<NodeMove, FlowError> {
        let node = workflow.node(node_id)?.clone();
        let node_type = self.registry.require(&node.node_type).await?;
        let reference = self.resolve_reference(workflow, destination.reference)?;
        self.check_position(workflow, reference, destination.placement, &destination.output)
            .await?;
        if destination.reference == Some(node_id) {
            return Err(NodeError::ReferenceNodeInvalid(
                "The reference node and the moved node must be different".to_string(),
            )
            .into());
        }
        node_type.before_move(
            workflow,
            &node,
            reference,
            destination.placement,
            &destination.output,
        )?;

        let origin = workflow.graph().position(node_id)?;
        workflow.graph_mut().move_node(
            node_id,
            destination.reference,
            destination.placement,
            &destination.output,
        )?;
        self.commit(workflow)?;

        log::info!("Moved node {} from {} to {}", node_id, origin, destination);
        Ok(NodeMove {
            node_id,
            origin,
            destination: destination.clone(),
        })
    }

    /// Copy `workflow` under a new id, with fresh node ids
    pub async fn duplicate_workflow(
        &self,
        workflow: &Workflow,
        id: WorkflowId,
        name: &str,
    ) -> Result<Workflow, FlowError> {
        let mut mapping = IdMapping::default();
        let mut duplicate = Workflow::new(id, name);

        for node in workflow.nodes() {
            let node_type = self.registry.require(&node.node_type).await?;
            let copy = self.import_node(id, node_type.as_ref(), node.export())?;
            mapping.nodes.insert(node.id, copy.id);
            for edge in node.service.edges() {
                if !edge.uid.is_empty() {
                    mapping.outputs.insert(edge.uid.clone(), edge.uid);
                }
            }
            duplicate.add_node(copy);
        }

        duplicate.set_graph(workflow.graph().migrate(&mapping)?);
        if let Some(until) = workflow.simulate_until_node() {
            duplicate.set_simulate_until_node(Some(mapping.node(until)?))?;
        }
        self.commit(&duplicate)?;

        log::info!("Duplicated workflow {} as {}", workflow.id(), id);
        Ok(duplicate)
    }
}
