//! Workflow loader - YAML fixture loading and workflow assembly
//!
//! A fixture lists the nodes of a workflow and its graph blob. Graph keys
//! are node ids and must be quoted in YAML.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::automation::graph::Graph;
use crate::automation::nodes::NodeTypeRegistry;
use crate::automation::workflow::Workflow;
use crate::flow::{AutomationNode, FlowError, GraphError, NodeError, NodeExport, WorkflowId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowFixture {
    #[serde(default)]
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeExport>,
    #[serde(default)]
    pub graph: Value,
    /// Label of the node to simulate until
    #[serde(default)]
    pub simulate_until: Option<String>,
}

/// Loads workflow fixtures from YAML files
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a workflow fixture from a YAML file
    pub fn load_workflow<P: AsRef<Path>>(&self, path: P) -> Result<WorkflowFixture, FlowError> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    pub fn parse_yaml(content: &str) -> Result<WorkflowFixture, FlowError> {
        let fixture: WorkflowFixture = serde_yaml::from_str(content)?;
        Ok(fixture)
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble a workflow from a fixture.
///
/// The graph must be a single tree rooted at a trigger, covering exactly
/// the listed nodes.
pub async fn build_workflow(
    registry: &NodeTypeRegistry,
    fixture: WorkflowFixture,
) -> Result<Workflow, FlowError> {
    let mut workflow = Workflow::new(fixture.id, fixture.name);

    for export in fixture.nodes {
        let node_type = registry.require(&export.node_type).await?;
        workflow.add_node(AutomationNode {
            id: export.id,
            workflow_id: fixture.id,
            node_type: node_type.type_name().to_string(),
            service: node_type.build_service(&export.service)?,
            label: export.label,
        });
    }

    let graph = Graph::from_blob(&fixture.graph)?;
    graph.validate()?;
    if let Some(missing) = graph.node_ids().find(|id| !workflow.contains_node(*id)) {
        return Err(GraphError::DanglingReference(missing).into());
    }
    if let Some(orphan) = workflow.nodes().map(|n| n.id).find(|id| !graph.contains(*id)) {
        return Err(GraphError::Unreachable(orphan).into());
    }
    if let Some(root) = graph.root() {
        let root_type = registry.require(&workflow.node(root)?.node_type).await?;
        if !root_type.is_workflow_trigger() {
            return Err(NodeError::FirstNodeMustBeTrigger.into());
        }
    }
    workflow.set_graph(graph);

    if let Some(label) = &fixture.simulate_until {
        let node = workflow
            .find_by_label(label)
            .map(|node| node.id)
            .ok_or_else(|| FlowError::config(format!("No node labeled '{}'", label)))?;
        workflow.set_simulate_until_node(Some(node))?;
    }

    log::debug!(
        "Built workflow {} with {} nodes",
        workflow.id(),
        workflow.node_count()
    );
    Ok(workflow)
}
