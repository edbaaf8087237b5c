// SPDX-License-Identifier: MIT

//! A workflow: its graph, its nodes and its simulation marker

use serde_json::Value;
use std::collections::BTreeMap;

use crate::automation::graph::{Graph, LabelSource};
use crate::flow::{AutomationNode, GraphError, NodeError, NodeId, Placement, WorkflowId};

#[derive(Debug, Clone)]
pub struct Workflow {
    id: WorkflowId,
    name: String,
    graph: Graph,
    nodes: BTreeMap<NodeId, AutomationNode>,
    simulate_until_node: Option<NodeId>,
}

impl Workflow {
    pub fn new(id: WorkflowId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            graph: Graph::new(),
            nodes: BTreeMap::new(),
            simulate_until_node: None,
        }
    }

    pub fn id(&self) -> WorkflowId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub(crate) fn set_graph(&mut self, graph: Graph) {
        self.graph = graph;
    }

    pub fn node(&self, id: NodeId) -> Result<&AutomationNode, NodeError> {
        self.nodes.get(&id).ok_or(NodeError::DoesNotExist(id))
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes ordered by id
    pub fn nodes(&self) -> impl Iterator<Item = &AutomationNode> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// First node whose label matches
    pub fn find_by_label(&self, label: &str) -> Option<&AutomationNode> {
        self.nodes.values().find(|node| node.display_label() == label)
    }

    /// The node at the root of the graph
    pub fn trigger(&self) -> Option<&AutomationNode> {
        self.graph.root().and_then(|id| self.nodes.get(&id))
    }

    pub(crate) fn add_node(&mut self, node: AutomationNode) {
        self.nodes.insert(node.id, node);
    }

    pub(crate) fn take_node(&mut self, id: NodeId) -> Option<AutomationNode> {
        self.nodes.remove(&id)
    }

    pub fn simulate_until_node(&self) -> Option<NodeId> {
        self.simulate_until_node
    }

    pub fn set_simulate_until_node(&mut self, node: Option<NodeId>) -> Result<(), NodeError> {
        if let Some(id) = node {
            if !self.contains_node(id) {
                return Err(NodeError::NotInWorkflow(id));
            }
        }
        self.simulate_until_node = node;
        Ok(())
    }

    /// Clear the simulation marker if it designates `node`
    pub(crate) fn clear_simulate_until_node_if(&mut self, node: NodeId) -> bool {
        if self.simulate_until_node == Some(node) {
            self.simulate_until_node = None;
            return true;
        }
        false
    }

    /// Nodes on the path from the root to `node`, root first
    pub fn previous_nodes(&self, node: NodeId) -> Result<Vec<NodeId>, GraphError> {
        let positions = self
            .graph
            .previous_positions(node)
            .ok_or(GraphError::NodeNotFoundInGraph(node))?;
        Ok(positions.into_iter().filter_map(|p| p.reference).collect())
    }

    /// Containers enclosing `node`, outermost first
    pub fn parent_nodes(&self, node: NodeId) -> Result<Vec<NodeId>, GraphError> {
        let positions = self
            .graph
            .previous_positions(node)
            .ok_or(GraphError::NodeNotFoundInGraph(node))?;
        Ok(positions
            .into_iter()
            .filter(|p| p.placement == Placement::Child)
            .filter_map(|p| p.reference)
            .collect())
    }

    /// Outputs taken on the way from the root to `node`, keyed by node
    pub fn previous_service_outputs(
        &self,
        node: NodeId,
    ) -> Result<Vec<(NodeId, String)>, GraphError> {
        let positions = self
            .graph
            .previous_positions(node)
            .ok_or(GraphError::NodeNotFoundInGraph(node))?;
        Ok(positions
            .into_iter()
            .filter(|p| p.placement == Placement::South)
            .filter_map(|p| p.reference.map(|reference| (reference, p.output)))
            .collect())
    }

    /// The graph with ids replaced by node labels
    pub fn labeled_graph(&self) -> Result<Value, GraphError> {
        self.graph.labeled(self)
    }
}

impl LabelSource for Workflow {
    fn node_label(&self, node: NodeId) -> Option<String> {
        self.nodes
            .get(&node)
            .map(|node| node.display_label().to_string())
    }

    fn edge_label(&self, node: NodeId, uid: &str) -> Option<String> {
        self.nodes.get(&node)?.service.edge_label(uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::nodes::ScriptedService;
    use serde_json::json;
    use std::sync::Arc;

    fn add(workflow: &mut Workflow, id: u64, node_type: &str, label: &str, service: Value) {
        workflow.add_node(AutomationNode {
            id: NodeId(id),
            workflow_id: workflow.id(),
            node_type: node_type.to_string(),
            label: label.to_string(),
            service: Arc::new(ScriptedService::from_value(&service).unwrap()),
        });
    }

    fn workflow() -> Workflow {
        let mut workflow = Workflow::new(WorkflowId(1), "Test");
        add(&mut workflow, 1, "rows_created", "", json!(null));
        add(
            &mut workflow,
            2,
            "router",
            "Route",
            json!({"edges": [{"uid": "b1", "label": "Is big"}], "default_label": "Default"}),
        );
        add(&mut workflow, 3, "iterator", "Loop", json!(null));
        add(&mut workflow, 4, "smtp_email", "Mail", json!(null));
        add(&mut workflow, 5, "smtp_email", "Mail", json!(null));
        workflow.set_graph(
            Graph::from_blob(&json!({
                "0": 1,
                "1": {"next": {"": [2]}},
                "2": {"next": {"": [3], "b1": [5]}},
                "3": {"children": [4]},
                "4": {},
                "5": {},
            }))
            .unwrap(),
        );
        workflow
    }

    #[test]
    fn test_ancestry_queries() {
        let workflow = workflow();
        assert_eq!(
            workflow.previous_nodes(NodeId(4)).unwrap(),
            vec![NodeId(1), NodeId(2), NodeId(3)]
        );
        assert_eq!(workflow.parent_nodes(NodeId(4)).unwrap(), vec![NodeId(3)]);
        assert_eq!(
            workflow.previous_service_outputs(NodeId(5)).unwrap(),
            vec![(NodeId(1), String::new()), (NodeId(2), "b1".to_string())]
        );
        assert_eq!(
            workflow.previous_nodes(NodeId(9)),
            Err(GraphError::NodeNotFoundInGraph(NodeId(9)))
        );
    }

    #[test]
    fn test_labeled_graph() {
        let workflow = workflow();
        assert_eq!(
            workflow.labeled_graph().unwrap(),
            json!({
                "0": "rows_created",
                "rows_created": {"next": {"": ["Route"]}},
                "Route": {"next": {"Default": ["Loop"], "Is big": ["Mail"]}},
                "Loop": {"children": ["Mail-"]},
                "Mail": {},
                "Mail-": {},
            })
        );
    }

    #[test]
    fn test_simulate_until_node() {
        let mut workflow = workflow();
        assert_eq!(
            workflow.set_simulate_until_node(Some(NodeId(42))),
            Err(NodeError::NotInWorkflow(NodeId(42)))
        );
        workflow.set_simulate_until_node(Some(NodeId(4))).unwrap();
        assert!(!workflow.clear_simulate_until_node_if(NodeId(3)));
        assert!(workflow.clear_simulate_until_node_if(NodeId(4)));
        assert_eq!(workflow.simulate_until_node(), None);
    }

    #[test]
    fn test_trigger_and_labels() {
        let workflow = workflow();
        assert_eq!(workflow.trigger().unwrap().id, NodeId(1));
        assert_eq!(workflow.find_by_label("Loop").unwrap().id, NodeId(3));
        assert_eq!(workflow.find_by_label("rows_created").unwrap().id, NodeId(1));
    }
}
