// SPDX-License-Identifier: MIT

//! Dispatch engine: walks the workflow graph and runs each node's service
//!
//! Successors on the taken output share the run context. Each container
//! iteration runs its children on a clone of it, so iterations never see
//! each other's results.

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;

use crate::automation::workflow::Workflow;
use crate::flow::{DispatchContext, DispatchError, FlowError, NodeId, ServiceError};

#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchEngine;

impl DispatchEngine {
    pub fn new() -> Self {
        Self
    }

    /// Run the workflow from its trigger.
    ///
    /// The workflow's simulation marker applies when the context carries none.
    pub async fn run_workflow(
        &self,
        workflow: &Workflow,
        context: DispatchContext,
    ) -> Result<DispatchContext, FlowError> {
        let root = workflow.graph().root().ok_or(DispatchError::NoTrigger)?;
        let mut context = if context.is_simulation() {
            context
        } else {
            context.with_simulate_until(workflow.simulate_until_node())
        };

        log::info!(
            "Running workflow {} ({}) from node {}",
            workflow.id(),
            workflow.name(),
            root
        );
        self.dispatch_node(workflow, root, &mut context, None).await?;
        Ok(context)
    }

    /// Dispatch `node_id` then everything below it.
    ///
    /// When simulating, only nodes on the path to the simulated node run;
    /// `allowed` carries that path down the recursion.
    pub fn dispatch_node<'a>(
        &'a self,
        workflow: &'a Workflow,
        node_id: NodeId,
        context: &'a mut DispatchContext,
        allowed: Option<&'a HashSet<NodeId>>,
    ) -> BoxFuture<'a, Result<(), FlowError>> {
        async move {
            let simulated_path;
            let allowed = match (allowed, context.simulate_until_node()) {
                (None, Some(until)) => {
                    let mut path: HashSet<NodeId> =
                        workflow.previous_nodes(until)?.into_iter().collect();
                    path.insert(until);
                    simulated_path = path;
                    Some(&simulated_path)
                }
                (allowed, _) => allowed,
            };

            if let Some(allowed) = allowed {
                if !allowed.contains(&node_id) {
                    log::debug!("Skipping node {} outside of the simulated path", node_id);
                    return Ok(());
                }
            }

            let node = workflow.node(node_id)?;
            log::debug!("Dispatching node {} ({})", node_id, node.node_type);
            let result = node
                .service
                .dispatch(node, context)
                .await
                .map_err(|e| {
                    log::error!("Dispatch of node {} failed: {}", node_id, e);
                    match e {
                        ServiceError::ImproperlyConfigured(message) => {
                            DispatchError::Misconfigured { node_id, message }
                        }
                        ServiceError::Failed(message) => DispatchError::Failed { node_id, message },
                    }
                })?;
            let output_uid = result.output_uid.clone();
            let iterations = result.iteration_count();
            context.after_dispatch(node_id, result);

            if context.simulate_until_node() == Some(node_id) {
                return Ok(());
            }

            let children = workflow.graph().children(node_id)?;
            if !children.is_empty() {
                let count = iterations.ok_or(DispatchError::InvalidIterationData(node_id))?;
                let count = if context.is_simulation() {
                    count.min(1)
                } else {
                    count
                };
                for index in 0..count {
                    let mut iteration = context.clone();
                    iteration.set_current_iteration(node_id, index);
                    for &child in &children {
                        self.dispatch_node(workflow, child, &mut iteration, allowed)
                            .await?;
                    }
                }
            }

            for next in workflow.graph().next_nodes(node_id, Some(&output_uid))? {
                self.dispatch_node(workflow, next, context, allowed).await?;
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::graph::Graph;
    use crate::automation::nodes::ScriptedService;
    use crate::flow::{AutomationNode, DispatchResult, Service, WorkflowId};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;

    /// Echoes the item of the enclosing iterator
    struct ItemService {
        container: NodeId,
    }

    #[async_trait]
    impl Service for ItemService {
        fn edges(&self) -> Vec<crate::flow::Edge> {
            vec![crate::flow::Edge::default_output()]
        }

        fn export(&self) -> Value {
            Value::Null
        }

        async fn dispatch(
            &self,
            _node: &AutomationNode,
            context: &DispatchContext,
        ) -> Result<DispatchResult, ServiceError> {
            let item = context
                .current_item(self.container)
                .cloned()
                .ok_or_else(|| ServiceError::Failed("no current item".to_string()))?;
            Ok(DispatchResult::new(item))
        }
    }

    fn add(workflow: &mut Workflow, id: u64, service: Arc<dyn Service>) {
        workflow.add_node(AutomationNode {
            id: NodeId(id),
            workflow_id: workflow.id(),
            node_type: "test".to_string(),
            label: format!("node {}", id),
            service,
        });
    }

    fn scripted(config: Value) -> Arc<dyn Service> {
        Arc::new(ScriptedService::from_value(&config).unwrap())
    }

    fn ids(ids: &[u64]) -> Vec<NodeId> {
        ids.iter().copied().map(NodeId).collect()
    }

    /// 1 -> 2 (router) -yes-> 3, -""-> 4
    fn router_workflow(output: &str) -> Workflow {
        let mut workflow = Workflow::new(WorkflowId(1), "Router");
        add(&mut workflow, 1, scripted(json!({"data": {"n": 1}})));
        add(
            &mut workflow,
            2,
            scripted(json!({"output": output, "edges": [{"uid": "yes", "label": "Yes"}]})),
        );
        add(&mut workflow, 3, scripted(json!({"data": "yes"})));
        add(&mut workflow, 4, scripted(json!({"data": "default"})));
        workflow.set_graph(
            Graph::from_blob(&json!({
                "0": 1,
                "1": {"next": {"": [2]}},
                "2": {"next": {"yes": [3], "": [4]}},
                "3": {},
                "4": {},
            }))
            .unwrap(),
        );
        workflow
    }

    /// 1 -> 2 (iterator) [children: 3 -> 4], 2 -> 5
    fn iterator_workflow() -> Workflow {
        let mut workflow = Workflow::new(WorkflowId(1), "Loop");
        add(&mut workflow, 1, scripted(json!({"data": {"rows": 3}})));
        add(&mut workflow, 2, scripted(json!({"data": {"results": ["a", "b", "c"]}})));
        add(&mut workflow, 3, Arc::new(ItemService { container: NodeId(2) }));
        add(&mut workflow, 4, scripted(json!({"data": "inner"})));
        add(&mut workflow, 5, scripted(json!({"data": "after"})));
        workflow.set_graph(
            Graph::from_blob(&json!({
                "0": 1,
                "1": {"next": {"": [2]}},
                "2": {"children": [3], "next": {"": [5]}},
                "3": {"next": {"": [4]}},
                "4": {},
                "5": {},
            }))
            .unwrap(),
        );
        workflow
    }

    #[tokio::test]
    async fn test_follows_taken_output_only() {
        let engine = DispatchEngine::new();

        let context = engine
            .run_workflow(&router_workflow("yes"), DispatchContext::empty())
            .await
            .unwrap();
        assert_eq!(context.dispatched_nodes(), ids(&[1, 2, 3]));

        let context = engine
            .run_workflow(&router_workflow(""), DispatchContext::empty())
            .await
            .unwrap();
        assert_eq!(context.dispatched_nodes(), ids(&[1, 2, 4]));
        assert_eq!(context.result(NodeId(4)).unwrap().data, json!("default"));
    }

    #[tokio::test]
    async fn test_iterations_run_on_isolated_clones() {
        let engine = DispatchEngine::new();
        let context = engine
            .run_workflow(&iterator_workflow(), DispatchContext::empty())
            .await
            .unwrap();

        assert_eq!(context.dispatched_nodes(), ids(&[1, 2, 3, 4, 3, 4, 3, 4, 5]));
        let items: Vec<Value> = context
            .history()
            .into_iter()
            .filter(|record| record.node_id == NodeId(3))
            .map(|record| record.result.data)
            .collect();
        assert_eq!(items, vec![json!("a"), json!("b"), json!("c")]);

        // Iteration results stay in their clones
        assert!(context.result(NodeId(3)).is_none());
        assert!(context.result(NodeId(5)).is_some());
        assert_eq!(context.current_iteration(NodeId(2)), None);
    }

    #[tokio::test]
    async fn test_simulation_prunes_other_branches() {
        let engine = DispatchEngine::new();
        let workflow = router_workflow("");
        let context = DispatchContext::empty().with_simulate_until(Some(NodeId(3)));

        let context = engine.run_workflow(&workflow, context).await.unwrap();
        // Node 2 takes the default output, which leads outside the path to 3
        assert_eq!(context.dispatched_nodes(), ids(&[1, 2]));
    }

    #[tokio::test]
    async fn test_simulation_stops_at_node_and_runs_one_iteration() {
        let engine = DispatchEngine::new();
        let mut workflow = iterator_workflow();
        workflow.set_simulate_until_node(Some(NodeId(4))).unwrap();

        let context = engine
            .run_workflow(&workflow, DispatchContext::empty())
            .await
            .unwrap();
        assert_eq!(context.dispatched_nodes(), ids(&[1, 2, 3, 4]));
        assert_eq!(context.simulate_until_node(), Some(NodeId(4)));
    }

    #[tokio::test]
    async fn test_simulation_stops_after_container() {
        let engine = DispatchEngine::new();
        let context = DispatchContext::empty().with_simulate_until(Some(NodeId(2)));
        let context = engine
            .run_workflow(&iterator_workflow(), context)
            .await
            .unwrap();
        assert_eq!(context.dispatched_nodes(), ids(&[1, 2]));
    }

    #[tokio::test]
    async fn test_misconfigured_service_aborts_the_run() {
        let engine = DispatchEngine::new();
        let mut workflow = router_workflow("");
        add(&mut workflow, 2, scripted(json!({"misconfigured": "Missing table"})));

        let mut context = DispatchContext::empty();
        let err = engine
            .dispatch_node(&workflow, NodeId(1), &mut context, None)
            .await
            .unwrap_err();
        match err {
            FlowError::Dispatch(DispatchError::Misconfigured { node_id, message }) => {
                assert_eq!(node_id, NodeId(2));
                assert_eq!(message, "Missing table");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert_eq!(context.dispatched_nodes(), ids(&[1]));
    }

    #[tokio::test]
    async fn test_failed_service_aborts_the_run() {
        let engine = DispatchEngine::new();
        let mut workflow = router_workflow("");
        add(&mut workflow, 4, scripted(json!({"error": "boom"})));

        let err = engine
            .run_workflow(&workflow, DispatchContext::empty())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ERROR_AUTOMATION_NODE_DISPATCH_FAILED");
    }

    #[tokio::test]
    async fn test_container_needs_iteration_data() {
        let engine = DispatchEngine::new();
        let mut workflow = iterator_workflow();
        add(&mut workflow, 2, scripted(json!({"data": {"results": "nope"}})));

        let err = engine
            .run_workflow(&workflow, DispatchContext::empty())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Dispatch(DispatchError::InvalidIterationData(NodeId(2)))
        ));
    }

    #[tokio::test]
    async fn test_empty_workflow_has_no_trigger() {
        let engine = DispatchEngine::new();
        let workflow = Workflow::new(WorkflowId(1), "Empty");
        let err = engine
            .run_workflow(&workflow, DispatchContext::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Dispatch(DispatchError::NoTrigger)));
        assert!(err.is_user_error());
    }

    #[tokio::test]
    async fn test_trigger_receives_event_payload() {
        let engine = DispatchEngine::new();
        let mut workflow = router_workflow("");
        add(&mut workflow, 1, scripted(Value::Null));

        let context = engine
            .run_workflow(&workflow, DispatchContext::new(json!({"row": 7})))
            .await
            .unwrap();
        assert_eq!(context.result(NodeId(1)).unwrap().data, json!({"row": 7}));
    }
}
