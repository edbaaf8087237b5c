// SPDX-License-Identifier: MIT

//! Request-scoped state carried through one workflow run

use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::flow::node::NodeId;
use crate::flow::service::DispatchResult;

type PayloadProducer = Arc<dyn Fn() -> Value + Send + Sync>;

/// Event payload, computed at most once per run
struct EventPayload {
    producer: Option<PayloadProducer>,
    value: OnceCell<Value>,
}

/// One dispatch, as seen by the run
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRecord {
    pub node_id: NodeId,
    /// Container iterations in effect when the node ran
    pub iterations: BTreeMap<NodeId, usize>,
    pub result: DispatchResult,
}

/// Dispatch context for one workflow run.
///
/// Cloning is cheap: results are shared until the clone writes to them, so a
/// container iteration never leaks its results into its siblings or into the
/// outer run. The dispatch history is shared by every clone.
#[derive(Clone)]
pub struct DispatchContext {
    payload: Arc<EventPayload>,
    results: Arc<HashMap<NodeId, DispatchResult>>,
    current_iterations: BTreeMap<NodeId, usize>,
    simulate_until_node: Option<NodeId>,
    history: Arc<Mutex<Vec<DispatchRecord>>>,
}

impl DispatchContext {
    /// Create a context for an event payload known upfront
    pub fn new(payload: Value) -> Self {
        Self::build(EventPayload {
            producer: None,
            value: OnceCell::with_value(payload),
        })
    }

    /// Create a context whose payload is produced on first access
    pub fn lazy<F>(producer: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self::build(EventPayload {
            producer: Some(Arc::new(producer)),
            value: OnceCell::new(),
        })
    }

    /// Create a context without any payload
    pub fn empty() -> Self {
        Self::new(Value::Null)
    }

    fn build(payload: EventPayload) -> Self {
        Self {
            payload: Arc::new(payload),
            results: Arc::new(HashMap::new()),
            current_iterations: BTreeMap::new(),
            simulate_until_node: None,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Stop the run after the given node and skip everything not on its path
    pub fn with_simulate_until(mut self, node: Option<NodeId>) -> Self {
        self.simulate_until_node = node;
        self
    }

    pub fn simulate_until_node(&self) -> Option<NodeId> {
        self.simulate_until_node
    }

    pub fn is_simulation(&self) -> bool {
        self.simulate_until_node.is_some()
    }

    /// The triggering event payload
    pub fn event_payload(&self) -> &Value {
        let payload = &self.payload;
        payload.value.get_or_init(|| match &payload.producer {
            Some(producer) => producer(),
            None => Value::Null,
        })
    }

    /// Record the result of a dispatched node
    pub fn after_dispatch(&mut self, node_id: NodeId, result: DispatchResult) {
        self.lock_history().push(DispatchRecord {
            node_id,
            iterations: self.current_iterations.clone(),
            result: result.clone(),
        });
        Arc::make_mut(&mut self.results).insert(node_id, result);
    }

    /// Result of a node dispatched in this context or one of its ancestors
    pub fn result(&self, node_id: NodeId) -> Option<&DispatchResult> {
        self.results.get(&node_id)
    }

    pub fn results(&self) -> impl Iterator<Item = (&NodeId, &DispatchResult)> {
        self.results.iter()
    }

    /// Select the item a container is currently iterating on
    pub fn set_current_iteration(&mut self, node_id: NodeId, index: usize) {
        self.current_iterations.insert(node_id, index);
    }

    pub fn current_iteration(&self, node_id: NodeId) -> Option<usize> {
        self.current_iterations.get(&node_id).copied()
    }

    /// Item the given container is currently iterating on
    pub fn current_item(&self, node_id: NodeId) -> Option<&Value> {
        let index = self.current_iteration(node_id)?;
        self.result(node_id)?.data.get("results")?.get(index)
    }

    /// Every dispatch of the run, across all iterations, in order
    pub fn history(&self) -> Vec<DispatchRecord> {
        self.lock_history().clone()
    }

    /// Ids of the dispatched nodes, in dispatch order
    pub fn dispatched_nodes(&self) -> Vec<NodeId> {
        self.lock_history().iter().map(|r| r.node_id).collect()
    }

    fn lock_history(&self) -> MutexGuard<'_, Vec<DispatchRecord>> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchContext")
            .field("results", &self.results)
            .field("current_iterations", &self.current_iterations)
            .field("simulate_until_node", &self.simulate_until_node)
            .finish_non_exhaustive()
    }
}
