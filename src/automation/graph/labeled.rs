//! Id-independent rendering of a graph, used to compare workflows in tests

use serde_json::{Map, Value};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use super::types::{Graph, ROOT_KEY};
use crate::flow::{GraphError, NodeId};

/// Resolves node ids and output uids to human-readable labels
pub trait LabelSource {
    fn node_label(&self, node: NodeId) -> Option<String>;

    fn edge_label(&self, node: NodeId, uid: &str) -> Option<String>;
}

struct Labeler<'a> {
    source: &'a dyn LabelSource,
    used: HashMap<String, NodeId>,
}

impl Labeler<'_> {
    /// Stable label for `node`; a clash with another node appends `-`
    fn label(&mut self, node: NodeId) -> Result<String, GraphError> {
        let mut label = self
            .source
            .node_label(node)
            .ok_or(GraphError::DanglingReference(node))?;
        loop {
            match self.used.entry(label.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(node);
                    return Ok(label);
                }
                Entry::Occupied(slot) if *slot.get() == node => return Ok(label),
                Entry::Occupied(_) => label.push('-'),
            }
        }
    }

    fn labels(&mut self, ids: &[NodeId]) -> Result<Value, GraphError> {
        ids.iter()
            .map(|&id| self.label(id).map(Value::String))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

impl Graph {
    /// Same shape as the persisted blob with ids swapped for node labels and
    /// output uids swapped for edge labels.
    pub fn labeled(&self, source: &dyn LabelSource) -> Result<Value, GraphError> {
        let mut labeler = Labeler {
            source,
            used: HashMap::new(),
        };
        let mut result = Map::new();

        if let Some(root) = self.root {
            result.insert(ROOT_KEY.to_string(), Value::String(labeler.label(root)?));
        }

        for (&id, info) in &self.entries {
            let key = labeler.label(id)?;
            let mut rendered = Map::new();
            if let Some(children) = &info.children {
                rendered.insert("children".to_string(), labeler.labels(children)?);
            }
            if let Some(next) = &info.next {
                let mut outputs = Map::new();
                for (uid, ids) in next.iter() {
                    let edge = source.edge_label(id, uid).unwrap_or_else(|| {
                        log::warn!("No label for output '{}' of node {}", uid, id);
                        uid.to_string()
                    });
                    outputs.insert(edge, labeler.labels(ids)?);
                }
                rendered.insert("next".to_string(), Value::Object(outputs));
            }
            result.insert(key, Value::Object(rendered));
        }

        Ok(Value::Object(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Names(HashMap<NodeId, &'static str>);

    impl LabelSource for Names {
        fn node_label(&self, node: NodeId) -> Option<String> {
            self.0.get(&node).map(|name| name.to_string())
        }

        fn edge_label(&self, _node: NodeId, uid: &str) -> Option<String> {
            match uid {
                "" => Some("Default".to_string()),
                "uid-1" => Some("Branch".to_string()),
                _ => None,
            }
        }
    }

    #[test]
    fn test_labeled_graph() {
        let graph = Graph::from_blob(&json!({
            "0": 1,
            "1": {"next": {"": [2]}},
            "2": {"next": {"": [3], "uid-1": [4]}},
            "3": {},
            "4": {"children": []},
        }))
        .unwrap();
        let names = Names(HashMap::from([
            (NodeId(1), "Rows created"),
            (NodeId(2), "Router"),
            (NodeId(3), "Send email"),
            (NodeId(4), "Send email"),
        ]));

        assert_eq!(
            graph.labeled(&names).unwrap(),
            json!({
                "0": "Rows created",
                "Rows created": {"next": {"Default": ["Router"]}},
                "Router": {"next": {"Default": ["Send email"], "Branch": ["Send email-"]}},
                "Send email": {},
                "Send email-": {"children": []},
            })
        );
    }

    #[test]
    fn test_labeled_graph_unknown_node() {
        let graph = Graph::from_blob(&json!({"0": 1, "1": {}})).unwrap();
        let names = Names(HashMap::new());
        assert_eq!(graph.labeled(&names), Err(GraphError::DanglingReference(NodeId(1))));
    }
}
