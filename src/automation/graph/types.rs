// SPDX-License-Identifier: MIT

//! Graph data types and their persisted JSON form
//!
//! The persisted blob is a flat object: `"0"` holds the root id, every other
//! key is a node id mapping to `{"next": {output: [ids]}, "children": [ids]}`.
//! Absent and empty `next`/`children` are kept distinct. Entries and outputs
//! keep the order they were inserted in, through a save and reload too.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::flow::{GraphError, NodeId};

/// Key of the root pointer in the persisted blob
pub const ROOT_KEY: &str = "0";

/// Successor lists keyed by output uid, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outputs(Vec<(String, Vec<NodeId>)>);

impl Outputs {
    pub fn single(uid: impl Into<String>, ids: Vec<NodeId>) -> Self {
        Self(vec![(uid.into(), ids)])
    }

    pub fn get(&self, uid: &str) -> Option<&Vec<NodeId>> {
        self.0.iter().find(|(key, _)| key == uid).map(|(_, ids)| ids)
    }

    pub fn get_mut(&mut self, uid: &str) -> Option<&mut Vec<NodeId>> {
        self.0
            .iter_mut()
            .find(|(key, _)| key == uid)
            .map(|(_, ids)| ids)
    }

    /// Set the list for `uid`, keeping its slot if it already exists.
    /// Returns the previous list.
    pub fn insert(&mut self, uid: &str, ids: Vec<NodeId>) -> Option<Vec<NodeId>> {
        match self.get_mut(uid) {
            Some(existing) => Some(std::mem::replace(existing, ids)),
            None => {
                self.0.push((uid.to_string(), ids));
                None
            }
        }
    }

    pub fn remove(&mut self, uid: &str) -> Option<Vec<NodeId>> {
        let index = self.0.iter().position(|(key, _)| key == uid)?;
        Some(self.0.remove(index).1)
    }

    pub fn contains_key(&self, uid: &str) -> bool {
        self.get(uid).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[NodeId])> {
        self.0.iter().map(|(uid, ids)| (uid.as_str(), ids.as_slice()))
    }

    /// All successors, output by output
    pub fn all_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().flat_map(|(_, ids)| ids.iter().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Adjacency entry of one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeEntry {
    pub next: Option<Outputs>,
    pub children: Option<Vec<NodeId>>,
}

impl NodeEntry {
    /// First successor on the default output
    pub fn default_successor(&self) -> Option<NodeId> {
        self.next
            .as_ref()
            .and_then(|next| next.get(""))
            .and_then(|ids| ids.first().copied())
    }

    pub fn has_children(&self) -> bool {
        self.children.as_ref().is_some_and(|c| !c.is_empty())
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(next) = &self.next {
            let outputs = next
                .iter()
                .map(|(uid, ids)| (uid.to_string(), ids_to_value(ids)))
                .collect();
            map.insert("next".to_string(), Value::Object(outputs));
        }
        if let Some(children) = &self.children {
            map.insert("children".to_string(), ids_to_value(children));
        }
        Value::Object(map)
    }

    fn from_value(id: NodeId, value: &Value) -> Result<Self, GraphError> {
        let map = value
            .as_object()
            .ok_or_else(|| {
                GraphError::InvalidBlob(format!("entry of node {id} is not an object"))
            })?;

        let mut entry = NodeEntry::default();
        for (key, value) in map {
            match key.as_str() {
                "next" => {
                    let outputs = value.as_object().ok_or_else(|| {
                        GraphError::InvalidBlob(format!("'next' of node {id} is not an object"))
                    })?;
                    let mut next = Outputs::default();
                    for (uid, ids) in outputs {
                        next.insert(uid, ids_from_value(ids)?);
                    }
                    entry.next = Some(next);
                }
                "children" => entry.children = Some(ids_from_value(value)?),
                other => {
                    log::warn!("Ignoring unknown key '{}' in graph entry of node {}", other, id)
                }
            }
        }
        Ok(entry)
    }
}

/// The workflow graph: a root pointer plus one adjacency entry per node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    pub(crate) root: Option<NodeId>,
    pub(crate) entries: IndexMap<NodeId, NodeEntry>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a persisted blob
    pub fn from_blob(blob: &Value) -> Result<Self, GraphError> {
        let map = match blob {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            _ => return Err(GraphError::InvalidBlob("expected an object".to_string())),
        };

        let mut graph = Graph::default();
        for (key, value) in map {
            if key == ROOT_KEY {
                graph.root = match value {
                    Value::Null => None,
                    other => Some(id_from_value(other)?),
                };
                continue;
            }
            let id = key
                .parse::<u64>()
                .map(NodeId)
                .map_err(|_| GraphError::InvalidBlob(format!("invalid node key '{key}'")))?;
            graph.entries.insert(id, NodeEntry::from_value(id, value)?);
        }
        Ok(graph)
    }

    /// Persisted form of this graph, root key first
    pub fn to_blob(&self) -> Value {
        let mut map = Map::new();
        if let Some(root) = self.root {
            map.insert(ROOT_KEY.to_string(), Value::from(root.0));
        }
        for (id, entry) in &self.entries {
            map.insert(id.to_string(), entry.to_value());
        }
        Value::Object(map)
    }
}

impl Serialize for Graph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_blob().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Graph {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let blob = Value::deserialize(deserializer)?;
        Graph::from_blob(&blob).map_err(serde::de::Error::custom)
    }
}

/// Old-to-new id translation used when a workflow is duplicated
#[derive(Debug, Clone, Default)]
pub struct IdMapping {
    pub nodes: HashMap<NodeId, NodeId>,
    pub outputs: HashMap<String, String>,
}

impl IdMapping {
    pub fn node(&self, id: NodeId) -> Result<NodeId, GraphError> {
        self.nodes
            .get(&id)
            .copied()
            .ok_or_else(|| GraphError::MissingMapping {
                kind: "node",
                key: id.to_string(),
            })
    }

    /// The default output always maps to itself
    pub fn output(&self, uid: &str) -> Result<String, GraphError> {
        if uid.is_empty() {
            return Ok(String::new());
        }
        self.outputs
            .get(uid)
            .cloned()
            .ok_or_else(|| GraphError::MissingMapping {
                kind: "output",
                key: uid.to_string(),
            })
    }
}

fn ids_to_value(ids: &[NodeId]) -> Value {
    Value::Array(ids.iter().map(|id| Value::from(id.0)).collect())
}

fn id_from_value(value: &Value) -> Result<NodeId, GraphError> {
    value
        .as_u64()
        .map(NodeId)
        .ok_or_else(|| GraphError::InvalidBlob(format!("invalid node id {value}")))
}

fn ids_from_value(value: &Value) -> Result<Vec<NodeId>, GraphError> {
    value
        .as_array()
        .ok_or_else(|| GraphError::InvalidBlob(format!("expected a list of ids, got {value}")))?
        .iter()
        .map(id_from_value)
        .collect()
}
