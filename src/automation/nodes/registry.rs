// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::node_types::{builtin_types, NodeType};
use crate::flow::NodeError;

#[derive(Clone)]
pub struct NodeTypeRegistry {
    types: Arc<RwLock<HashMap<String, Arc<dyn NodeType>>>>,
}

impl NodeTypeRegistry {
    pub fn new() -> Self {
        Self {
            types: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registry holding every builtin type
    pub async fn with_builtin_types() -> Self {
        let registry = Self::new();
        for node_type in builtin_types() {
            registry.register(node_type).await;
        }
        registry
    }

    pub async fn register(&self, node_type: Arc<dyn NodeType>) {
        let mut types = self.types.write().await;
        types.insert(node_type.type_name().to_string(), node_type);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn NodeType>> {
        let types = self.types.read().await;
        types.get(name).cloned()
    }

    /// Like [`get`](Self::get) but unknown types are an error
    pub async fn require(&self, name: &str) -> Result<Arc<dyn NodeType>, NodeError> {
        self.get(name)
            .await
            .ok_or_else(|| NodeError::UnknownType(name.to_string()))
    }

    pub async fn type_names(&self) -> Vec<String> {
        let types = self.types.read().await;
        let mut names: Vec<String> = types.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
