//! Engine configuration read from the environment

use std::path::PathBuf;
use std::sync::Arc;

use crate::automation::persistence::{FilePersistence, GraphPersistence, MemoryPersistence};
use crate::flow::FlowError;

pub const NODE_CACHE_VAR: &str = "FLOWGRAPH_NODE_CACHE";
pub const GRAPH_DIR_VAR: &str = "FLOWGRAPH_GRAPH_DIR";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Memoize node listings per workflow
    pub node_cache: bool,
    /// Where graph blobs are written. Kept in memory when unset.
    pub graph_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_cache: true,
            graph_dir: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, FlowError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, FlowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup(NODE_CACHE_VAR) {
            config.node_cache = parse_bool(NODE_CACHE_VAR, &value)?;
        }
        if let Some(dir) = lookup(GRAPH_DIR_VAR).filter(|dir| !dir.trim().is_empty()) {
            config.graph_dir = Some(PathBuf::from(dir));
        }
        Ok(config)
    }

    pub fn persistence(&self) -> Arc<dyn GraphPersistence> {
        match &self.graph_dir {
            Some(dir) => Arc::new(FilePersistence::new(dir.clone())),
            None => Arc::new(MemoryPersistence::new()),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, FlowError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(FlowError::config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}
