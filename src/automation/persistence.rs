// SPDX-License-Identifier: MIT

//! Storage for persisted graph blobs

use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::flow::{FlowError, WorkflowId};

/// Saves the graph blob of a workflow after each successful mutation
pub trait GraphPersistence: Send + Sync {
    fn save_graph(&self, workflow_id: WorkflowId, blob: &Value) -> Result<(), FlowError>;

    fn load_graph(&self, workflow_id: WorkflowId) -> Result<Option<Value>, FlowError>;
}

#[derive(Default)]
pub struct MemoryPersistence {
    graphs: Mutex<HashMap<WorkflowId, Value>>,
    saves: Mutex<usize>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saves since creation
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn graphs(&self) -> MutexGuard<'_, HashMap<WorkflowId, Value>> {
        self.graphs.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl GraphPersistence for MemoryPersistence {
    fn save_graph(&self, workflow_id: WorkflowId, blob: &Value) -> Result<(), FlowError> {
        self.graphs().insert(workflow_id, blob.clone());
        *self.saves.lock().unwrap_or_else(|p| p.into_inner()) += 1;
        Ok(())
    }

    fn load_graph(&self, workflow_id: WorkflowId) -> Result<Option<Value>, FlowError> {
        Ok(self.graphs().get(&workflow_id).cloned())
    }
}

/// Writes one `workflow_<id>.json` file per workflow
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, workflow_id: WorkflowId) -> PathBuf {
        self.dir.join(format!("workflow_{}.json", workflow_id))
    }
}

impl GraphPersistence for FilePersistence {
    fn save_graph(&self, workflow_id: WorkflowId, blob: &Value) -> Result<(), FlowError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(workflow_id);
        fs::write(&path, serde_json::to_string_pretty(blob)?)?;
        log::debug!("Saved graph of workflow {} to {}", workflow_id, path.display());
        Ok(())
    }

    fn load_graph(&self, workflow_id: WorkflowId) -> Result<Option<Value>, FlowError> {
        let path = self.path(workflow_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_persistence() {
        let persistence = MemoryPersistence::new();
        assert_eq!(persistence.load_graph(WorkflowId(1)).unwrap(), None);

        persistence.save_graph(WorkflowId(1), &json!({"0": 1, "1": {}})).unwrap();
        assert_eq!(
            persistence.load_graph(WorkflowId(1)).unwrap(),
            Some(json!({"0": 1, "1": {}}))
        );
        assert_eq!(persistence.save_count(), 1);
    }

    #[test]
    fn test_file_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = FilePersistence::new(dir.path().join("graphs"));

        persistence.save_graph(WorkflowId(7), &json!({"0": 3, "3": {"children": []}})).unwrap();
        assert!(dir.path().join("graphs/workflow_7.json").exists());
        assert_eq!(
            persistence.load_graph(WorkflowId(7)).unwrap(),
            Some(json!({"0": 3, "3": {"children": []}}))
        );
        assert_eq!(persistence.load_graph(WorkflowId(8)).unwrap(), None);
    }
}
