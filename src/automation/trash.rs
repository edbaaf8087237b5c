// SPDX-License-Identifier: MIT

//! Trash for deleted and replaced nodes
//!
//! Entries created by a replace are managed: they can only come back through
//! the undo of that replace, never through a plain restore.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::flow::{AutomationNode, NodeId, Position, TrashError, WorkflowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrashOperation {
    Delete,
    /// Trashed by a replace
    Replace,
}

#[derive(Debug, Clone)]
pub struct TrashEntry {
    pub node: AutomationNode,
    pub workflow_id: WorkflowId,
    pub trashed_by: Option<String>,
    pub trashed_at: DateTime<Utc>,
    pub operation: TrashOperation,
    /// Slot the node occupied, used to put it back on restore
    pub position: Option<Position>,
}

impl TrashEntry {
    pub fn is_managed(&self) -> bool {
        self.operation == TrashOperation::Replace
    }

    pub fn name(&self) -> String {
        format!("{} ({})", self.node.node_type, self.node.id)
    }
}

pub trait TrashStore: Send + Sync {
    fn trash(&self, entry: TrashEntry) -> Result<(), TrashError>;

    /// Take the entry of `node` out of the trash.
    ///
    /// Managed entries are only handed out when `allow_managed` is set.
    fn restore(&self, node: NodeId, allow_managed: bool) -> Result<TrashEntry, TrashError>;

    fn entry(&self, node: NodeId) -> Option<TrashEntry>;

    fn permanently_delete(&self, node: NodeId) -> Result<TrashEntry, TrashError>;
}

#[derive(Default)]
pub struct MemoryTrash {
    entries: Mutex<HashMap<NodeId, TrashEntry>>,
}

impl MemoryTrash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<NodeId, TrashEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TrashStore for MemoryTrash {
    fn trash(&self, entry: TrashEntry) -> Result<(), TrashError> {
        let mut entries = self.lock();
        if entries.contains_key(&entry.node.id) {
            return Err(TrashError::AlreadyTrashed(entry.node.id));
        }
        log::debug!("Trashing {} ({:?})", entry.name(), entry.operation);
        entries.insert(entry.node.id, entry);
        Ok(())
    }

    fn restore(&self, node: NodeId, allow_managed: bool) -> Result<TrashEntry, TrashError> {
        let mut entries = self.lock();
        let entry = entries.get(&node).ok_or(TrashError::NotTrashed(node))?;
        if entry.is_managed() && !allow_managed {
            return Err(TrashError::RestorationDisallowed(format!(
                "{} was trashed by a replace and cannot be restored on its own",
                entry.name()
            )));
        }
        entries.remove(&node).ok_or(TrashError::NotTrashed(node))
    }

    fn entry(&self, node: NodeId) -> Option<TrashEntry> {
        self.lock().get(&node).cloned()
    }

    fn permanently_delete(&self, node: NodeId) -> Result<TrashEntry, TrashError> {
        self.lock().remove(&node).ok_or(TrashError::NotTrashed(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::nodes::ScriptedService;
    use std::sync::Arc;

    fn entry(id: u64, operation: TrashOperation) -> TrashEntry {
        TrashEntry {
            node: AutomationNode {
                id: NodeId(id),
                workflow_id: WorkflowId(1),
                node_type: "smtp_email".to_string(),
                label: String::new(),
                service: Arc::new(ScriptedService::from_value(&serde_json::Value::Null).unwrap()),
            },
            workflow_id: WorkflowId(1),
            trashed_by: Some("alice".to_string()),
            trashed_at: Utc::now(),
            operation,
            position: Some(Position::south(NodeId(1), "")),
        }
    }

    #[test]
    fn test_trash_and_restore() {
        let trash = MemoryTrash::new();
        trash.trash(entry(2, TrashOperation::Delete)).unwrap();
        assert_eq!(trash.len(), 1);
        assert_eq!(
            trash.trash(entry(2, TrashOperation::Delete)).unwrap_err(),
            TrashError::AlreadyTrashed(NodeId(2))
        );

        let restored = trash.restore(NodeId(2), false).unwrap();
        assert_eq!(restored.name(), "smtp_email (2)");
        assert!(trash.is_empty());
        assert_eq!(
            trash.restore(NodeId(2), false).unwrap_err(),
            TrashError::NotTrashed(NodeId(2))
        );
    }

    #[test]
    fn test_managed_entries_need_permission() {
        let trash = MemoryTrash::new();
        trash.trash(entry(3, TrashOperation::Replace)).unwrap();

        let err = trash.restore(NodeId(3), false).unwrap_err();
        assert!(matches!(err, TrashError::RestorationDisallowed(_)));
        assert!(trash.entry(NodeId(3)).is_some());

        assert!(trash.restore(NodeId(3), true).unwrap().is_managed());
    }

    #[test]
    fn test_permanently_delete() {
        let trash = MemoryTrash::new();
        trash.trash(entry(4, TrashOperation::Delete)).unwrap();
        trash.permanently_delete(NodeId(4)).unwrap();
        assert!(trash.entry(NodeId(4)).is_none());
    }
}
