// SPDX-License-Identifier: MIT

//! Graph queries and mutations
//!
//! Every mutation either leaves the graph fully rewired or returns an error
//! before touching it. Callers persist the graph once the surrounding
//! operation succeeded.

use std::collections::HashSet;

use super::types::{Graph, IdMapping, NodeEntry, Outputs};
use crate::flow::{GraphError, NodeId, Placement, Position};

impl Graph {
    /// Id of the first node
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none() && self.entries.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.contains_key(&node)
    }

    pub fn entry(&self, node: NodeId) -> Option<&NodeEntry> {
        self.entries.get(&node)
    }

    /// Ids of every node with an entry
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.keys().copied()
    }

    fn info(&self, node: NodeId) -> Result<&NodeEntry, GraphError> {
        self.entries
            .get(&node)
            .ok_or(GraphError::NodeNotFoundInGraph(node))
    }

    fn info_mut(&mut self, node: NodeId) -> Result<&mut NodeEntry, GraphError> {
        self.entries
            .get_mut(&node)
            .ok_or(GraphError::NodeNotFoundInGraph(node))
    }

    /// Entry of `node`, created right after `anchor` (first without one)
    /// when missing
    fn entry_after(&mut self, node: NodeId, anchor: Option<NodeId>) -> &mut NodeEntry {
        if !self.entries.contains_key(&node) {
            let index = match anchor {
                Some(anchor) => self
                    .entries
                    .get_index_of(&anchor)
                    .map_or(self.entries.len(), |index| index + 1),
                None => 0,
            };
            self.entries.shift_insert(index, node, NodeEntry::default());
        }
        self.entries.entry(node).or_default()
    }

    /// First node stored in the given slot
    pub fn node_at_position(
        &self,
        reference: Option<NodeId>,
        placement: Placement,
        output: &str,
    ) -> Result<Option<NodeId>, GraphError> {
        let Some(reference) = reference else {
            return Ok(match placement {
                Placement::South => self.root,
                Placement::Child => None,
            });
        };

        let info = self.info(reference)?;
        Ok(match placement {
            Placement::South => info
                .next
                .as_ref()
                .and_then(|next| next.get(output))
                .and_then(|ids| ids.first().copied()),
            Placement::Child => info
                .children
                .as_ref()
                .and_then(|children| children.first().copied()),
        })
    }

    /// Slot found by following the default output from the root
    pub fn last_position(&self) -> Result<Position, GraphError> {
        let Some(mut current) = self.root else {
            return Ok(Position::root());
        };

        let mut seen = HashSet::new();
        loop {
            if !seen.insert(current) {
                return Err(GraphError::MultipleIncomingEdges(current));
            }
            match self.info(current)?.default_successor() {
                Some(next) => current = next,
                None => return Ok(Position::south(current, "")),
            }
        }
    }

    /// Slot currently holding `node`
    pub fn position(&self, node: NodeId) -> Result<Position, GraphError> {
        if self.root == Some(node) {
            return Ok(Position::root());
        }

        for (&id, info) in &self.entries {
            if id == node {
                continue;
            }
            if let Some(next) = &info.next {
                if let Some((uid, _)) = next.iter().find(|(_, ids)| ids.contains(&node)) {
                    return Ok(Position::south(id, uid));
                }
            }
            if info.children.as_ref().is_some_and(|c| c.contains(&node)) {
                return Ok(Position::child(id));
            }
        }

        Err(GraphError::NodeNotFoundInGraph(node))
    }

    /// Chain of slots from the root down to `target`.
    ///
    /// Outputs are explored before children, depth first. Returns `None` when
    /// the target is unreachable and an empty list for the root itself.
    pub fn previous_positions(&self, target: NodeId) -> Option<Vec<Position>> {
        let mut stack = vec![(Position::root(), Vec::new())];
        let mut visited = HashSet::new();

        while let Some((position, path)) = stack.pop() {
            let Ok(Some(node)) =
                self.node_at_position(position.reference, position.placement, &position.output)
            else {
                continue;
            };
            if node == target {
                return Some(path);
            }
            if !visited.insert(node) {
                continue;
            }
            let Some(info) = self.entries.get(&node) else {
                continue;
            };

            let mut next_positions: Vec<Position> = info
                .next
                .iter()
                .flat_map(|next| next.iter())
                .filter(|(_, ids)| !ids.is_empty())
                .map(|(uid, _)| Position::south(node, uid))
                .collect();
            if info.has_children() {
                next_positions.push(Position::child(node));
            }

            // Reversed so the first candidate is explored first
            for next_position in next_positions.into_iter().rev() {
                let mut next_path = path.clone();
                next_path.push(next_position.clone());
                stack.push((next_position, next_path));
            }
        }

        None
    }

    /// Successors of `node`, restricted to one output when given
    pub fn next_nodes(
        &self,
        node: NodeId,
        output: Option<&str>,
    ) -> Result<Vec<NodeId>, GraphError> {
        let info = self.info(node)?;
        Ok(info
            .next
            .iter()
            .flat_map(|next| next.iter())
            .filter(|(uid, _)| output.map_or(true, |o| o == *uid))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect())
    }

    pub fn children(&self, node: NodeId) -> Result<Vec<NodeId>, GraphError> {
        Ok(self.info(node)?.children.clone().unwrap_or_default())
    }

    /// Every node reachable from the children of `node`
    pub fn descendants(&self, node: NodeId) -> Result<HashSet<NodeId>, GraphError> {
        let mut found = HashSet::new();
        let mut stack = self.children(node)?;

        while let Some(current) = stack.pop() {
            if current == node || !found.insert(current) {
                continue;
            }
            if let Some(info) = self.entries.get(&current) {
                stack.extend(info.next.iter().flat_map(|next| next.all_ids()));
                stack.extend(info.children.iter().flatten().copied());
            }
        }

        Ok(found)
    }

    /// Insert `node` in the given slot.
    ///
    /// Whatever occupied the slot becomes the successor of `node` on its
    /// default output.
    pub fn insert(
        &mut self,
        node: NodeId,
        reference: Option<NodeId>,
        placement: Placement,
        output: &str,
    ) -> Result<(), GraphError> {
        let Some(reference) = reference else {
            let previous_root = self.root.replace(node);
            let info = self.entry_after(node, None);
            // The node keeps its successors unless it displaces another root
            if let Some(previous) = previous_root.filter(|&previous| previous != node) {
                info.next = Some(Outputs::single("", vec![previous]));
            }
            return Ok(());
        };

        let reference_info = self.info_mut(reference)?;
        let displaced = match placement {
            Placement::South => reference_info
                .next
                .get_or_insert_with(Outputs::default)
                .insert(output, vec![node]),
            Placement::Child => reference_info.children.replace(vec![node]),
        };

        let info = self.entry_after(node, Some(reference));
        info.next = displaced
            .filter(|ids| !ids.is_empty())
            .map(|ids| Outputs::single("", ids));
        Ok(())
    }

    /// Detach `node` and splice its successors into its slot.
    ///
    /// Successors are every `next` output in order, followed by the children
    /// unless `keep_info` is set. With `keep_info` the node keeps its entry so
    /// it can be inserted again.
    pub fn remove(&mut self, node: NodeId, keep_info: bool) -> Result<(), GraphError> {
        let Some(info) = self.entries.get(&node) else {
            // Already gone, a replace may have removed it
            return Ok(());
        };

        let mut successors: Vec<NodeId> = info.next.iter().flat_map(|n| n.all_ids()).collect();
        if !keep_info {
            successors.extend(info.children.iter().flatten().copied());
        }

        let position = self.position(node)?;
        match position.reference {
            None => self.root = successors.first().copied(),
            Some(reference) => {
                let reference_info = self.info_mut(reference)?;
                match position.placement {
                    Placement::South => {
                        if let Some(next) = reference_info.next.as_mut() {
                            if let Some(ids) = next.get_mut(&position.output) {
                                splice(ids, node, &successors);
                                if ids.is_empty() {
                                    next.remove(&position.output);
                                }
                            }
                            if next.is_empty() {
                                reference_info.next = None;
                            }
                        }
                    }
                    Placement::Child => {
                        if let Some(children) = reference_info.children.as_mut() {
                            splice(children, node, &successors);
                            if children.is_empty() {
                                reference_info.children = None;
                            }
                        }
                    }
                }
            }
        }

        if !keep_info {
            self.entries.shift_remove(&node);
        }
        Ok(())
    }

    /// Put `new` in the slot of `old`, taking over its entry
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<(), GraphError> {
        let position = self.position(old)?;
        if !self.entries.contains_key(&old) {
            return Err(GraphError::NodeNotFoundInGraph(old));
        }
        if let Some(reference) = position.reference {
            self.info(reference)?;
        }

        if let Some(info) = self.entries.shift_remove(&old) {
            self.entries.insert(new, info);
        }

        match position.reference {
            None => self.root = Some(new),
            Some(reference) => {
                let reference_info = self.info_mut(reference)?;
                let slot = match position.placement {
                    Placement::South => reference_info
                        .next
                        .as_mut()
                        .and_then(|next| next.get_mut(&position.output)),
                    Placement::Child => reference_info.children.as_mut(),
                };
                if let Some(ids) = slot {
                    splice(ids, old, &[new]);
                }
            }
        }
        Ok(())
    }

    /// Move `node` to another slot. Its subtree on the default output is
    /// left behind; its children travel with it.
    pub fn move_node(
        &mut self,
        node: NodeId,
        reference: Option<NodeId>,
        placement: Placement,
        output: &str,
    ) -> Result<(), GraphError> {
        if let Some(reference) = reference {
            self.info(reference)?;
        }
        self.position(node)?;

        self.remove(node, true)?;
        self.insert(node, reference, placement, output)
    }

    /// Copy of this graph with every node id and output uid translated.
    ///
    /// Fails on the first id or uid the mapping doesn't cover.
    pub fn migrate(&self, mapping: &IdMapping) -> Result<Graph, GraphError> {
        let mut migrated = Graph::new();
        if let Some(root) = self.root {
            migrated.root = Some(mapping.node(root)?);
        }

        for (&id, info) in &self.entries {
            let next = match &info.next {
                Some(next) => {
                    let mut outputs = Outputs::default();
                    for (uid, ids) in next.iter() {
                        let ids = ids
                            .iter()
                            .map(|&id| mapping.node(id))
                            .collect::<Result<Vec<_>, _>>()?;
                        outputs.insert(&mapping.output(uid)?, ids);
                    }
                    Some(outputs)
                }
                None => None,
            };
            let children = match &info.children {
                Some(children) => Some(
                    children
                        .iter()
                        .map(|&id| mapping.node(id))
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                None => None,
            };
            migrated
                .entries
                .insert(mapping.node(id)?, NodeEntry { next, children });
        }

        Ok(migrated)
    }

    /// Check the graph is a single tree hanging from the root
    pub fn validate(&self) -> Result<(), GraphError> {
        let Some(root) = self.root else {
            return match self.entries.keys().next() {
                Some(&orphan) => Err(GraphError::Unreachable(orphan)),
                None => Ok(()),
            };
        };

        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                return Err(GraphError::MultipleIncomingEdges(current));
            }
            let info = self
                .entries
                .get(&current)
                .ok_or(GraphError::DanglingReference(current))?;
            stack.extend(info.next.iter().flat_map(|next| next.all_ids()));
            stack.extend(info.children.iter().flatten().copied());
        }

        match self.entries.keys().find(|id| !seen.contains(*id)) {
            Some(&orphan) => Err(GraphError::Unreachable(orphan)),
            None => Ok(()),
        }
    }
}

/// Replace `item` in `list` by `replacement`, in place
fn splice(list: &mut Vec<NodeId>, item: NodeId, replacement: &[NodeId]) {
    if let Some(index) = list.iter().position(|&id| id == item) {
        list.splice(index..=index, replacement.iter().copied());
    }
}
