//! Node and edge relations for one hierarchy
//!
//! The store enforces the foreign-key behaviour of the relational schema it
//! stands in for: edges need both endpoints, deleting a node cascades to every
//! edge touching it, and renaming a node rewrites those edges. Every accepted
//! mutation is applied in full and then described as a list of
//! [`MaintenanceEvent`]s for the closure maintainer to consume.

use crate::error::{AuthzError, Result};
use hierarch_core::{Bitmask, BitmaskSize, CoreError, HierarchyKind, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A direct grant from parent to child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub parent: NodeId,
    pub child: NodeId,
    pub permission: Bitmask,
}

impl Edge {
    pub fn new(parent: impl Into<NodeId>, child: impl Into<NodeId>, permission: Bitmask) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
            permission,
        }
    }
}

/// A requested change to a hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GraphMutation {
    InsertNode {
        id: NodeId,
    },
    RenameNode {
        from: NodeId,
        to: NodeId,
    },
    DeleteNode {
        id: NodeId,
    },
    InsertEdge {
        parent: NodeId,
        child: NodeId,
        permission: Bitmask,
    },
    /// Change the weight and/or reattach an edge; unset fields keep their
    /// current value
    UpdateEdge {
        parent: NodeId,
        child: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_parent: Option<NodeId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_child: Option<NodeId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        permission: Option<Bitmask>,
    },
    DeleteEdge {
        parent: NodeId,
        child: NodeId,
    },
}

impl GraphMutation {
    pub fn insert_node(id: impl Into<NodeId>) -> Self {
        GraphMutation::InsertNode { id: id.into() }
    }

    pub fn delete_node(id: impl Into<NodeId>) -> Self {
        GraphMutation::DeleteNode { id: id.into() }
    }

    pub fn rename_node(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        GraphMutation::RenameNode {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn insert_edge(parent: impl Into<NodeId>, child: impl Into<NodeId>, permission: Bitmask) -> Self {
        GraphMutation::InsertEdge {
            parent: parent.into(),
            child: child.into(),
            permission,
        }
    }

    pub fn delete_edge(parent: impl Into<NodeId>, child: impl Into<NodeId>) -> Self {
        GraphMutation::DeleteEdge {
            parent: parent.into(),
            child: child.into(),
        }
    }

    /// Reweight an edge in place
    pub fn set_permission(parent: impl Into<NodeId>, child: impl Into<NodeId>, permission: Bitmask) -> Self {
        GraphMutation::UpdateEdge {
            parent: parent.into(),
            child: child.into(),
            new_parent: None,
            new_child: None,
            permission: Some(permission),
        }
    }
}

/// What changed in the store, with old and new row values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MaintenanceEvent {
    NodeInserted { id: NodeId },
    NodeRenamed { from: NodeId, to: NodeId },
    NodeDeleted { id: NodeId },
    EdgeInserted { edge: Edge },
    EdgeUpdated { old: Edge, new: Edge },
    EdgeDeleted { edge: Edge },
}

/// In-memory node/edge relations for one hierarchy
#[derive(Debug, Clone)]
pub struct GraphStore {
    kind: HierarchyKind,
    size: BitmaskSize,
    nodes: BTreeSet<NodeId>,
    edges: BTreeMap<(NodeId, NodeId), Bitmask>,
    /// child -> parents
    parents: HashMap<NodeId, BTreeSet<NodeId>>,
    /// parent -> children
    children: HashMap<NodeId, BTreeSet<NodeId>>,
}

impl GraphStore {
    pub fn new(kind: HierarchyKind, size: BitmaskSize) -> Self {
        Self {
            kind,
            size,
            nodes: BTreeSet::new(),
            edges: BTreeMap::new(),
            parents: HashMap::new(),
            children: HashMap::new(),
        }
    }

    pub fn kind(&self) -> HierarchyKind {
        self.kind
    }

    pub fn bitmask_size(&self) -> BitmaskSize {
        self.size
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge(&self, parent: NodeId, child: NodeId) -> Option<&Bitmask> {
        self.edges.get(&(parent, child))
    }

    /// All edges in (parent, child) order
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.edges.iter().map(|(&(parent, child), permission)| Edge {
            parent,
            child,
            permission: permission.clone(),
        })
    }

    /// Direct parents of `child` with the weight of each connecting edge
    pub fn parents_of(&self, child: NodeId) -> impl Iterator<Item = (NodeId, &Bitmask)> + '_ {
        self.parents
            .get(&child)
            .into_iter()
            .flatten()
            .filter_map(move |&parent| self.edges.get(&(parent, child)).map(|p| (parent, p)))
    }

    /// Direct children of `parent` with the weight of each connecting edge
    pub fn children_of(&self, parent: NodeId) -> impl Iterator<Item = (NodeId, &Bitmask)> + '_ {
        self.children
            .get(&parent)
            .into_iter()
            .flatten()
            .filter_map(move |&child| self.edges.get(&(parent, child)).map(|p| (child, p)))
    }

    /// Apply one mutation, cascades included, and describe what changed
    ///
    /// The mutation is checked in full before anything is written, so a
    /// rejected mutation leaves the store untouched.
    ///
    /// # Errors
    ///
    /// Unknown or duplicate nodes and edges, and permissions whose width
    /// differs from the store's.
    pub fn apply(&mut self, mutation: GraphMutation) -> Result<Vec<MaintenanceEvent>> {
        match mutation {
            GraphMutation::InsertNode { id } => {
                if !self.nodes.insert(id) {
                    return Err(AuthzError::DuplicateNode { kind: self.kind, id });
                }
                Ok(vec![MaintenanceEvent::NodeInserted { id }])
            }
            GraphMutation::RenameNode { from, to } => self.rename_node(from, to),
            GraphMutation::DeleteNode { id } => self.delete_node(id),
            GraphMutation::InsertEdge {
                parent,
                child,
                permission,
            } => {
                self.check_width(&permission)?;
                self.require_node(parent)?;
                self.require_node(child)?;
                if self.edges.contains_key(&(parent, child)) {
                    return Err(self.duplicate_edge(parent, child));
                }
                let edge = Edge {
                    parent,
                    child,
                    permission,
                };
                self.link(edge.clone());
                Ok(vec![MaintenanceEvent::EdgeInserted { edge }])
            }
            GraphMutation::UpdateEdge {
                parent,
                child,
                new_parent,
                new_child,
                permission,
            } => {
                let current = self
                    .edges
                    .get(&(parent, child))
                    .cloned()
                    .ok_or_else(|| self.unknown_edge(parent, child))?;
                let new = Edge {
                    parent: new_parent.unwrap_or(parent),
                    child: new_child.unwrap_or(child),
                    permission: permission.unwrap_or_else(|| current.clone()),
                };
                self.check_width(&new.permission)?;
                self.require_node(new.parent)?;
                self.require_node(new.child)?;
                let rekeyed = (new.parent, new.child) != (parent, child);
                if rekeyed && self.edges.contains_key(&(new.parent, new.child)) {
                    return Err(self.duplicate_edge(new.parent, new.child));
                }

                let old = self.unlink(parent, child).ok_or_else(|| self.unknown_edge(parent, child))?;
                self.link(new.clone());
                Ok(vec![MaintenanceEvent::EdgeUpdated { old, new }])
            }
            GraphMutation::DeleteEdge { parent, child } => {
                let edge = self.unlink(parent, child).ok_or_else(|| self.unknown_edge(parent, child))?;
                Ok(vec![MaintenanceEvent::EdgeDeleted { edge }])
            }
        }
    }

    fn rename_node(&mut self, from: NodeId, to: NodeId) -> Result<Vec<MaintenanceEvent>> {
        self.require_node(from)?;
        if from == to {
            return Ok(Vec::new());
        }
        if self.nodes.contains(&to) {
            return Err(AuthzError::DuplicateNode { kind: self.kind, id: to });
        }

        // Detach everything first so a relinked edge never collides with an
        // incident edge that has not been moved yet.
        let detached: Vec<Edge> = self
            .incident_edges(from)
            .into_iter()
            .filter_map(|(parent, child)| self.unlink(parent, child))
            .collect();
        self.nodes.remove(&from);
        self.nodes.insert(to);

        let swap = |id: NodeId| if id == from { to } else { id };
        let mut events = vec![MaintenanceEvent::NodeRenamed { from, to }];
        for old in detached {
            let new = Edge {
                parent: swap(old.parent),
                child: swap(old.child),
                permission: old.permission.clone(),
            };
            self.link(new.clone());
            events.push(MaintenanceEvent::EdgeUpdated { old, new });
        }
        Ok(events)
    }

    fn delete_node(&mut self, id: NodeId) -> Result<Vec<MaintenanceEvent>> {
        self.require_node(id)?;
        let mut events = Vec::new();
        for (parent, child) in self.incident_edges(id) {
            if let Some(edge) = self.unlink(parent, child) {
                events.push(MaintenanceEvent::EdgeDeleted { edge });
            }
        }
        self.nodes.remove(&id);
        events.push(MaintenanceEvent::NodeDeleted { id });
        Ok(events)
    }

    /// Keys of every edge touching `id`, self-loop counted once
    fn incident_edges(&self, id: NodeId) -> Vec<(NodeId, NodeId)> {
        let mut keys: BTreeSet<(NodeId, NodeId)> = BTreeSet::new();
        for parent in self.parents.get(&id).into_iter().flatten() {
            keys.insert((*parent, id));
        }
        for child in self.children.get(&id).into_iter().flatten() {
            keys.insert((id, *child));
        }
        keys.into_iter().collect()
    }

    fn link(&mut self, edge: Edge) {
        self.parents.entry(edge.child).or_default().insert(edge.parent);
        self.children.entry(edge.parent).or_default().insert(edge.child);
        self.edges.insert((edge.parent, edge.child), edge.permission);
    }

    fn unlink(&mut self, parent: NodeId, child: NodeId) -> Option<Edge> {
        let permission = self.edges.remove(&(parent, child))?;
        if let Some(set) = self.parents.get_mut(&child) {
            set.remove(&parent);
            if set.is_empty() {
                self.parents.remove(&child);
            }
        }
        if let Some(set) = self.children.get_mut(&parent) {
            set.remove(&child);
            if set.is_empty() {
                self.children.remove(&parent);
            }
        }
        Some(Edge {
            parent,
            child,
            permission,
        })
    }

    fn require_node(&self, id: NodeId) -> Result<()> {
        if self.nodes.contains(&id) {
            Ok(())
        } else {
            Err(AuthzError::UnknownNode { kind: self.kind, id })
        }
    }

    fn check_width(&self, permission: &Bitmask) -> Result<()> {
        if permission.size() != self.size {
            return Err(CoreError::size_mismatch(self.size.get(), permission.size().get()).into());
        }
        Ok(())
    }

    fn unknown_edge(&self, parent: NodeId, child: NodeId) -> AuthzError {
        AuthzError::UnknownEdge {
            kind: self.kind,
            parent,
            child,
        }
    }

    fn duplicate_edge(&self, parent: NodeId, child: NodeId) -> AuthzError {
        AuthzError::DuplicateEdge {
            kind: self.kind,
            parent,
            child,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(text: &str) -> Bitmask {
        text.parse().unwrap()
    }

    fn store_with(nodes: &[u64]) -> GraphStore {
        let mut store = GraphStore::new(HierarchyKind::Resource, BitmaskSize::new(4).unwrap());
        for &id in nodes {
            store.apply(GraphMutation::insert_node(id)).unwrap();
        }
        store
    }

    #[test]
    fn test_insert_node_and_edge() {
        let mut store = store_with(&[1, 2]);
        let events = store
            .apply(GraphMutation::insert_edge(1, 2, mask("1100")))
            .unwrap();

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], MaintenanceEvent::EdgeInserted { .. }));
        assert_eq!(store.edge(NodeId(1), NodeId(2)), Some(&mask("1100")));
        assert_eq!(store.parents_of(NodeId(2)).count(), 1);
        assert_eq!(store.children_of(NodeId(1)).count(), 1);
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let mut store = store_with(&[1]);
        assert!(matches!(
            store.apply(GraphMutation::insert_edge(1, 9, mask("1111"))),
            Err(AuthzError::UnknownNode { id: NodeId(9), .. })
        ));
        assert!(matches!(
            store.apply(GraphMutation::insert_node(1)),
            Err(AuthzError::DuplicateNode { .. })
        ));
        assert!(matches!(
            store.apply(GraphMutation::delete_edge(1, 1)),
            Err(AuthzError::UnknownEdge { .. })
        ));
    }

    #[test]
    fn test_width_checked() {
        let mut store = store_with(&[1, 2]);
        let err = store
            .apply(GraphMutation::insert_edge(1, 2, mask("11")))
            .unwrap_err();
        assert!(matches!(err, AuthzError::Bitmask(CoreError::SizeMismatch { .. })));
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let mut store = store_with(&[1, 2]);
        store.apply(GraphMutation::insert_edge(1, 2, mask("1111"))).unwrap();
        assert!(matches!(
            store.apply(GraphMutation::insert_edge(1, 2, mask("0001"))),
            Err(AuthzError::DuplicateEdge { .. })
        ));
    }

    #[test]
    fn test_delete_node_cascades_edges_first() {
        let mut store = store_with(&[1, 2, 3]);
        store.apply(GraphMutation::insert_edge(1, 2, mask("1111"))).unwrap();
        store.apply(GraphMutation::insert_edge(2, 3, mask("1010"))).unwrap();

        let events = store.apply(GraphMutation::delete_node(2)).unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], MaintenanceEvent::EdgeDeleted { .. }));
        assert!(matches!(events[1], MaintenanceEvent::EdgeDeleted { .. }));
        assert_eq!(events[2], MaintenanceEvent::NodeDeleted { id: NodeId(2) });
        assert_eq!(store.edge_count(), 0);
        assert!(!store.contains_node(NodeId(2)));
    }

    #[test]
    fn test_rename_rewrites_edges() {
        let mut store = store_with(&[1, 2, 3]);
        store.apply(GraphMutation::insert_edge(1, 2, mask("1111"))).unwrap();
        store.apply(GraphMutation::insert_edge(2, 3, mask("1010"))).unwrap();

        let events = store.apply(GraphMutation::rename_node(2, 20)).unwrap();
        assert_eq!(
            events[0],
            MaintenanceEvent::NodeRenamed {
                from: NodeId(2),
                to: NodeId(20)
            }
        );
        assert_eq!(events.len(), 3);
        assert_eq!(store.edge(NodeId(1), NodeId(20)), Some(&mask("1111")));
        assert_eq!(store.edge(NodeId(20), NodeId(3)), Some(&mask("1010")));
        assert!(store.edge(NodeId(1), NodeId(2)).is_none());
    }

    #[test]
    fn test_rename_self_loop() {
        let mut store = store_with(&[1]);
        store.apply(GraphMutation::insert_edge(1, 1, mask("0110"))).unwrap();
        let events = store.apply(GraphMutation::rename_node(1, 5)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(store.edge(NodeId(5), NodeId(5)), Some(&mask("0110")));
    }

    #[test]
    fn test_update_edge_reattach() {
        let mut store = store_with(&[1, 2, 3]);
        store.apply(GraphMutation::insert_edge(1, 2, mask("1111"))).unwrap();

        let events = store
            .apply(GraphMutation::UpdateEdge {
                parent: NodeId(1),
                child: NodeId(2),
                new_parent: None,
                new_child: Some(NodeId(3)),
                permission: None,
            })
            .unwrap();

        match &events[0] {
            MaintenanceEvent::EdgeUpdated { old, new } => {
                assert_eq!(old.child, NodeId(2));
                assert_eq!(new.child, NodeId(3));
                assert_eq!(new.permission, mask("1111"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(store.edge(NodeId(1), NodeId(2)).is_none());
        assert!(store.edge(NodeId(1), NodeId(3)).is_some());
    }

    #[test]
    fn test_rejected_update_leaves_store_untouched() {
        let mut store = store_with(&[1, 2]);
        store.apply(GraphMutation::insert_edge(1, 2, mask("1111"))).unwrap();
        let result = store.apply(GraphMutation::UpdateEdge {
            parent: NodeId(1),
            child: NodeId(2),
            new_parent: Some(NodeId(7)),
            new_child: None,
            permission: None,
        });
        assert!(result.is_err());
        assert_eq!(store.edge(NodeId(1), NodeId(2)), Some(&mask("1111")));
    }

    #[test]
    fn test_mutation_json_shape() {
        let json = r#"{"op":"insert_edge","parent":1,"child":2,"permission":"1010"}"#;
        let mutation: GraphMutation = serde_json::from_str(json).unwrap();
        assert_eq!(mutation, GraphMutation::insert_edge(1, 2, mask("1010")));
    }
}
