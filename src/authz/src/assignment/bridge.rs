//! Assignment relation linking role nodes to resource nodes

use crate::error::{AuthzError, Result};
use crate::graph::GraphStore;
use hierarch_core::{Bitmask, BitmaskSize, CoreError, HierarchyKind, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Grants a role node visibility into a resource node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub resource: NodeId,
    pub role: NodeId,
    pub permission: Bitmask,
}

impl Assignment {
    /// The id on the given side of the bridge
    pub fn id_on(&self, kind: HierarchyKind) -> NodeId {
        match kind {
            HierarchyKind::Resource => self.resource,
            HierarchyKind::Role => self.role,
        }
    }
}

/// A requested change to the assignment relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AssignmentMutation {
    Insert {
        resource: NodeId,
        role: NodeId,
        permission: Bitmask,
    },
    Update {
        resource: NodeId,
        role: NodeId,
        permission: Bitmask,
    },
    Delete {
        resource: NodeId,
        role: NodeId,
    },
}

impl AssignmentMutation {
    pub fn insert(resource: impl Into<NodeId>, role: impl Into<NodeId>, permission: Bitmask) -> Self {
        AssignmentMutation::Insert {
            resource: resource.into(),
            role: role.into(),
            permission,
        }
    }

    pub fn update(resource: impl Into<NodeId>, role: impl Into<NodeId>, permission: Bitmask) -> Self {
        AssignmentMutation::Update {
            resource: resource.into(),
            role: role.into(),
            permission,
        }
    }

    pub fn delete(resource: impl Into<NodeId>, role: impl Into<NodeId>) -> Self {
        AssignmentMutation::Delete {
            resource: resource.into(),
            role: role.into(),
        }
    }
}

/// `(resource, role)` keys written or removed by a change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentChange {
    pub keys: BTreeSet<(NodeId, NodeId)>,
}

impl AssignmentChange {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn merge(&mut self, other: AssignmentChange) {
        self.keys.extend(other.keys);
    }
}

/// The assignment relation with an index on each side
#[derive(Debug, Clone)]
pub struct AssignmentBridge {
    size: BitmaskSize,
    edges: BTreeMap<(NodeId, NodeId), Bitmask>,
    by_resource: HashMap<NodeId, BTreeSet<NodeId>>,
    by_role: HashMap<NodeId, BTreeSet<NodeId>>,
}

impl AssignmentBridge {
    pub fn new(size: BitmaskSize) -> Self {
        Self {
            size,
            edges: BTreeMap::new(),
            by_resource: HashMap::new(),
            by_role: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn get(&self, resource: NodeId, role: NodeId) -> Option<&Bitmask> {
        self.edges.get(&(resource, role))
    }

    pub fn iter(&self) -> impl Iterator<Item = Assignment> + '_ {
        self.edges.iter().map(|(&(resource, role), permission)| Assignment {
            resource,
            role,
            permission: permission.clone(),
        })
    }

    /// Roles assigned to `resource`
    pub fn roles_of(&self, resource: NodeId) -> impl Iterator<Item = (NodeId, &Bitmask)> + '_ {
        self.by_resource
            .get(&resource)
            .into_iter()
            .flatten()
            .filter_map(move |&role| self.edges.get(&(resource, role)).map(|p| (role, p)))
    }

    /// Resources assigned to `role`
    pub fn resources_of(&self, role: NodeId) -> impl Iterator<Item = (NodeId, &Bitmask)> + '_ {
        self.by_role
            .get(&role)
            .into_iter()
            .flatten()
            .filter_map(move |&resource| self.edges.get(&(resource, role)).map(|p| (resource, p)))
    }

    /// Assignments whose id on `kind`'s side is `id`, as (other side id, permission)
    pub fn on_side(&self, kind: HierarchyKind, id: NodeId) -> Vec<(NodeId, &Bitmask)> {
        match kind {
            HierarchyKind::Resource => self.roles_of(id).collect(),
            HierarchyKind::Role => self.resources_of(id).collect(),
        }
    }

    /// Apply a mutation, checking both endpoints against their stores
    pub fn apply(
        &mut self,
        mutation: AssignmentMutation,
        resources: &GraphStore,
        roles: &GraphStore,
    ) -> Result<AssignmentChange> {
        let mut change = AssignmentChange::default();
        match mutation {
            AssignmentMutation::Insert {
                resource,
                role,
                permission,
            } => {
                self.check_width(&permission)?;
                Self::require(resources, resource)?;
                Self::require(roles, role)?;
                if self.edges.contains_key(&(resource, role)) {
                    return Err(AuthzError::DuplicateAssignment { resource, role });
                }
                self.link(resource, role, permission);
                change.keys.insert((resource, role));
            }
            AssignmentMutation::Update {
                resource,
                role,
                permission,
            } => {
                self.check_width(&permission)?;
                let slot = self
                    .edges
                    .get_mut(&(resource, role))
                    .ok_or(AuthzError::UnknownAssignment { resource, role })?;
                *slot = permission;
                change.keys.insert((resource, role));
            }
            AssignmentMutation::Delete { resource, role } => {
                self.unlink(resource, role)
                    .ok_or(AuthzError::UnknownAssignment { resource, role })?;
                change.keys.insert((resource, role));
            }
        }
        Ok(change)
    }

    /// Drop every assignment touching a deleted node
    pub fn cascade_node_deleted(&mut self, kind: HierarchyKind, id: NodeId) -> AssignmentChange {
        let mut change = AssignmentChange::default();
        for key in self.keys_touching(kind, id) {
            self.unlink(key.0, key.1);
            change.keys.insert(key);
        }
        if !change.is_empty() {
            debug!(hierarchy = %kind, node = %id, removed = change.keys.len(), "assignments cascaded on delete");
        }
        change
    }

    /// Rewrite every assignment touching a renamed node
    pub fn cascade_node_renamed(&mut self, kind: HierarchyKind, from: NodeId, to: NodeId) -> AssignmentChange {
        let mut change = AssignmentChange::default();
        for (resource, role) in self.keys_touching(kind, from) {
            if let Some(permission) = self.unlink(resource, role) {
                let moved = match kind {
                    HierarchyKind::Resource => (to, role),
                    HierarchyKind::Role => (resource, to),
                };
                self.link(moved.0, moved.1, permission);
                change.keys.insert((resource, role));
                change.keys.insert(moved);
            }
        }
        change
    }

    fn keys_touching(&self, kind: HierarchyKind, id: NodeId) -> Vec<(NodeId, NodeId)> {
        match kind {
            HierarchyKind::Resource => self.roles_of(id).map(|(role, _)| (id, role)).collect(),
            HierarchyKind::Role => self.resources_of(id).map(|(resource, _)| (resource, id)).collect(),
        }
    }

    fn link(&mut self, resource: NodeId, role: NodeId, permission: Bitmask) {
        self.by_resource.entry(resource).or_default().insert(role);
        self.by_role.entry(role).or_default().insert(resource);
        self.edges.insert((resource, role), permission);
    }

    fn unlink(&mut self, resource: NodeId, role: NodeId) -> Option<Bitmask> {
        let permission = self.edges.remove(&(resource, role))?;
        if let Some(set) = self.by_resource.get_mut(&resource) {
            set.remove(&role);
            if set.is_empty() {
                self.by_resource.remove(&resource);
            }
        }
        if let Some(set) = self.by_role.get_mut(&role) {
            set.remove(&resource);
            if set.is_empty() {
                self.by_role.remove(&role);
            }
        }
        Some(permission)
    }

    fn require(store: &GraphStore, id: NodeId) -> Result<()> {
        if store.contains_node(id) {
            Ok(())
        } else {
            Err(AuthzError::UnknownNode { kind: store.kind(), id })
        }
    }

    fn check_width(&self, permission: &Bitmask) -> Result<()> {
        if permission.size() != self.size {
            return Err(CoreError::size_mismatch(self.size.get(), permission.size().get()).into());
        }
        Ok(())
    }
}
