//! Serializable graph state for bulk loading
//!
//! A snapshot is loaded with maintenance suspended and closed with a single
//! reconcile per cache, which is far cheaper than maintaining the closure
//! edge by edge.

use crate::assignment::{Assignment, AssignmentMutation};
use crate::error::Result;
use crate::graph::{Edge, GraphMutation, GraphStore};
use hierarch_core::NodeId;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Nodes and edges of one hierarchy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchySnapshot {
    #[serde(default)]
    pub nodes: Vec<NodeId>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl HierarchySnapshot {
    pub fn capture(store: &GraphStore) -> Self {
        Self {
            nodes: store.nodes().collect(),
            edges: store.edges().collect(),
        }
    }

    /// Node inserts first, then edge inserts
    pub fn mutations(&self) -> impl Iterator<Item = GraphMutation> + '_ {
        let nodes = self.nodes.iter().map(|&id| GraphMutation::InsertNode { id });
        let edges = self.edges.iter().map(|edge| GraphMutation::InsertEdge {
            parent: edge.parent,
            child: edge.child,
            permission: edge.permission.clone(),
        });
        nodes.chain(edges)
    }
}

/// Both hierarchies and the assignment relation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub resources: HierarchySnapshot,
    #[serde(default)]
    pub roles: HierarchySnapshot,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

impl GraphSnapshot {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn assignment_mutations(&self) -> impl Iterator<Item = AssignmentMutation> + '_ {
        self.assignments.iter().map(|a| AssignmentMutation::Insert {
            resource: a.resource,
            role: a.role,
            permission: a.permission.clone(),
        })
    }
}
