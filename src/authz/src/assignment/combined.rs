//! Assignments pre-joined with one hierarchy's closure
//!
//! With `combine_with = role` an entry keyed `(role_descendant, resource)`
//! holds the OR over every role `r` assigned to `resource` of
//! `assignment(resource, r) AND role_closure(r -> role_descendant)`. The
//! resource side is the mirror image. Authorization then needs only this
//! relation and the other hierarchy's closure.
//!
//! Entries are recomputed per combined id: drop every entry for the id, then
//! rebuild it from the id's ancestors in the side closure.

use super::bridge::{AssignmentBridge, AssignmentChange};
use crate::closure::ClosureCache;
use crate::error::{AuthzError, Result};
use hierarch_core::{Bitmask, HierarchyKind, NodeId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// One pre-joined fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CombinedEntry {
    /// Descendant in the combined hierarchy
    pub combined: NodeId,
    /// Id on the other side of the assignment
    pub other: NodeId,
    pub permission: Bitmask,
}

/// Materialized combined assignment cache
#[derive(Debug, Clone)]
pub struct CombinedCache {
    side: HierarchyKind,
    entries: HashMap<(NodeId, NodeId), Bitmask>,
    by_combined: HashMap<NodeId, BTreeSet<NodeId>>,
    stale: bool,
}

impl CombinedCache {
    /// An empty cache that must be rebuilt before reading
    pub fn new(side: HierarchyKind) -> Self {
        Self {
            side,
            entries: HashMap::new(),
            by_combined: HashMap::new(),
            stale: true,
        }
    }

    pub fn side(&self) -> HierarchyKind {
        self.side
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn mark_stale(&mut self) {
        if !self.stale {
            debug!(side = %self.side, "combined assignment cache marked stale");
        }
        self.stale = true;
    }

    /// The cache for reading
    ///
    /// # Errors
    ///
    /// `AuthzError::StaleCombinedCache` until the next rebuild.
    pub fn readable(&self) -> Result<&Self> {
        if self.stale {
            return Err(AuthzError::StaleCombinedCache);
        }
        Ok(self)
    }

    pub fn get(&self, combined: NodeId, other: NodeId) -> Option<&Bitmask> {
        self.entries.get(&(combined, other))
    }

    /// Entries for one combined id in `other` order
    pub fn for_combined(&self, combined: NodeId) -> impl Iterator<Item = (NodeId, &Bitmask)> + '_ {
        self.by_combined
            .get(&combined)
            .into_iter()
            .flatten()
            .filter_map(move |&other| self.entries.get(&(combined, other)).map(|p| (other, p)))
    }

    /// All entries sorted by key
    pub fn entries(&self) -> Vec<CombinedEntry> {
        let mut all: Vec<CombinedEntry> = self
            .entries
            .iter()
            .map(|(&(combined, other), permission)| CombinedEntry {
                combined,
                other,
                permission: permission.clone(),
            })
            .collect();
        all.sort_by_key(|e| (e.combined, e.other));
        all
    }

    /// Drop everything and rebuild from the bridge and the side closure
    pub fn rebuild(&mut self, bridge: &AssignmentBridge, side_cache: &ClosureCache) -> usize {
        self.entries.clear();
        self.by_combined.clear();

        for assignment in bridge.iter() {
            let other = assignment.id_on(self.other_side());
            for (descendant, closure) in side_cache.descendants(assignment.id_on(self.side)) {
                let joined = assignment.permission.and(closure);
                match self.entries.get_mut(&(descendant, other)) {
                    Some(acc) => acc.or_assign(&joined),
                    None => self.insert(descendant, other, joined),
                }
            }
        }

        self.stale = false;
        info!(side = %self.side, entries = self.entries.len(), "combined assignment cache rebuilt");
        self.entries.len()
    }

    /// Recompute every entry for the given combined ids; returns entries written
    pub fn refresh<I>(&mut self, combined_ids: I, bridge: &AssignmentBridge, side_cache: &ClosureCache) -> usize
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut written = 0;
        for combined in combined_ids {
            written += self.recompute_one(combined, bridge, side_cache);
        }
        written
    }

    /// Combined ids whose entries an assignment change may have altered
    ///
    /// Only the side closure as it stands now is consulted; ids that lost
    /// their link to the anchor in the same operation must come from the
    /// hierarchy's own maintenance report.
    pub fn affected_by(&self, change: &AssignmentChange, side_cache: &ClosureCache) -> BTreeSet<NodeId> {
        let mut ids = BTreeSet::new();
        for &(resource, role) in &change.keys {
            let anchor = match self.side {
                HierarchyKind::Resource => resource,
                HierarchyKind::Role => role,
            };
            ids.insert(anchor);
            ids.extend(side_cache.descendants(anchor).map(|(d, _)| d));
        }
        ids
    }

    fn recompute_one(&mut self, combined: NodeId, bridge: &AssignmentBridge, side_cache: &ClosureCache) -> usize {
        if let Some(others) = self.by_combined.remove(&combined) {
            for other in others {
                self.entries.remove(&(combined, other));
            }
        }

        let size = match side_cache.get(combined, combined) {
            Some(own) => own.size(),
            None => return 0,
        };
        let mut acc: BTreeMap<NodeId, Bitmask> = BTreeMap::new();
        for (ancestor, closure) in side_cache.ancestors(combined) {
            for (other, assigned) in bridge.on_side(self.side, ancestor) {
                acc.entry(other)
                    .or_insert_with(|| Bitmask::all_zeros(size))
                    .or_assign(&assigned.and(closure));
            }
        }

        let written = acc.len();
        for (other, permission) in acc {
            self.insert(combined, other, permission);
        }
        written
    }

    fn insert(&mut self, combined: NodeId, other: NodeId, permission: Bitmask) {
        self.by_combined.entry(combined).or_default().insert(other);
        self.entries.insert((combined, other), permission);
    }

    fn other_side(&self) -> HierarchyKind {
        match self.side {
            HierarchyKind::Resource => HierarchyKind::Role,
            HierarchyKind::Role => HierarchyKind::Resource,
        }
    }
}

impl PartialEq for CombinedCache {
    fn eq(&self, other: &Self) -> bool {
        self.side == other.side && self.entries == other.entries
    }
}
