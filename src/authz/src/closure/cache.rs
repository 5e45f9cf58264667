//! Materialized closure relation
//!
//! Sparse set of `(ancestor, descendant, permission)` facts keyed by the
//! pair, with secondary indexes on each side so the maintainer can purge by
//! descendant and the evaluator can walk ancestors of a node.

use hierarch_core::{Bitmask, HierarchyKind, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// One materialized closure fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureEntry {
    pub ancestor: NodeId,
    pub descendant: NodeId,
    pub permission: Bitmask,
}

/// Difference between a live cache and a reference cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheDiff {
    /// In the reference, absent from the live cache
    pub missing: Vec<ClosureEntry>,
    /// In the live cache, absent from the reference
    pub unexpected: Vec<ClosureEntry>,
    /// Present in both with different permissions: (live, reference)
    pub mismatched: Vec<(ClosureEntry, ClosureEntry)>,
}

impl CacheDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.mismatched.is_empty()
    }

    /// Short human-readable account, used in drift errors
    pub fn summary(&self) -> String {
        format!(
            "{} missing, {} unexpected, {} mismatched",
            self.missing.len(),
            self.unexpected.len(),
            self.mismatched.len()
        )
    }
}

/// Closure cache for one hierarchy
#[derive(Debug, Clone)]
pub struct ClosureCache {
    kind: HierarchyKind,
    entries: HashMap<(NodeId, NodeId), Bitmask>,
    by_ancestor: HashMap<NodeId, BTreeSet<NodeId>>,
    by_descendant: HashMap<NodeId, BTreeSet<NodeId>>,
}

impl ClosureCache {
    pub fn new(kind: HierarchyKind) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
            by_ancestor: HashMap::new(),
            by_descendant: HashMap::new(),
        }
    }

    pub fn kind(&self) -> HierarchyKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, ancestor: NodeId, descendant: NodeId) -> Option<&Bitmask> {
        self.entries.get(&(ancestor, descendant))
    }

    /// Ancestors of `descendant` in id order
    pub fn ancestors(&self, descendant: NodeId) -> impl Iterator<Item = (NodeId, &Bitmask)> + '_ {
        self.by_descendant
            .get(&descendant)
            .into_iter()
            .flatten()
            .filter_map(move |&a| self.entries.get(&(a, descendant)).map(|p| (a, p)))
    }

    /// Descendants of `ancestor` in id order
    pub fn descendants(&self, ancestor: NodeId) -> impl Iterator<Item = (NodeId, &Bitmask)> + '_ {
        self.by_ancestor
            .get(&ancestor)
            .into_iter()
            .flatten()
            .filter_map(move |&d| self.entries.get(&(ancestor, d)).map(|p| (d, p)))
    }

    /// Insert or overwrite one entry
    pub fn upsert(&mut self, ancestor: NodeId, descendant: NodeId, permission: Bitmask) {
        self.by_ancestor.entry(ancestor).or_default().insert(descendant);
        self.by_descendant.entry(descendant).or_default().insert(ancestor);
        self.entries.insert((ancestor, descendant), permission);
    }

    pub fn remove(&mut self, ancestor: NodeId, descendant: NodeId) -> Option<Bitmask> {
        let removed = self.entries.remove(&(ancestor, descendant))?;
        Self::unindex(&mut self.by_ancestor, ancestor, descendant);
        Self::unindex(&mut self.by_descendant, descendant, ancestor);
        Some(removed)
    }

    /// Drop every entry whose descendant is `descendant`; returns the count
    pub fn remove_descendant(&mut self, descendant: NodeId) -> usize {
        let ancestors = self.by_descendant.remove(&descendant).unwrap_or_default();
        for &ancestor in &ancestors {
            self.entries.remove(&(ancestor, descendant));
            Self::unindex(&mut self.by_ancestor, ancestor, descendant);
        }
        ancestors.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_ancestor.clear();
        self.by_descendant.clear();
    }

    /// All entries sorted by (ancestor, descendant)
    pub fn entries(&self) -> Vec<ClosureEntry> {
        let mut all: Vec<ClosureEntry> = self
            .entries
            .iter()
            .map(|(&(ancestor, descendant), permission)| ClosureEntry {
                ancestor,
                descendant,
                permission: permission.clone(),
            })
            .collect();
        all.sort_by_key(|e| (e.ancestor, e.descendant));
        all
    }

    /// Compare against a reference cache, typically a fresh reconcile
    pub fn diff(&self, reference: &ClosureCache) -> CacheDiff {
        let mut diff = CacheDiff::default();
        for entry in reference.entries() {
            match self.get(entry.ancestor, entry.descendant) {
                None => diff.missing.push(entry),
                Some(live) if *live != entry.permission => {
                    let live = ClosureEntry {
                        permission: live.clone(),
                        ..entry.clone()
                    };
                    diff.mismatched.push((live, entry));
                }
                Some(_) => {}
            }
        }
        for entry in self.entries() {
            if reference.get(entry.ancestor, entry.descendant).is_none() {
                diff.unexpected.push(entry);
            }
        }
        diff
    }

    fn unindex(index: &mut HashMap<NodeId, BTreeSet<NodeId>>, key: NodeId, value: NodeId) {
        if let Some(set) = index.get_mut(&key) {
            set.remove(&value);
            if set.is_empty() {
                index.remove(&key);
            }
        }
    }
}

impl PartialEq for ClosureCache {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for ClosureCache {}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(text: &str) -> Bitmask {
        text.parse().unwrap()
    }

    #[test]
    fn test_upsert_overwrites() {
        let mut cache = ClosureCache::new(HierarchyKind::Role);
        cache.upsert(NodeId(1), NodeId(2), mask("1000"));
        cache.upsert(NodeId(1), NodeId(2), mask("0100"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(NodeId(1), NodeId(2)), Some(&mask("0100")));
    }

    #[test]
    fn test_indexes_follow_removal() {
        let mut cache = ClosureCache::new(HierarchyKind::Resource);
        cache.upsert(NodeId(1), NodeId(3), mask("1111"));
        cache.upsert(NodeId(2), NodeId(3), mask("1100"));
        cache.upsert(NodeId(1), NodeId(4), mask("1010"));

        assert_eq!(cache.ancestors(NodeId(3)).count(), 2);
        assert_eq!(cache.remove_descendant(NodeId(3)), 2);
        assert_eq!(cache.ancestors(NodeId(3)).count(), 0);

        let below_one: Vec<NodeId> = cache.descendants(NodeId(1)).map(|(d, _)| d).collect();
        assert_eq!(below_one, vec![NodeId(4)]);

        assert!(cache.remove(NodeId(1), NodeId(4)).is_some());
        assert!(cache.is_empty());
        assert_eq!(cache.descendants(NodeId(1)).count(), 0);
    }

    #[test]
    fn test_diff() {
        let mut live = ClosureCache::new(HierarchyKind::Resource);
        let mut reference = ClosureCache::new(HierarchyKind::Resource);
        live.upsert(NodeId(1), NodeId(1), mask("1111"));
        live.upsert(NodeId(1), NodeId(2), mask("1000"));
        live.upsert(NodeId(9), NodeId(2), mask("1000"));
        reference.upsert(NodeId(1), NodeId(1), mask("1111"));
        reference.upsert(NodeId(1), NodeId(2), mask("1100"));
        reference.upsert(NodeId(3), NodeId(3), mask("1111"));

        let diff = live.diff(&reference);
        assert_eq!(diff.missing.len(), 1);
        assert_eq!(diff.unexpected.len(), 1);
        assert_eq!(diff.mismatched.len(), 1);
        assert_eq!(diff.summary(), "1 missing, 1 unexpected, 1 mismatched");
        assert!(reference.diff(&reference).is_empty());
    }
}
