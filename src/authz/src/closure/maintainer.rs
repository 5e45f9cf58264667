//! Incremental closure maintenance
//!
//! Consumes the events a [`GraphStore`] mutation produced and brings the
//! [`ClosureCache`] back in line before the next read. Events are handled
//! against the store as it stands after the whole mutation, cascades
//! included.
//!
//! | event        | rule                                                         |
//! |--------------|--------------------------------------------------------------|
//! | node insert  | upsert `(n, n, ALL_ONES)`                                    |
//! | node rename  | move the self entry; incident edges arrive as edge updates   |
//! | node delete  | drop the self entry; incident edges arrive as edge deletes   |
//! | edge insert  | recompute ancestors of the child and of every descendant     |
//! | edge delete  | purge the child's subtree by descendant, then recompute it   |
//! | edge update  | delete rule with the old row, insert rule with the new row   |

use super::cache::ClosureCache;
use super::computer::ClosureComputer;
use crate::graph::{GraphStore, MaintenanceEvent};
use hierarch_core::{Bitmask, NodeId};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Work done for one or more events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Events consumed
    pub events: usize,
    /// Descendant ids whose ancestor rows were rewritten or dropped
    pub touched: BTreeSet<NodeId>,
    /// Entries written by upserts
    pub entries_written: usize,
    /// Entries dropped
    pub entries_removed: usize,
}

impl MaintenanceReport {
    pub fn merge(&mut self, other: MaintenanceReport) {
        self.events += other.events;
        self.touched.extend(other.touched);
        self.entries_written += other.entries_written;
        self.entries_removed += other.entries_removed;
    }
}

/// Applies the per-event maintenance rules
#[derive(Debug, Clone, Copy)]
pub struct IncrementalMaintainer {
    computer: ClosureComputer,
}

impl IncrementalMaintainer {
    pub fn new(computer: ClosureComputer) -> Self {
        Self { computer }
    }

    pub fn computer(&self) -> &ClosureComputer {
        &self.computer
    }

    /// Apply every event in order
    pub fn handle_all(
        &self,
        store: &GraphStore,
        events: &[MaintenanceEvent],
        cache: &mut ClosureCache,
    ) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();
        for event in events {
            report.merge(self.handle(store, event, cache));
        }
        report
    }

    /// Apply one event
    pub fn handle(
        &self,
        store: &GraphStore,
        event: &MaintenanceEvent,
        cache: &mut ClosureCache,
    ) -> MaintenanceReport {
        let mut report = MaintenanceReport {
            events: 1,
            ..Default::default()
        };
        let size = store.bitmask_size();

        match event {
            MaintenanceEvent::NodeInserted { id } => {
                cache.upsert(*id, *id, Bitmask::all_ones(size));
                report.entries_written += 1;
                report.touched.insert(*id);
            }
            MaintenanceEvent::NodeRenamed { from, to } => {
                if cache.remove(*from, *from).is_some() {
                    report.entries_removed += 1;
                }
                if store.contains_node(*to) {
                    cache.upsert(*to, *to, Bitmask::all_ones(size));
                    report.entries_written += 1;
                }
                report.touched.insert(*from);
                report.touched.insert(*to);
            }
            MaintenanceEvent::NodeDeleted { id } => {
                report.entries_removed += cache.remove_descendant(*id);
                report.touched.insert(*id);
            }
            MaintenanceEvent::EdgeInserted { edge } => {
                self.insert_rule(store, edge.child, cache, &mut report);
            }
            MaintenanceEvent::EdgeDeleted { edge } => {
                self.delete_rule(store, edge.child, cache, &mut report);
            }
            MaintenanceEvent::EdgeUpdated { old, new } => {
                self.delete_rule(store, old.child, cache, &mut report);
                self.insert_rule(store, new.child, cache, &mut report);
            }
        }

        debug!(
            hierarchy = %store.kind(),
            ?event,
            written = report.entries_written,
            removed = report.entries_removed,
            "closure maintained"
        );
        report
    }

    /// Drop the cache and repopulate it from every node's ancestors
    ///
    /// Returns the number of entries written.
    pub fn reconcile(&self, store: &GraphStore, cache: &mut ClosureCache) -> usize {
        cache.clear();
        for node in store.nodes() {
            for (ancestor, permission) in self.computer.ancestors_of(store, node) {
                cache.upsert(ancestor, node, permission);
            }
        }
        info!(hierarchy = %store.kind(), entries = cache.len(), "closure reconciled");
        cache.len()
    }

    /// Build a fresh cache without touching the live one
    pub fn recompute(&self, store: &GraphStore) -> ClosureCache {
        let mut fresh = ClosureCache::new(store.kind());
        self.reconcile(store, &mut fresh);
        fresh
    }

    /// New paths only ever add ancestors, so fresh values overwrite in place
    fn insert_rule(
        &self,
        store: &GraphStore,
        child: NodeId,
        cache: &mut ClosureCache,
        report: &mut MaintenanceReport,
    ) {
        for member in self.subtree(store, child) {
            self.rewrite_ancestors(store, member, cache, report);
        }
    }

    /// Anything whose descendant sits under `child` may have leaned on the
    /// removed edge: purge all of it, then rebuild from what remains
    fn delete_rule(
        &self,
        store: &GraphStore,
        child: NodeId,
        cache: &mut ClosureCache,
        report: &mut MaintenanceReport,
    ) {
        let affected = self.subtree(store, child);
        for &member in &affected {
            report.entries_removed += cache.remove_descendant(member);
            report.touched.insert(member);
        }
        for member in affected {
            self.rewrite_ancestors(store, member, cache, report);
        }
    }

    /// `{root}` plus every descendant of `root`
    fn subtree(&self, store: &GraphStore, root: NodeId) -> BTreeSet<NodeId> {
        let mut members: BTreeSet<NodeId> = self.computer.descendants_of(store, root).into_keys().collect();
        members.insert(root);
        members
    }

    fn rewrite_ancestors(
        &self,
        store: &GraphStore,
        descendant: NodeId,
        cache: &mut ClosureCache,
        report: &mut MaintenanceReport,
    ) {
        for (ancestor, permission) in self.computer.ancestors_of(store, descendant) {
            cache.upsert(ancestor, descendant, permission);
            report.entries_written += 1;
        }
        report.touched.insert(descendant);
    }
}
