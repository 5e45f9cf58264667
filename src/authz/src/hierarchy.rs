//! One hierarchy: store, closure cache and maintainer behind a single
//! mutation entry point
//!
//! Every mutation goes through [`Hierarchy::apply`], which writes the store
//! and maintains the cache in the same call, so a read issued after `apply`
//! returns always sees the post-mutation closure. [`Hierarchy::suspend`]
//! opens a bulk-load window in which the cache is left alone;
//! [`Hierarchy::resume`] closes it with a full reconcile.

use crate::closure::{CacheDiff, ClosureCache, ClosureComputer, IncrementalMaintainer, MaintenanceReport};
use crate::error::{AuthzError, Result};
use crate::graph::{GraphMutation, GraphStore, MaintenanceEvent};
use hierarch_core::{BitmaskSize, HierarchyKind};
use tracing::{info, warn};

/// Outcome of one mutation
#[derive(Debug, Clone, Default)]
pub struct HierarchyChange {
    /// Events the store emitted, cascades included
    pub events: Vec<MaintenanceEvent>,
    /// Cache work done; empty while suspended
    pub report: MaintenanceReport,
    /// False when the mutation landed inside a suspended window
    pub maintained: bool,
}

/// A resource or role hierarchy with its closure cache
#[derive(Debug, Clone)]
pub struct Hierarchy {
    store: GraphStore,
    cache: ClosureCache,
    maintainer: IncrementalMaintainer,
    suspended: bool,
}

impl Hierarchy {
    pub fn new(kind: HierarchyKind, size: BitmaskSize, max_depth: usize) -> Self {
        Self {
            store: GraphStore::new(kind, size),
            cache: ClosureCache::new(kind),
            maintainer: IncrementalMaintainer::new(ClosureComputer::new(max_depth)),
            suspended: false,
        }
    }

    pub fn kind(&self) -> HierarchyKind {
        self.store.kind()
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// The live cache, whether or not it is current
    pub fn cache(&self) -> &ClosureCache {
        &self.cache
    }

    /// The cache for reading
    ///
    /// # Errors
    ///
    /// `AuthzError::Suspended` inside a bulk-load window.
    pub fn readable_cache(&self) -> Result<&ClosureCache> {
        if self.suspended {
            return Err(AuthzError::Suspended(format!("{} hierarchy", self.kind())));
        }
        Ok(&self.cache)
    }

    pub fn computer(&self) -> &ClosureComputer {
        self.maintainer.computer()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Mutate the store and, unless suspended, the cache
    pub fn apply(&mut self, mutation: GraphMutation) -> Result<HierarchyChange> {
        let events = self.store.apply(mutation)?;
        if self.suspended {
            return Ok(HierarchyChange {
                events,
                report: MaintenanceReport::default(),
                maintained: false,
            });
        }

        let report = self.maintainer.handle_all(&self.store, &events, &mut self.cache);

        #[cfg(feature = "hardened")]
        self.assert_consistent();

        Ok(HierarchyChange {
            events,
            report,
            maintained: true,
        })
    }

    /// Stop maintaining the cache until [`resume`](Self::resume)
    pub fn suspend(&mut self) {
        if !self.suspended {
            info!(hierarchy = %self.kind(), "closure maintenance suspended");
        }
        self.suspended = true;
    }

    /// Re-enable maintenance and reconcile; returns the entry count
    pub fn resume(&mut self) -> usize {
        self.suspended = false;
        self.reconcile()
    }

    /// Rebuild the cache from scratch
    pub fn reconcile(&mut self) -> usize {
        self.maintainer.reconcile(&self.store, &mut self.cache)
    }

    /// Diff the live cache against a full recompute
    pub fn validate(&self) -> CacheDiff {
        let fresh = self.maintainer.recompute(&self.store);
        self.cache.diff(&fresh)
    }

    /// [`validate`](Self::validate) as an error
    ///
    /// A suspended hierarchy is expected to be out of date and passes.
    pub fn ensure_consistent(&self) -> Result<()> {
        if self.suspended {
            return Ok(());
        }
        let diff = self.validate();
        if diff.is_empty() {
            Ok(())
        } else {
            warn!(hierarchy = %self.kind(), drift = %diff.summary(), "closure cache drift");
            Err(AuthzError::CacheDrift {
                kind: self.kind(),
                detail: diff.summary(),
            })
        }
    }

    #[cfg(feature = "hardened")]
    fn assert_consistent(&self) {
        let diff = self.validate();
        assert!(
            diff.is_empty(),
            "{} closure cache drifted from recompute: {:?}",
            self.kind(),
            diff
        );
    }
}
