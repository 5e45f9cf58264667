//! Engine facade
//!
//! Owns both hierarchies, the assignment bridge and the optional combined
//! cache behind one lock. Each mutation, with its cascades and all cache
//! maintenance, runs inside a single write-lock critical section, so any
//! check that acquires the lock afterwards observes the post-mutation state.
//!
//! # Architecture
//!
//! ```text
//! GraphMutation → GraphStore → MaintenanceEvent → IncrementalMaintainer → ClosureCache
//!                     ↓                                                     ↓
//!              AssignmentBridge (cascades) → CombinedCache          AuthorizationEvaluator
//!                                                                           ↓
//!                                                             AccessDecision → Metrics
//! ```

pub mod decision;
pub mod evaluator;
pub mod metrics;

pub use decision::{AccessDecision, DecisionReason};
pub use evaluator::{AuthorizationEvaluator, PrincipalResolver, Witness};
pub use metrics::{EngineMetrics, MetricsCollector};

use crate::assignment::{AssignmentBridge, AssignmentChange, AssignmentMutation, CombinedCache, CombinedEntry};
use crate::closure::{CacheDiff, ClosureEntry, MaintenanceReport};
use crate::config::{CapabilityTable, CombinedRefresh, EngineConfig, Operation};
use crate::error::{AuthzError, Result};
use crate::graph::{GraphMutation, MaintenanceEvent};
use crate::hierarchy::Hierarchy;
use crate::snapshot::{GraphSnapshot, HierarchySnapshot};
use hierarch_core::{Bitmask, BitmaskSize, HierarchyKind, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// What a suspend / resume / reconcile call acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceTarget {
    Resource,
    Role,
    /// The assignment bridge's combined cache
    Assignment,
}

impl From<HierarchyKind> for MaintenanceTarget {
    fn from(kind: HierarchyKind) -> Self {
        match kind {
            HierarchyKind::Resource => MaintenanceTarget::Resource,
            HierarchyKind::Role => MaintenanceTarget::Role,
        }
    }
}

impl fmt::Display for MaintenanceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MaintenanceTarget::Resource => "resource",
            MaintenanceTarget::Role => "role",
            MaintenanceTarget::Assignment => "assignment",
        })
    }
}

impl FromStr for MaintenanceTarget {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "resource" => Ok(MaintenanceTarget::Resource),
            "role" => Ok(MaintenanceTarget::Role),
            "assignment" => Ok(MaintenanceTarget::Assignment),
            other => Err(AuthzError::InvalidInput(format!("unknown maintenance target: {other}"))),
        }
    }
}

/// Summary of one applied hierarchy mutation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    /// Store events, cascades included
    pub events: usize,
    /// False when the hierarchy was suspended
    pub maintained: bool,
    pub entries_written: usize,
    pub entries_removed: usize,
    /// Assignments rewritten or dropped by node rename/delete
    pub assignments_cascaded: usize,
}

/// Result of a validation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub resource: CacheDiff,
    pub role: CacheDiff,
    /// `None` without a combined cache or while it awaits a rebuild
    pub combined_consistent: Option<bool>,
}

impl ValidationReport {
    pub fn is_consistent(&self) -> bool {
        self.resource.is_empty() && self.role.is_empty() && self.combined_consistent != Some(false)
    }
}

/// Everything behind the engine lock
#[derive(Debug, Clone)]
struct EngineState {
    resources: Hierarchy,
    roles: Hierarchy,
    bridge: AssignmentBridge,
    combined: Option<CombinedCache>,
    refresh: CombinedRefresh,
    assignments_suspended: bool,
}

impl EngineState {
    fn new(config: &EngineConfig, size: BitmaskSize) -> Self {
        let resources = Hierarchy::new(HierarchyKind::Resource, size, config.max_depth.resource);
        let roles = Hierarchy::new(HierarchyKind::Role, size, config.max_depth.role);
        let bridge = AssignmentBridge::new(size);
        let mut state = Self {
            resources,
            roles,
            bridge,
            combined: config.combine_with.side().map(CombinedCache::new),
            refresh: config.combined_refresh,
            assignments_suspended: false,
        };
        state.rebuild_combined();
        state
    }

    fn hierarchy(&self, kind: HierarchyKind) -> &Hierarchy {
        match kind {
            HierarchyKind::Resource => &self.resources,
            HierarchyKind::Role => &self.roles,
        }
    }

    fn hierarchy_mut(&mut self, kind: HierarchyKind) -> &mut Hierarchy {
        match kind {
            HierarchyKind::Resource => &mut self.resources,
            HierarchyKind::Role => &mut self.roles,
        }
    }

    fn apply(&mut self, kind: HierarchyKind, mutation: GraphMutation) -> Result<(MutationOutcome, MaintenanceReport)> {
        let change = self.hierarchy_mut(kind).apply(mutation)?;

        let mut cascaded = AssignmentChange::default();
        for event in &change.events {
            match *event {
                MaintenanceEvent::NodeDeleted { id } => {
                    cascaded.merge(self.bridge.cascade_node_deleted(kind, id));
                }
                MaintenanceEvent::NodeRenamed { from, to } => {
                    cascaded.merge(self.bridge.cascade_node_renamed(kind, from, to));
                }
                _ => {}
            }
        }

        let touched = if change.events.is_empty() {
            None
        } else {
            Some((kind, &change.report.touched))
        };
        self.maintain_combined(touched, &cascaded);

        let outcome = MutationOutcome {
            events: change.events.len(),
            maintained: change.maintained,
            entries_written: change.report.entries_written,
            entries_removed: change.report.entries_removed,
            assignments_cascaded: cascaded.keys.len(),
        };
        Ok((outcome, change.report))
    }

    fn apply_assignment(&mut self, mutation: AssignmentMutation) -> Result<AssignmentChange> {
        let change = self
            .bridge
            .apply(mutation, self.resources.store(), self.roles.store())?;
        self.maintain_combined(None, &change);
        Ok(change)
    }

    /// Keep the combined cache in step with a hierarchy and/or assignment change
    fn maintain_combined(&mut self, hierarchy: Option<(HierarchyKind, &BTreeSet<NodeId>)>, assignments: &AssignmentChange) {
        let Some(combined) = self.combined.as_mut() else {
            return;
        };
        let side = combined.side();
        let side_touched = hierarchy.filter(|(kind, _)| *kind == side).map(|(_, touched)| touched);
        if side_touched.is_none() && assignments.is_empty() {
            return;
        }

        let side_hierarchy = match side {
            HierarchyKind::Resource => &self.resources,
            HierarchyKind::Role => &self.roles,
        };
        if self.refresh == CombinedRefresh::Reconcile || self.assignments_suspended || side_hierarchy.is_suspended() {
            combined.mark_stale();
            return;
        }
        if combined.is_stale() {
            return;
        }

        let side_cache = side_hierarchy.cache();
        let mut ids: BTreeSet<NodeId> = side_touched.cloned().unwrap_or_default();
        ids.extend(combined.affected_by(assignments, side_cache));
        let written = combined.refresh(ids, &self.bridge, side_cache);
        debug!(side = %side, written, "combined assignment cache refreshed");
    }

    /// Rebuild the combined cache if nothing it depends on is suspended
    fn rebuild_combined(&mut self) -> usize {
        let Some(combined) = self.combined.as_mut() else {
            return 0;
        };
        let side_hierarchy = match combined.side() {
            HierarchyKind::Resource => &self.resources,
            HierarchyKind::Role => &self.roles,
        };
        if self.assignments_suspended || side_hierarchy.is_suspended() {
            return 0;
        }
        combined.rebuild(&self.bridge, side_hierarchy.cache())
    }

    fn is_suspended(&self, target: MaintenanceTarget) -> bool {
        match target {
            MaintenanceTarget::Resource => self.resources.is_suspended(),
            MaintenanceTarget::Role => self.roles.is_suspended(),
            MaintenanceTarget::Assignment => self.assignments_suspended,
        }
    }

    fn suspend(&mut self, target: MaintenanceTarget) {
        match target {
            MaintenanceTarget::Resource => self.resources.suspend(),
            MaintenanceTarget::Role => self.roles.suspend(),
            MaintenanceTarget::Assignment => self.assignments_suspended = true,
        }
        let side = self.combined.as_ref().map(|c| MaintenanceTarget::from(c.side()));
        if let Some(combined) = self.combined.as_mut() {
            if target == MaintenanceTarget::Assignment || Some(target) == side {
                combined.mark_stale();
            }
        }
    }

    /// Lift suspension and rebuild; returns entries written
    fn resume(&mut self, target: MaintenanceTarget) -> usize {
        let mut written = match target {
            MaintenanceTarget::Resource => self.resources.resume(),
            MaintenanceTarget::Role => self.roles.resume(),
            MaintenanceTarget::Assignment => {
                self.assignments_suspended = false;
                0
            }
        };
        if self.combined.as_ref().is_some_and(CombinedCache::is_stale) {
            written += self.rebuild_combined();
        }
        written
    }

    fn reconcile(&mut self, target: MaintenanceTarget) -> Result<usize> {
        match target {
            MaintenanceTarget::Resource | MaintenanceTarget::Role => {
                let kind = match target {
                    MaintenanceTarget::Resource => HierarchyKind::Resource,
                    _ => HierarchyKind::Role,
                };
                let mut written = self.hierarchy_mut(kind).reconcile();
                if self.combined.as_ref().is_some_and(|c| c.side() == kind) {
                    written += self.rebuild_combined();
                }
                Ok(written)
            }
            MaintenanceTarget::Assignment => {
                let Some(side) = self.combined.as_ref().map(CombinedCache::side) else {
                    return Ok(0);
                };
                if self.hierarchy(side).is_suspended() {
                    return Err(AuthzError::Suspended(format!("{side} hierarchy")));
                }
                if self.assignments_suspended {
                    return Err(AuthzError::Suspended("assignment bridge".to_string()));
                }
                Ok(self.rebuild_combined())
            }
        }
    }

    /// An evaluator over current caches, refusing anything mid-maintenance
    fn evaluator(&self) -> Result<AuthorizationEvaluator<'_>> {
        let resources = self.resources.readable_cache()?;
        let roles = self.roles.readable_cache()?;
        if self.assignments_suspended {
            return Err(AuthzError::Suspended("assignment bridge".to_string()));
        }
        let evaluator = AuthorizationEvaluator::new(resources, roles, &self.bridge);
        match &self.combined {
            None => Ok(evaluator),
            Some(combined) => Ok(evaluator.with_combined(combined.readable()?)),
        }
    }

    fn validate(&self) -> ValidationReport {
        let combined_consistent = self.combined.as_ref().filter(|c| !c.is_stale()).map(|live| {
            let mut fresh = CombinedCache::new(live.side());
            fresh.rebuild(&self.bridge, self.hierarchy(live.side()).cache());
            fresh == *live
        });
        ValidationReport {
            resource: if self.resources.is_suspended() { CacheDiff::default() } else { self.resources.validate() },
            role: if self.roles.is_suspended() { CacheDiff::default() } else { self.roles.validate() },
            combined_consistent,
        }
    }
}

/// Hierarchical authorization engine
pub struct AuthzEngine {
    config: EngineConfig,
    capabilities: CapabilityTable,
    size: BitmaskSize,
    state: RwLock<EngineState>,
    metrics: Arc<MetricsCollector>,
}

impl AuthzEngine {
    /// Create an engine with empty hierarchies
    ///
    /// # Errors
    ///
    /// `AuthzError::Configuration` if the configuration does not validate.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let size = config.bitmask_size()?;
        let capabilities = config.capability_table();
        let state = EngineState::new(&config, size);

        info!(
            bitmap_size = size.get(),
            resource_depth = config.max_depth.resource,
            role_depth = config.max_depth.role,
            combine_with = ?config.combine_with,
            capabilities = capabilities.len(),
            "authorization engine initialized"
        );

        Ok(Self {
            config,
            capabilities,
            size,
            state: RwLock::new(state),
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    pub fn bitmask_size(&self) -> BitmaskSize {
        self.size
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    /// Parse a permission at the configured width
    pub fn parse_permission(&self, text: &str) -> Result<Bitmask> {
        Ok(Bitmask::parse_with_size(text, self.size)?)
    }

    /// Apply one hierarchy mutation with its cascades and maintenance
    pub async fn apply(&self, kind: HierarchyKind, mutation: GraphMutation) -> Result<MutationOutcome> {
        let result = {
            let mut state = self.state.write().await;
            state.apply(kind, mutation)
        };
        self.record_mutation(kind, result).await
    }

    /// Apply mutations in order under one lock; stops at the first error
    ///
    /// Mutations before the failing one stay applied.
    pub async fn apply_all(&self, kind: HierarchyKind, mutations: Vec<GraphMutation>) -> Result<Vec<MutationOutcome>> {
        let mut state = self.state.write().await;
        let mut outcomes = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            let result = state.apply(kind, mutation);
            outcomes.push(self.record_mutation(kind, result).await?);
        }
        Ok(outcomes)
    }

    /// Apply one assignment mutation; returns the number of keys touched
    pub async fn apply_assignment(&self, mutation: AssignmentMutation) -> Result<usize> {
        let result = {
            let mut state = self.state.write().await;
            state.apply_assignment(mutation)
        };
        match result {
            Ok(change) => {
                debug!(keys = change.keys.len(), "assignment mutation applied");
                Ok(change.keys.len())
            }
            Err(err) => {
                self.metrics.record_error().await;
                Err(err)
            }
        }
    }

    /// Open a bulk-load window; reads fail until [`resume`](Self::resume)
    pub async fn suspend(&self, target: MaintenanceTarget) {
        self.state.write().await.suspend(target);
        info!(%target, "maintenance suspended");
    }

    /// Close a bulk-load window with a full rebuild; returns entries written
    pub async fn resume(&self, target: MaintenanceTarget) -> usize {
        let written = self.state.write().await.resume(target);
        self.metrics.record_reconcile().await;
        info!(%target, written, "maintenance resumed");
        written
    }

    /// Rebuild a cache from scratch without changing suspension
    pub async fn reconcile(&self, target: MaintenanceTarget) -> Result<usize> {
        let written = self.state.write().await.reconcile(target)?;
        self.metrics.record_reconcile().await;
        info!(%target, written, "reconciled");
        Ok(written)
    }

    pub async fn is_suspended(&self, target: MaintenanceTarget) -> bool {
        self.state.read().await.is_suspended(target)
    }

    /// Can the current principal exercise capability `bit` on `resource`
    ///
    /// A bit index past the configured width is never granted.
    ///
    /// # Errors
    ///
    /// `AuthzError::Suspended` or `AuthzError::StaleCombinedCache` when a
    /// cache the check depends on is not current.
    pub async fn authorize<P: PrincipalResolver>(&self, principal: P, resource: NodeId, bit: usize) -> Result<bool> {
        Ok(self.authorize_with_trace(principal, resource, bit).await?.allowed)
    }

    /// [`authorize`](Self::authorize) with the satisfying chain and timing
    pub async fn authorize_with_trace<P: PrincipalResolver>(
        &self,
        principal: P,
        resource: NodeId,
        bit: usize,
    ) -> Result<AccessDecision> {
        let start = Instant::now();
        let principal = principal.current_principal();

        let witness = {
            let state = self.state.read().await;
            state
                .evaluator()
                .map(|evaluator| principal.and_then(|p| evaluator.witness(p, resource, bit)))
        };
        let witness = match witness {
            Ok(witness) => witness,
            Err(err) => {
                warn!(resource = %resource, bit, error = %err, "authorization rejected");
                self.metrics.record_error().await;
                return Err(err);
            }
        };

        let decision = match (principal, witness) {
            (Some(p), Some(w)) => AccessDecision::allow(p, resource, bit, w),
            _ => AccessDecision::deny(principal, resource, bit),
        };

        self.metrics.record_latency(start.elapsed()).await;
        self.metrics.record_decision(decision.allowed).await;
        debug!(
            principal = ?principal,
            resource = %resource,
            bit,
            allowed = decision.allowed,
            "authorization decided"
        );
        Ok(decision)
    }

    /// Check a row-level operation, resolving the bit from the capability table
    ///
    /// # Errors
    ///
    /// `AuthzError::UnknownCapability` if nothing is configured for
    /// `(table, class, op)`, plus the errors of
    /// [`authorize_with_trace`](Self::authorize_with_trace).
    pub async fn authorize_operation<P: PrincipalResolver>(
        &self,
        principal: P,
        table: &str,
        class: &str,
        op: Operation,
        resource: NodeId,
    ) -> Result<AccessDecision> {
        let bit = match self.capabilities.bit(table, class, op) {
            Ok(bit) => bit,
            Err(err) => {
                self.metrics.record_error().await;
                return Err(err);
            }
        };
        Ok(self
            .authorize_with_trace(principal, resource, bit)
            .await?
            .with_metadata("table", serde_json::json!(table))
            .with_metadata("principal_class", serde_json::json!(class))
            .with_metadata("operation", serde_json::json!(op)))
    }

    /// Cached permission between two nodes of a hierarchy
    pub async fn closure(&self, kind: HierarchyKind, ancestor: NodeId, descendant: NodeId) -> Option<Bitmask> {
        let state = self.state.read().await;
        state.hierarchy(kind).cache().get(ancestor, descendant).cloned()
    }

    /// Every cached closure entry of a hierarchy, sorted
    pub async fn closure_entries(&self, kind: HierarchyKind) -> Vec<ClosureEntry> {
        self.state.read().await.hierarchy(kind).cache().entries()
    }

    /// Every combined cache entry, sorted; `None` without a combined cache
    pub async fn combined_entries(&self) -> Option<Vec<CombinedEntry>> {
        self.state.read().await.combined.as_ref().map(CombinedCache::entries)
    }

    /// Replace all graph state with a snapshot
    ///
    /// The snapshot is loaded into a fresh state with maintenance suspended
    /// and swapped in only after every cache has been reconciled, so a
    /// rejected snapshot leaves the engine unchanged.
    pub async fn load_snapshot(&self, snapshot: GraphSnapshot) -> Result<()> {
        let mut fresh = EngineState::new(&self.config, self.size);
        for target in [
            MaintenanceTarget::Resource,
            MaintenanceTarget::Role,
            MaintenanceTarget::Assignment,
        ] {
            fresh.suspend(target);
        }

        for mutation in snapshot.resources.mutations() {
            fresh.apply(HierarchyKind::Resource, mutation)?;
        }
        for mutation in snapshot.roles.mutations() {
            fresh.apply(HierarchyKind::Role, mutation)?;
        }
        for mutation in snapshot.assignment_mutations() {
            fresh.apply_assignment(mutation)?;
        }

        let mut written = 0;
        for target in [
            MaintenanceTarget::Resource,
            MaintenanceTarget::Role,
            MaintenanceTarget::Assignment,
        ] {
            written += fresh.resume(target);
        }

        *self.state.write().await = fresh;
        self.metrics.record_reconcile().await;
        info!(
            resources = snapshot.resources.nodes.len(),
            roles = snapshot.roles.nodes.len(),
            assignments = snapshot.assignments.len(),
            entries = written,
            "snapshot loaded"
        );
        Ok(())
    }

    /// Capture current graph state
    pub async fn snapshot(&self) -> GraphSnapshot {
        let state = self.state.read().await;
        GraphSnapshot {
            resources: HierarchySnapshot::capture(state.resources.store()),
            roles: HierarchySnapshot::capture(state.roles.store()),
            assignments: state.bridge.iter().collect(),
        }
    }

    /// Compare every live cache with a full recompute
    pub async fn validate(&self) -> ValidationReport {
        self.state.read().await.validate()
    }

    /// [`validate`](Self::validate) as an error
    pub async fn ensure_consistent(&self) -> Result<()> {
        let state = self.state.read().await;
        state.resources.ensure_consistent()?;
        state.roles.ensure_consistent()?;
        if state.validate().combined_consistent == Some(false) {
            return Err(AuthzError::CacheDrift {
                kind: state.combined.as_ref().map_or(HierarchyKind::Role, CombinedCache::side),
                detail: "combined assignment cache differs from rebuild".to_string(),
            });
        }
        Ok(())
    }

    async fn record_mutation(
        &self,
        kind: HierarchyKind,
        result: Result<(MutationOutcome, MaintenanceReport)>,
    ) -> Result<MutationOutcome> {
        match result {
            Ok((outcome, report)) => {
                if outcome.maintained {
                    self.metrics.record_maintenance(&report).await;
                } else {
                    self.metrics.record_skipped(outcome.events).await;
                }
                debug!(
                    hierarchy = %kind,
                    events = outcome.events,
                    written = outcome.entries_written,
                    removed = outcome.entries_removed,
                    cascaded = outcome.assignments_cascaded,
                    "mutation applied"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(hierarchy = %kind, error = %err, "mutation rejected");
                self.metrics.record_error().await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CombineWith;

    fn mask(text: &str) -> Bitmask {
        text.parse().unwrap()
    }

    fn config(combine_with: CombineWith) -> EngineConfig {
        EngineConfig {
            bitmap_size: 4,
            combine_with,
            ..Default::default()
        }
    }

    async fn seeded(engine: &AuthzEngine) {
        for id in [1, 2] {
            engine.apply(HierarchyKind::Resource, GraphMutation::insert_node(id)).await.unwrap();
            engine.apply(HierarchyKind::Role, GraphMutation::insert_node(id)).await.unwrap();
        }
        engine
            .apply(HierarchyKind::Resource, GraphMutation::insert_edge(1, 2, mask("1100")))
            .await
            .unwrap();
        engine
            .apply(HierarchyKind::Role, GraphMutation::insert_edge(1, 2, mask("1010")))
            .await
            .unwrap();
        engine
            .apply_assignment(AssignmentMutation::insert(1, 1, mask("1111")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_engine_creation() {
        let engine = AuthzEngine::new(EngineConfig::default()).unwrap();
        assert_eq!(engine.bitmask_size().get(), 128);
        assert!(!engine.is_suspended(MaintenanceTarget::Resource).await);

        let bad = EngineConfig {
            bitmap_size: 2048,
            ..Default::default()
        };
        assert!(matches!(AuthzEngine::new(bad), Err(AuthzError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_authorize_each_combine_mode() {
        for mode in [CombineWith::None, CombineWith::Resource, CombineWith::Role] {
            let engine = AuthzEngine::new(config(mode)).unwrap();
            seeded(&engine).await;

            // 1100 & 1111 & 1010 = 1000
            assert!(engine.authorize(NodeId(2), NodeId(2), 0).await.unwrap(), "{mode:?}");
            assert!(!engine.authorize(NodeId(2), NodeId(2), 1).await.unwrap(), "{mode:?}");
            assert!(!engine.authorize(None, NodeId(2), 0).await.unwrap(), "{mode:?}");
            assert!(engine.validate().await.is_consistent(), "{mode:?}");
        }
    }

    #[tokio::test]
    async fn test_suspended_reads_rejected() {
        let engine = AuthzEngine::new(config(CombineWith::None)).unwrap();
        seeded(&engine).await;

        engine.suspend(MaintenanceTarget::Role).await;
        assert!(matches!(
            engine.authorize(NodeId(2), NodeId(2), 0).await,
            Err(AuthzError::Suspended(_))
        ));

        engine.resume(MaintenanceTarget::Role).await;
        assert!(engine.authorize(NodeId(2), NodeId(2), 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_reconcile_refresh_marks_stale() {
        let engine = AuthzEngine::new(EngineConfig {
            combined_refresh: CombinedRefresh::Reconcile,
            ..config(CombineWith::Role)
        })
        .unwrap();
        seeded(&engine).await;

        assert!(matches!(
            engine.authorize(NodeId(2), NodeId(2), 0).await,
            Err(AuthzError::StaleCombinedCache)
        ));

        engine.reconcile(MaintenanceTarget::Assignment).await.unwrap();
        assert!(engine.authorize(NodeId(2), NodeId(2), 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_node_delete_cascades_to_assignments() {
        let engine = AuthzEngine::new(config(CombineWith::Resource)).unwrap();
        seeded(&engine).await;

        let outcome = engine
            .apply(HierarchyKind::Role, GraphMutation::delete_node(1))
            .await
            .unwrap();
        assert_eq!(outcome.assignments_cascaded, 1);
        assert!(engine.snapshot().await.assignments.is_empty());
        assert_eq!(engine.combined_entries().await.map(|e| e.len()), Some(0));
        assert!(!engine.authorize(NodeId(2), NodeId(2), 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_mutation_counted() {
        let engine = AuthzEngine::new(config(CombineWith::None)).unwrap();
        assert!(engine
            .apply(HierarchyKind::Resource, GraphMutation::delete_node(5))
            .await
            .is_err());
        assert_eq!(engine.metrics().get_metrics().await.error_count, 1);
    }
}
