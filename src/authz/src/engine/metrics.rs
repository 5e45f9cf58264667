//! Prometheus metrics for authorization checks and closure maintenance

use crate::closure::MaintenanceReport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Engine counters and latency summary
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    /// Total number of authorization checks
    pub total_checks: u64,

    /// Number of allowed decisions
    pub allowed_decisions: u64,

    /// Number of denied decisions
    pub denied_decisions: u64,

    /// Store events handled by incremental maintenance
    pub maintenance_events: u64,

    /// Store events that landed in a suspended window
    pub events_skipped: u64,

    /// Closure entries written by maintenance
    pub entries_written: u64,

    /// Closure entries dropped by maintenance
    pub entries_removed: u64,

    /// Full reconciles (closure or combined cache)
    pub reconciles: u64,

    /// Check latency percentiles
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub latency_p999_ms: f64,

    /// Average check latency
    pub avg_latency_ms: f64,

    /// Rejected requests
    pub error_count: u64,
}

impl EngineMetrics {
    /// Calculate allow rate
    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed_decisions + self.denied_decisions;
        if total == 0 {
            0.0
        } else {
            self.allowed_decisions as f64 / total as f64
        }
    }
}

/// Metrics collector with Prometheus-compatible export
pub struct MetricsCollector {
    metrics: Arc<RwLock<EngineMetrics>>,

    /// Latency samples for percentile calculation
    latency_samples: Arc<RwLock<Vec<f64>>>,

    max_samples: usize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
            latency_samples: Arc::new(RwLock::new(Vec::with_capacity(10_000))),
            max_samples: 10_000,
        }
    }

    /// Record an authorization decision
    pub async fn record_decision(&self, allowed: bool) {
        let mut metrics = self.metrics.write().await;
        metrics.total_checks += 1;

        if allowed {
            metrics.allowed_decisions += 1;
        } else {
            metrics.denied_decisions += 1;
        }
    }

    /// Record maintenance work for one mutation
    pub async fn record_maintenance(&self, report: &MaintenanceReport) {
        let mut metrics = self.metrics.write().await;
        metrics.maintenance_events += report.events as u64;
        metrics.entries_written += report.entries_written as u64;
        metrics.entries_removed += report.entries_removed as u64;
    }

    /// Record events applied while maintenance was suspended
    pub async fn record_skipped(&self, events: usize) {
        let mut metrics = self.metrics.write().await;
        metrics.events_skipped += events as u64;
    }

    /// Record a full reconcile
    pub async fn record_reconcile(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.reconciles += 1;
    }

    /// Record check latency
    pub async fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut samples = self.latency_samples.write().await;
        samples.push(latency_ms);

        // Keep only recent samples
        if samples.len() > self.max_samples {
            samples.drain(0..1_000);
        }

        let mut metrics = self.metrics.write().await;

        let sum: f64 = samples.iter().sum();
        metrics.avg_latency_ms = sum / samples.len() as f64;

        let mut sorted = samples.clone();
        sorted.sort_by(f64::total_cmp);

        metrics.latency_p50_ms = Self::percentile(&sorted, 0.50);
        metrics.latency_p90_ms = Self::percentile(&sorted, 0.90);
        metrics.latency_p95_ms = Self::percentile(&sorted, 0.95);
        metrics.latency_p99_ms = Self::percentile(&sorted, 0.99);
        metrics.latency_p999_ms = Self::percentile(&sorted, 0.999);
    }

    /// Record a rejected request
    pub async fn record_error(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.error_count += 1;
    }

    /// Get current metrics snapshot
    pub async fn get_metrics(&self) -> EngineMetrics {
        self.metrics.read().await.clone()
    }

    /// Reset all metrics
    pub async fn reset(&self) {
        let mut metrics = self.metrics.write().await;
        *metrics = EngineMetrics::default();

        let mut samples = self.latency_samples.write().await;
        samples.clear();
    }

    /// Export metrics in Prometheus format
    pub async fn export_prometheus(&self) -> String {
        let metrics = self.metrics.read().await;

        format!(
            r#"# HELP hierarch_checks_total Total number of authorization checks
# TYPE hierarch_checks_total counter
hierarch_checks_total {}

# HELP hierarch_allowed_total Number of allowed decisions
# TYPE hierarch_allowed_total counter
hierarch_allowed_total {}

# HELP hierarch_denied_total Number of denied decisions
# TYPE hierarch_denied_total counter
hierarch_denied_total {}

# HELP hierarch_maintenance_events_total Store events handled incrementally
# TYPE hierarch_maintenance_events_total counter
hierarch_maintenance_events_total {}

# HELP hierarch_events_skipped_total Store events applied while suspended
# TYPE hierarch_events_skipped_total counter
hierarch_events_skipped_total {}

# HELP hierarch_closure_entries_written_total Closure entries written by maintenance
# TYPE hierarch_closure_entries_written_total counter
hierarch_closure_entries_written_total {}

# HELP hierarch_closure_entries_removed_total Closure entries dropped by maintenance
# TYPE hierarch_closure_entries_removed_total counter
hierarch_closure_entries_removed_total {}

# HELP hierarch_reconciles_total Full cache reconciles
# TYPE hierarch_reconciles_total counter
hierarch_reconciles_total {}

# HELP hierarch_check_latency_seconds Check latency percentiles
# TYPE hierarch_check_latency_seconds summary
hierarch_check_latency_seconds{{quantile="0.5"}} {}
hierarch_check_latency_seconds{{quantile="0.9"}} {}
hierarch_check_latency_seconds{{quantile="0.95"}} {}
hierarch_check_latency_seconds{{quantile="0.99"}} {}
hierarch_check_latency_seconds{{quantile="0.999"}} {}

# HELP hierarch_errors_total Rejected requests
# TYPE hierarch_errors_total counter
hierarch_errors_total {}
"#,
            metrics.total_checks,
            metrics.allowed_decisions,
            metrics.denied_decisions,
            metrics.maintenance_events,
            metrics.events_skipped,
            metrics.entries_written,
            metrics.entries_removed,
            metrics.reconciles,
            metrics.latency_p50_ms / 1000.0,
            metrics.latency_p90_ms / 1000.0,
            metrics.latency_p95_ms / 1000.0,
            metrics.latency_p99_ms / 1000.0,
            metrics.latency_p999_ms / 1000.0,
            metrics.error_count,
        )
    }

    /// Calculate percentile from sorted data
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        let idx = idx.min(sorted.len() - 1);
        sorted[idx]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hierarch_core::NodeId;

    #[tokio::test]
    async fn test_record_decision() {
        let collector = MetricsCollector::new();

        collector.record_decision(true).await;
        collector.record_decision(false).await;
        collector.record_decision(true).await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_checks, 3);
        assert_eq!(metrics.allowed_decisions, 2);
        assert_eq!(metrics.denied_decisions, 1);
        assert!((metrics.allow_rate() - 0.666).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_record_maintenance() {
        let collector = MetricsCollector::new();
        let mut report = MaintenanceReport {
            events: 2,
            entries_written: 5,
            entries_removed: 3,
            ..Default::default()
        };
        report.touched.insert(NodeId(1));

        collector.record_maintenance(&report).await;
        collector.record_skipped(4).await;
        collector.record_reconcile().await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.maintenance_events, 2);
        assert_eq!(metrics.entries_written, 5);
        assert_eq!(metrics.entries_removed, 3);
        assert_eq!(metrics.events_skipped, 4);
        assert_eq!(metrics.reconciles, 1);
    }

    #[tokio::test]
    async fn test_record_latency() {
        let collector = MetricsCollector::new();

        collector.record_latency(Duration::from_millis(5)).await;
        collector.record_latency(Duration::from_millis(10)).await;
        collector.record_latency(Duration::from_millis(15)).await;

        let metrics = collector.get_metrics().await;
        assert!((metrics.avg_latency_ms - 10.0).abs() < 1.0);
        assert!(metrics.latency_p50_ms > 0.0);
        assert!(metrics.latency_p99_ms > 0.0);
    }

    #[tokio::test]
    async fn test_prometheus_export() {
        let collector = MetricsCollector::new();

        collector.record_decision(true).await;
        collector.record_reconcile().await;

        let prometheus = collector.export_prometheus().await;
        assert!(prometheus.contains("hierarch_checks_total 1"));
        assert!(prometheus.contains("hierarch_allowed_total 1"));
        assert!(prometheus.contains("hierarch_reconciles_total 1"));
    }

    #[tokio::test]
    async fn test_reset() {
        let collector = MetricsCollector::new();

        collector.record_decision(true).await;
        collector.record_error().await;

        collector.reset().await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_checks, 0);
        assert_eq!(metrics.error_count, 0);
    }
}
