use crate::api::v1alpha1::{greptimedbcluster::GreptimeDBCluster, Phase};
use crate::util::errors::Error;
use kube::ResourceExt;
use prometheus::{histogram_opts, opts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Registry};
use tokio::time::Instant;
use tracing::debug;

#[derive(Clone)]
pub struct Metrics {
    pub reconciliations: IntCounter,
    pub failures: IntCounterVec,
    pub reconcile_duration: HistogramVec,
    pub cluster_phase: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let reconcile_duration = HistogramVec::new(
            histogram_opts!(
                "greptimedb_operator_reconcile_duration_seconds",
                "The duration of reconcile to complete in seconds",
            )
            .buckets(vec![0.01, 0.1, 0.25, 0.5, 1., 5., 15., 60.]),
            &["instance"],
        )?;
        let failures = IntCounterVec::new(
            opts!(
                "greptimedb_operator_reconciliation_errors_total",
                "reconciliation errors",
            ),
            &["instance", "error"],
        )?;
        let reconciliations = IntCounter::new(
            "greptimedb_operator_reconciliations_total",
            "reconciliations",
        )?;
        let cluster_phase = IntGaugeVec::new(
            opts!(
                "greptimedb_operator_cluster_phase",
                "1 for the phase a cluster is currently in",
            ),
            &["namespace", "cluster", "phase"],
        )?;
        Ok(Metrics {
            reconciliations,
            failures,
            reconcile_duration,
            cluster_phase,
        })
    }

    /// Register API metrics to start tracking them.
    pub fn register(self, registry: &Registry) -> Result<Self, prometheus::Error> {
        registry.register(Box::new(self.reconcile_duration.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.reconciliations.clone()))?;
        registry.register(Box::new(self.cluster_phase.clone()))?;
        Ok(self)
    }

    pub fn reconcile_failure(&self, cluster: &GreptimeDBCluster, e: &Error) {
        debug!(
            cluster = %cluster.name_any(),
            error = %e.metric_label(),
            "reconcile failure recorded"
        );
        self.failures
            .with_label_values(&[cluster.name_any().as_ref(), e.metric_label().as_ref()])
            .inc()
    }

    pub fn set_phase(&self, cluster: &GreptimeDBCluster, phase: Phase) {
        let namespace = cluster.namespace().unwrap_or_default();
        let name = cluster.name_any();
        for candidate in [
            Phase::Starting,
            Phase::Running,
            Phase::Updating,
            Phase::Error,
            Phase::Terminating,
        ] {
            let value = i64::from(candidate == phase);
            self.cluster_phase
                .with_label_values(&[namespace.as_str(), name.as_str(), candidate.to_string().as_str()])
                .set(value);
        }
    }

    pub fn count_and_measure(&self, controller: &str) -> ReconcileMeasurer {
        self.reconciliations.inc();
        ReconcileMeasurer {
            start: Instant::now(),
            metric: self.reconcile_duration.clone(),
            instance: controller.to_string(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct ReconcileMeasurer {
    start: Instant,
    metric: HistogramVec,
    instance: String,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric
            .with_label_values(&[self.instance.as_str()])
            .observe(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v1alpha1::greptimedbcluster::GreptimeDBClusterSpec;
    use crate::tests::fixtures::cluster;

    #[test]
    fn test_phase_gauge_is_one_hot() {
        let metrics = Metrics::new().unwrap();
        let cluster = cluster(GreptimeDBClusterSpec::default());
        metrics.set_phase(&cluster, Phase::Starting);
        metrics.set_phase(&cluster, Phase::Running);

        let running = metrics
            .cluster_phase
            .with_label_values(&["default", "basic", "Running"])
            .get();
        let starting = metrics
            .cluster_phase
            .with_label_values(&["default", "basic", "Starting"])
            .get();
        assert_eq!((running, starting), (1, 0));
    }
}
