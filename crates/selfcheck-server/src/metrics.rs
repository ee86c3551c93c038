//! Prometheus metrics for self-check runs.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use selfcheck::RunReport;
use std::time::Duration;

/// Labels for run metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RunLabels {
    /// Derived HTTP status of the run (200, 404, 500)
    pub status: String,
}

/// Labels for per-check outcome metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    /// Outcome reason (none, error, timeout, statusCode, body)
    pub reason: String,
}

/// Labels for alert delivery metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AlertLabels {
    /// Delivery result (delivered, logged, failed, dropped)
    pub result: String,
}

/// Metrics registry with all self-check metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    /// Runs by derived status
    runs_total: Family<RunLabels, Counter>,
    /// Outcomes by reason
    outcomes_total: Family<OutcomeLabels, Counter>,
    /// Per-check probe duration by reason
    probe_duration_seconds: Family<OutcomeLabels, Histogram>,
    /// Whole-run duration
    run_duration_seconds: Histogram,
    /// Failed checks in the most recent run
    checks_failing: Gauge,
    /// Failure notices by delivery result
    alerts_total: Family<AlertLabels, Counter>,
    /// Notices per delivered batch
    alert_batch_size: Histogram,
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let runs_total = Family::<RunLabels, Counter>::default();
        registry.register(
            "selfcheck_runs",
            "Total self-check runs by derived status",
            runs_total.clone(),
        );

        let outcomes_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "selfcheck_outcomes",
            "Total check outcomes by reason",
            outcomes_total.clone(),
        );

        let probe_duration_seconds = Family::<OutcomeLabels, Histogram>::new_with_constructor(|| {
            // 1ms to ~16s
            Histogram::new(exponential_buckets(0.001, 2.0, 15))
        });
        registry.register(
            "selfcheck_probe_duration_seconds",
            "Probe duration in seconds, redirects included",
            probe_duration_seconds.clone(),
        );

        let run_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 15));
        registry.register(
            "selfcheck_run_duration_seconds",
            "Duration of a whole self-check run in seconds",
            run_duration_seconds.clone(),
        );

        let checks_failing = Gauge::default();
        registry.register(
            "selfcheck_checks_failing",
            "Failed checks in the most recent run",
            checks_failing.clone(),
        );

        let alerts_total = Family::<AlertLabels, Counter>::default();
        registry.register(
            "selfcheck_alerts",
            "Failure notices by delivery result",
            alerts_total.clone(),
        );

        let alert_batch_size = Histogram::new([1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0].into_iter());
        registry.register(
            "selfcheck_alert_batch_size",
            "Failure notices per delivered batch",
            alert_batch_size.clone(),
        );

        Self {
            registry,
            runs_total,
            outcomes_total,
            probe_duration_seconds,
            run_duration_seconds,
            checks_failing,
            alerts_total,
            alert_batch_size,
        }
    }

    /// Record a finished run and each of its outcomes
    pub fn record_run(&self, report: &RunReport, duration: Duration) {
        self.runs_total
            .get_or_create(&RunLabels {
                status: report.status_code.to_string(),
            })
            .inc();
        self.run_duration_seconds.observe(duration.as_secs_f64());
        self.checks_failing.set(report.failed.len() as i64);

        for outcome in report.passed.iter().chain(&report.failed) {
            let labels = OutcomeLabels {
                reason: outcome.reason.to_string(),
            };
            self.outcomes_total.get_or_create(&labels).inc();
            self.probe_duration_seconds
                .get_or_create(&labels)
                .observe(outcome.elapsed.as_secs_f64());
        }
    }

    /// Record failure notices by delivery result
    pub fn record_alerts(&self, result: &str, count: usize) {
        self.alerts_total
            .get_or_create(&AlertLabels {
                result: result.to_string(),
            })
            .inc_by(count as u64);
    }

    /// Record a delivered batch
    pub fn record_alert_batch(&self, size: usize) {
        self.alert_batch_size.observe(size as f64);
    }

    /// Encode in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
