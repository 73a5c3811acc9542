//! Metrics collection and export module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub transactions_submitted: IntCounter,
    pub submission_failures: IntCounter,
    pub steps_completed: IntCounter,
    pub steps_skipped: IntCounter,
    pub balancer_cells_collected: IntCounter,

    // Histograms
    pub build_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let transactions_submitted = IntCounter::with_opts(Opts::new(
            "transactions_submitted_total",
            "Transactions accepted by the node",
        ))?;

        let submission_failures = IntCounter::with_opts(Opts::new(
            "submission_failures_total",
            "Transactions the signer or node refused",
        ))?;

        let steps_completed = IntCounter::with_opts(Opts::new(
            "steps_completed_total",
            "Workflow steps that wrote a step record",
        ))?;

        let steps_skipped = IntCounter::with_opts(Opts::new(
            "steps_skipped_total",
            "Workflow steps skipped because a step record existed",
        ))?;

        let balancer_cells_collected = IntCounter::with_opts(Opts::new(
            "balancer_cells_collected_total",
            "Value cells pulled in by the capacity balancer",
        ))?;

        let build_latency = Histogram::with_opts(
            HistogramOpts::new("build_latency_seconds", "Transaction build latency")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;

        registry.register(Box::new(transactions_submitted.clone()))?;
        registry.register(Box::new(submission_failures.clone()))?;
        registry.register(Box::new(steps_completed.clone()))?;
        registry.register(Box::new(steps_skipped.clone()))?;
        registry.register(Box::new(balancer_cells_collected.clone()))?;
        registry.register(Box::new(build_latency.clone()))?;

        Ok(Self {
            registry,
            transactions_submitted,
            submission_failures,
            steps_completed,
            steps_skipped,
            balancer_cells_collected,
            build_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
