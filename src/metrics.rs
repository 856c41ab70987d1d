//! Prometheus metrics for the CRL updater.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `crl_updater_ticks` | Histogram (seconds) | `issuer`, `result` |
//! | `crl_updater_generated` | Counter | `result` |
//!
//! Tick latencies are observed once per issuer (labelled with the issuer's
//! display name, verbatim) and once per full tick (labelled `all`).

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use thiserror::Error;

use crate::pki::crl::TickResult;

/// Issuer label used for the whole-tick observation.
pub const ALL_ISSUERS: &str = "all";

pub const TICK_BUCKETS: &[f64] = &[
    0.01, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0,
];

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

pub type MetricsResult<T> = Result<T, MetricsError>;

/// Updater metrics. Cheap to clone; clones share the underlying series.
#[derive(Clone)]
pub struct UpdaterMetrics {
    ticks: HistogramVec,
    generated: CounterVec,
}

impl UpdaterMetrics {
    /// Creates the metrics and registers them with `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric with the same name is already registered.
    pub fn new(registry: &Registry) -> MetricsResult<Self> {
        let ticks = HistogramVec::new(
            HistogramOpts::new(
                "crl_updater_ticks",
                "A histogram of crl-updater tick latencies labeled by issuer and result",
            )
            .buckets(TICK_BUCKETS.to_vec()),
            &["issuer", "result"],
        )?;
        registry.register(Box::new(ticks.clone()))?;

        let generated = CounterVec::new(
            Opts::new(
                "crl_updater_generated",
                "A counter of CRL generation calls labeled by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(generated.clone()))?;

        Ok(Self { ticks, generated })
    }

    /// Records how long a tick took for `issuer` (or [`ALL_ISSUERS`]).
    pub fn observe_tick(&self, issuer: &str, result: TickResult, elapsed_secs: f64) {
        self.ticks
            .with_label_values(&[issuer, result.as_str()])
            .observe(elapsed_secs);
    }

    /// Number of tick observations, for tests.
    #[must_use]
    pub fn tick_count(&self, issuer: &str, result: TickResult) -> u64 {
        self.ticks
            .with_label_values(&[issuer, result.as_str()])
            .get_sample_count()
    }

    /// Records one shard generation attempt.
    pub fn generated(&self, result: TickResult) {
        self.generated.with_label_values(&[result.as_str()]).inc();
    }

    #[must_use]
    pub fn generated_count(&self, result: TickResult) -> u64 {
        self.generated.with_label_values(&[result.as_str()]).get() as u64
    }
}

/// Owns the Prometheus registry the updater metrics are registered in.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    updater_metrics: UpdaterMetrics,
}

impl MetricsRegistry {
    pub fn new() -> MetricsResult<Self> {
        let registry = Registry::new();
        let updater_metrics = UpdaterMetrics::new(&registry)?;
        Ok(Self {
            registry,
            updater_metrics,
        })
    }

    #[must_use]
    pub fn updater_metrics(&self) -> &UpdaterMetrics {
        &self.updater_metrics
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn encode_text(&self) -> MetricsResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }
}
