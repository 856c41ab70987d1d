use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use super::errors::ConfigError;
use super::ports::{CrlGenerator, CrlPublisher, RevocationSource};
use super::processor::{CrlProcessor, IssuerReport};
use super::types::TickResult;
use super::window::ShardWindows;
use crate::clock::{Clock, seconds_between};
use crate::metrics::{ALL_ISSUERS, UpdaterMetrics};
use crate::pki::issuance::IssuerDirectory;
use crate::shutdown::Shutdown;

/// CRLs must be regenerated at least this often.
pub const MAX_UPDATE_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Shard layout and cadence for the updater
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdaterConfig {
    pub num_shards: u64,
    pub lookback: Duration,
    pub lookforward: Duration,
    pub update_period: Duration,
}

impl UpdaterConfig {
    /// Check every constraint and build the shard calculator.
    pub fn validate(&self) -> Result<ShardWindows, ConfigError> {
        if self.num_shards < 1 {
            return Err(ConfigError::NoShards(self.num_shards));
        }
        if self.update_period >= MAX_UPDATE_PERIOD {
            return Err(ConfigError::UpdatePeriodTooLong(self.update_period));
        }
        if self.update_period.is_zero() {
            return Err(ConfigError::ZeroUpdatePeriod);
        }
        ShardWindows::new(self.num_shards, self.lookback, self.lookforward)
    }
}

/// Result of one pass over every issuer.
#[derive(Debug)]
pub struct TickReport {
    pub started: DateTime<Utc>,
    pub issuers: Vec<IssuerReport>,
}

impl TickReport {
    pub fn is_success(&self) -> bool {
        self.issuers.iter().all(IssuerReport::is_success)
    }

    pub fn result(&self) -> TickResult {
        TickResult::from_success(self.is_success())
    }
}

/// Periodically regenerates every shard CRL of every issuer.
///
/// Issuers and shards are processed one at a time. A tick that outlasts the
/// update period delays the next one; ticks never overlap.
pub struct CrlUpdater {
    config: UpdaterConfig,
    issuers: IssuerDirectory,
    processor: CrlProcessor,
    metrics: UpdaterMetrics,
    clock: Arc<dyn Clock>,
}

impl CrlUpdater {
    pub fn new(
        config: UpdaterConfig,
        issuers: IssuerDirectory,
        source: Arc<dyn RevocationSource>,
        generator: Arc<dyn CrlGenerator>,
        metrics: UpdaterMetrics,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let windows = config.validate()?;
        let processor = CrlProcessor::new(
            source,
            generator,
            windows,
            metrics.clone(),
            Arc::clone(&clock),
        );

        Ok(Self {
            config,
            issuers,
            processor,
            metrics,
            clock,
        })
    }

    /// Send verified CRLs to `publisher` instead of only logging them.
    pub fn with_publisher(mut self, publisher: Arc<dyn CrlPublisher>) -> Self {
        self.processor = self.processor.with_publisher(publisher);
        self
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn issuers(&self) -> &IssuerDirectory {
        &self.issuers
    }

    /// Process every issuer once.
    ///
    /// Failures are logged and recorded in metrics; the report is returned
    /// for callers that want the details.
    pub async fn tick(&self, shutdown: &mut Shutdown) -> TickReport {
        let started = self.clock.now();
        let mut issuers = Vec::with_capacity(self.issuers.len());

        for issuer in self.issuers.iter() {
            let at = self.clock.now();
            let report = self.processor.process_issuer(issuer, at, shutdown).await;
            if !report.is_success() {
                error!(
                    "tick for issuer {} at time {} failed: {}",
                    issuer.name(),
                    at.to_rfc3339_opts(SecondsFormat::Nanos, true),
                    report.failure_text()
                );
            }
            issuers.push(report);
        }

        let report = TickReport { started, issuers };
        self.metrics.observe_tick(
            ALL_ISSUERS,
            report.result(),
            seconds_between(started, self.clock.now()),
        );
        debug!("CRL tick finished: {}", report.result().as_str());
        report
    }

    /// Tick every update period until `shutdown` fires.
    ///
    /// The first tick happens one full period after the call.
    pub async fn run(&self, mut shutdown: Shutdown) {
        info!(
            "Starting CRL updater for {} issuers, {} shards each, every {:?}",
            self.issuers.len(),
            self.config.num_shards,
            self.config.update_period
        );

        let mut ticker = interval(self.config.update_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // First tick completes immediately

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick(&mut shutdown).await;
                }
            }
        }

        info!("CRL updater stopped");
    }

    /// Spawn [`CrlUpdater::run`] on the runtime.
    pub fn start(self, shutdown: Shutdown) -> JoinHandle<()> {
        let updater = Arc::new(self);
        tokio::spawn(async move { updater.run(shutdown).await })
    }
}
