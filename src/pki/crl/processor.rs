use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::errors::{IssuerError, ShardError, Stage, TransportError, join_failures};
use super::ports::{CrlGenerator, CrlPublisher, RevocationSource};
use super::stream::generate_shard;
use super::types::{
    CrlMetadata, GeneratedCrl, RevokedCertsRequest, ShardSummary, ShardWindow, TickResult,
};
use super::validation::ParsedCrl;
use super::window::ShardWindows;
use crate::clock::{Clock, seconds_between};
use crate::metrics::UpdaterMetrics;
use crate::pki::issuance::Issuer;
use crate::shutdown::Shutdown;

/// One unit of work: a single shard of a single issuer at a reference time.
#[derive(Debug, Clone)]
pub struct ShardTask {
    pub issuer: Issuer,
    pub shard_id: u64,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ShardOutcome {
    pub shard_id: u64,
    pub window: ShardWindow,
    pub result: Result<ShardSummary, ShardError>,
}

/// Every shard outcome for one issuer at one reference time.
#[derive(Debug)]
pub struct IssuerReport {
    pub issuer_name: String,
    pub at: DateTime<Utc>,
    pub shards: Vec<ShardOutcome>,
}

impl IssuerReport {
    pub fn is_success(&self) -> bool {
        self.shards.iter().all(|s| s.result.is_ok())
    }

    pub fn result(&self) -> TickResult {
        TickResult::from_success(self.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ShardError> {
        self.shards.iter().filter_map(|s| s.result.as_ref().err())
    }

    /// Every shard error, joined for the audit log.
    pub fn failure_text(&self) -> String {
        join_failures(self.failures())
    }

    /// Every published shard, or every shard error if any shard failed.
    pub fn into_result(self) -> Result<Vec<ShardSummary>, IssuerError> {
        let mut published = Vec::with_capacity(self.shards.len());
        let mut failures = Vec::new();
        for shard in self.shards {
            match shard.result {
                Ok(summary) => published.push(summary),
                Err(e) => failures.push(e),
            }
        }
        if failures.is_empty() {
            Ok(published)
        } else {
            Err(IssuerError { failures })
        }
    }
}

/// Publisher used until a real one is configured: logs and drops the CRL.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl CrlPublisher for LogPublisher {
    async fn publish(&self, issuer: &Issuer, crl: GeneratedCrl) -> Result<(), TransportError> {
        debug!(
            "got complete CRL for issuer {}, shard {} with {} entries",
            issuer.name(),
            crl.shard_id,
            crl.entries
        );
        Ok(())
    }
}

/// Generates, verifies and publishes every shard CRL for an issuer.
///
/// Shards run one after another so at most one revocation stream, one
/// generation stream and one CRL's bytes are live at a time. A failed shard
/// is logged and counted; the remaining shards still run.
#[derive(Clone)]
pub struct CrlProcessor {
    source: Arc<dyn RevocationSource>,
    generator: Arc<dyn CrlGenerator>,
    publisher: Arc<dyn CrlPublisher>,
    windows: ShardWindows,
    metrics: UpdaterMetrics,
    clock: Arc<dyn Clock>,
}

impl CrlProcessor {
    pub fn new(
        source: Arc<dyn RevocationSource>,
        generator: Arc<dyn CrlGenerator>,
        windows: ShardWindows,
        metrics: UpdaterMetrics,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            generator,
            publisher: Arc::new(LogPublisher),
            windows,
            metrics,
            clock,
        }
    }

    /// Replace the default [`LogPublisher`].
    pub fn with_publisher(mut self, publisher: Arc<dyn CrlPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn windows(&self) -> &ShardWindows {
        &self.windows
    }

    /// Work units for every shard of `issuer`, in shard order.
    pub fn plan(&self, issuer: &Issuer, at: DateTime<Utc>) -> Vec<ShardTask> {
        (0..self.windows.num_shards())
            .map(|shard_id| ShardTask {
                issuer: issuer.clone(),
                shard_id,
                at,
            })
            .collect()
    }

    /// Run every shard of `issuer` and record the issuer's tick latency.
    pub async fn process_issuer(
        &self,
        issuer: &Issuer,
        at: DateTime<Utc>,
        shutdown: &mut Shutdown,
    ) -> IssuerReport {
        let start = self.clock.now();

        let mut shards = Vec::with_capacity(self.windows.num_shards() as usize);
        for task in self.plan(issuer, at) {
            shards.push(self.run_shard(&task, shutdown).await);
        }

        let report = IssuerReport {
            issuer_name: issuer.name().to_string(),
            at,
            shards,
        };
        self.metrics.observe_tick(
            issuer.name(),
            report.result(),
            seconds_between(start, self.clock.now()),
        );
        report
    }

    /// Generate, verify and publish one shard.
    pub async fn run_shard(&self, task: &ShardTask, shutdown: &mut Shutdown) -> ShardOutcome {
        let window = self.windows.window_for(task.at, task.shard_id);
        let result = self.generate(task, window, shutdown).await;

        match &result {
            Ok(_) => self.metrics.generated(TickResult::Success),
            Err(e) => {
                self.metrics.generated(TickResult::Failed);
                warn!(
                    issuer = task.issuer.name(),
                    shard_id = task.shard_id,
                    stage = %e.stage(),
                    "shard generation failed: {}",
                    e
                );
            }
        }

        ShardOutcome {
            shard_id: task.shard_id,
            window,
            result,
        }
    }

    async fn generate(
        &self,
        task: &ShardTask,
        window: ShardWindow,
        shutdown: &mut Shutdown,
    ) -> Result<ShardSummary, ShardError> {
        let shard_id = task.shard_id;
        let issuer_name_id = task.issuer.name_id();

        let request = RevokedCertsRequest {
            issuer_name_id,
            expires_after: window.start,
            expires_before: window.end,
            revoked_before: task.at,
        };
        let metadata = CrlMetadata {
            issuer_name_id,
            this_update: task.at,
        };

        let bytes = generate_shard(
            self.source.as_ref(),
            self.generator.as_ref(),
            shutdown,
            shard_id,
            request,
            metadata,
        )
        .await?;

        let crl = ParsedCrl::from_der(bytes.der)
            .map_err(|source| ShardError::Decoding { shard_id, source })?;
        let entries = crl
            .verify(&task.issuer)
            .map_err(|source| ShardError::Signature { shard_id, source })?;

        let crl = GeneratedCrl {
            shard_id,
            window,
            der: crl.into_der(),
            entries,
        };
        let summary = crl.summary();
        shutdown
            .guard(self.publisher.publish(&task.issuer, crl))
            .await
            .map_err(|source| ShardError::transport(shard_id, Stage::Publish, source))?;

        Ok(summary)
    }
}
