use chrono::{DateTime, Utc};

use crate::pki::issuance::IssuerNameId;

/// Half-open expiry interval `[start, end)` covered by one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShardWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ShardWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// True when the two half-open intervals share at least one instant.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

/// One revoked certificate as served by the revocation source.
///
/// The updater never looks inside; records are relayed to the generator as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationRecord {
    pub serial: String,
    pub reason: i32,
    pub revoked_at: DateTime<Utc>,
}

/// Query for the revoked certificates belonging to one shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedCertsRequest {
    pub issuer_name_id: IssuerNameId,
    pub expires_after: DateTime<Utc>,
    pub expires_before: DateTime<Utc>,
    pub revoked_before: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrlMetadata {
    pub issuer_name_id: IssuerNameId,
    pub this_update: DateTime<Utc>,
}

/// Message sent to the generation service: metadata first, then entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateCrlRequest {
    Metadata(CrlMetadata),
    Entry(RevocationRecord),
}

/// A slice of the DER-encoded CRL emitted by the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrlChunk {
    pub chunk: Vec<u8>,
}

/// A shard CRL that parsed and verified against its issuer.
///
/// Lives only until it has been handed to the publisher.
#[derive(Debug, Clone)]
pub struct GeneratedCrl {
    pub shard_id: u64,
    pub window: ShardWindow,
    pub der: Vec<u8>,
    pub entries: usize,
}

impl GeneratedCrl {
    pub fn summary(&self) -> ShardSummary {
        ShardSummary {
            shard_id: self.shard_id,
            window: self.window,
            entries: self.entries,
            size: self.der.len(),
        }
    }
}

/// What is kept of a published shard CRL once its bytes are gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSummary {
    pub shard_id: u64,
    pub window: ShardWindow,
    pub entries: usize,
    /// Length of the DER encoding in bytes.
    pub size: usize,
}

/// Outcome label shared by logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    Success,
    Failed,
}

impl TickResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickResult::Success => "success",
            TickResult::Failed => "failed",
        }
    }

    pub fn from_success(ok: bool) -> Self {
        if ok {
            TickResult::Success
        } else {
            TickResult::Failed
        }
    }
}
