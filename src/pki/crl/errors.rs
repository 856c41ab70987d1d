use std::fmt;
use std::time::Duration;

use thiserror::Error;
use x509_parser::prelude::X509Error;

/// Invalid updater configuration, reported once at construction.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("must have positive number of shards, got: {0}")]
    NoShards(u64),

    #[error("total window (lookback+lookforward) must be non-zero")]
    EmptyWindow,

    #[error("total window (lookback+lookforward={0:?}) does not fit in 64-bit nanoseconds")]
    WindowTooLarge(Duration),

    #[error(
        "total window (lookback+lookforward={window_nanos}ns) must be evenly divisible by numShards ({num_shards})"
    )]
    WindowNotDivisible { window_nanos: u128, num_shards: u64 },

    #[error("must update CRLs at least every 7 days, got: {0:?}")]
    UpdatePeriodTooLong(Duration),

    #[error("update period must be non-zero")]
    ZeroUpdatePeriod,

    #[error("settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("failed to load issuer certificate: {0}")]
    Issuer(#[from] CrlError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure talking to either external streaming service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Status(String),
}

impl TransportError {
    pub fn status(msg: impl Into<String>) -> Self {
        Self::Status(msg.into())
    }
}

/// CRL decoding and verification errors
#[derive(Error, Debug)]
pub enum CrlError {
    #[error("CRL parsing failed: {0}")]
    Parse(#[from] X509Error),

    #[error("{0} trailing bytes after CRL")]
    TrailingData(usize),

    #[error("certificate parsing failed: {0}")]
    Certificate(String),

    #[error("CRL issuer does not match issuer certificate subject")]
    IssuerMismatch,

    #[error("Issuer not authorized for CRL signing")]
    UnauthorizedIssuer,

    #[error("CRL signature verification failed")]
    SignatureVerification,
}

/// Convenient Result type alias
pub type CrlResult<T> = Result<T, CrlError>;

/// The point in the shard pipeline where a transport failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    OpenSource,
    OpenGenerator,
    SendMetadata,
    ReadEntry,
    SendEntry,
    ReadOutput,
    Decode,
    Verify,
    Publish,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::OpenSource => "open_source",
            Stage::OpenGenerator => "open_generator",
            Stage::SendMetadata => "send_metadata",
            Stage::ReadEntry => "read_entry",
            Stage::SendEntry => "send_entry",
            Stage::ReadOutput => "read_output",
            Stage::Decode => "decode",
            Stage::Verify => "verify",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single shard did not produce a verified CRL.
#[derive(Error, Debug)]
pub enum ShardError {
    #[error("{stage} failed for shard {shard_id}: {source}")]
    Transport {
        shard_id: u64,
        stage: Stage,
        source: TransportError,
    },

    #[error("failed to parse CRL bytes for shard {shard_id}: {source}")]
    Decoding { shard_id: u64, source: CrlError },

    #[error("failed to validate signature for shard {shard_id}: {source}")]
    Signature { shard_id: u64, source: CrlError },
}

impl ShardError {
    pub fn transport(shard_id: u64, stage: Stage, source: TransportError) -> Self {
        Self::Transport {
            shard_id,
            stage,
            source,
        }
    }

    pub fn shard_id(&self) -> u64 {
        match self {
            ShardError::Transport { shard_id, .. }
            | ShardError::Decoding { shard_id, .. }
            | ShardError::Signature { shard_id, .. } => *shard_id,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            ShardError::Transport { stage, .. } => *stage,
            ShardError::Decoding { .. } => Stage::Decode,
            ShardError::Signature { .. } => Stage::Verify,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ShardError::Transport {
                source: TransportError::Cancelled,
                ..
            }
        )
    }
}

/// Every shard failure from one issuer tick.
#[derive(Error, Debug)]
#[error("{}", join_failures(.failures))]
pub struct IssuerError {
    pub failures: Vec<ShardError>,
}

pub(crate) fn join_failures<'a>(failures: impl IntoIterator<Item = &'a ShardError>) -> String {
    failures
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
