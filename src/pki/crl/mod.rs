//! Sharded Certificate Revocation List (CRL) generation
//!
//! # Features
//! - Stable expiry-window sharding of each issuer's revoked certificates
//! - Streaming revoked entries from the revocation source into the generator
//! - DER parsing and signature verification of every generated shard
//! - Handing each verified shard to a publisher before the next one starts
//! - Scheduled periodic regeneration with per-shard failure isolation

mod errors;
mod ports;
mod processor;
pub mod scheduler;
mod stream;
mod types;
mod validation;
mod window;

// Re-export public types
pub use errors::{
    ConfigError, CrlError, CrlResult, IssuerError, ShardError, Stage, TransportError,
};
pub use ports::{
    CrlChunkStream, CrlGenerator, CrlPublisher, GenerationSession, RevocationSource,
    RevocationStream,
};
pub use processor::{CrlProcessor, IssuerReport, LogPublisher, ShardOutcome, ShardTask};
pub use scheduler::{CrlUpdater, MAX_UPDATE_PERIOD, TickReport, UpdaterConfig};
pub use stream::{ShardBytes, collect_chunks, generate_shard, relay_requests};
pub use types::{
    CrlChunk, CrlMetadata, GenerateCrlRequest, GeneratedCrl, RevocationRecord,
    RevokedCertsRequest, ShardSummary, ShardWindow, TickResult,
};
pub use validation::ParsedCrl;
pub use window::{ShardWindows, shard_epoch};
