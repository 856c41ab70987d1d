//! Interfaces to the streaming services the updater drives and to the sink
//! verified CRLs are handed to.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::errors::TransportError;
use super::types::{
    CrlChunk, GenerateCrlRequest, GeneratedCrl, RevocationRecord, RevokedCertsRequest,
};
use crate::pki::issuance::Issuer;

/// Revoked certificates for one shard, in the order the source yields them.
/// The stream ending is the end-of-stream marker.
pub type RevocationStream = Pin<Box<dyn Stream<Item = Result<RevocationRecord, TransportError>> + Send>>;

/// CRL bytes emitted by the generator, to be concatenated in order.
pub type CrlChunkStream = Pin<Box<dyn Stream<Item = Result<CrlChunk, TransportError>> + Send>>;

/// Server-streaming read of revoked certificates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RevocationSource: Send + Sync {
    async fn get_revoked_certs(
        &self,
        request: RevokedCertsRequest,
    ) -> Result<RevocationStream, TransportError>;
}

/// Bidirectional CRL generation stream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrlGenerator: Send + Sync {
    async fn generate_crl(&self) -> Result<Box<dyn GenerationSession>, TransportError>;
}

/// One open generation stream.
#[async_trait]
pub trait GenerationSession: Send {
    async fn send(&mut self, request: GenerateCrlRequest) -> Result<(), TransportError>;

    /// Close the request side and hand back the output stream.
    fn finish(self: Box<Self>) -> CrlChunkStream;
}

/// Destination for verified shard CRLs.
///
/// Called once per verified shard, in shard order, before the next shard
/// starts. The CRL bytes are dropped after the call returns.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrlPublisher: Send + Sync {
    async fn publish(&self, issuer: &Issuer, crl: GeneratedCrl) -> Result<(), TransportError>;
}
