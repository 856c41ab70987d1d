//! Streaming pipeline for one shard: relay revoked entries into the generator
//! and collect the CRL bytes it emits.

use futures::{Stream, StreamExt, TryStreamExt, future, stream};
use tracing::debug;

use super::errors::{ShardError, Stage, TransportError};
use super::ports::{CrlGenerator, RevocationSource, RevocationStream};
use super::types::{CrlChunk, CrlMetadata, GenerateCrlRequest, RevokedCertsRequest};
use crate::shutdown::Shutdown;

/// Input relay: the metadata message followed by one entry message per
/// revoked certificate, in source order. Lazy; nothing is read ahead.
pub fn relay_requests(
    metadata: CrlMetadata,
    entries: RevocationStream,
) -> impl Stream<Item = Result<GenerateCrlRequest, TransportError>> + Send {
    stream::once(future::ready(Ok(GenerateCrlRequest::Metadata(metadata))))
        .chain(entries.map_ok(GenerateCrlRequest::Entry))
}

/// Output collector: concatenate chunks in arrival order.
pub async fn collect_chunks<S>(chunks: S) -> Result<Vec<u8>, TransportError>
where
    S: Stream<Item = Result<CrlChunk, TransportError>>,
{
    chunks
        .try_fold(Vec::new(), |mut der, chunk| async move {
            der.extend_from_slice(&chunk.chunk);
            Ok(der)
        })
        .await
}

/// Raw output of one shard's generation stream.
#[derive(Debug)]
pub struct ShardBytes {
    pub der: Vec<u8>,
    /// Entries relayed to the generator.
    pub relayed: usize,
}

/// Drive both streams for one shard: open the revocation stream, open the
/// generation stream, send metadata and every entry, then drain the output.
///
/// Every await races `shutdown`, so cancellation surfaces as a
/// [`TransportError::Cancelled`] at whichever stage was in flight.
pub async fn generate_shard(
    source: &dyn RevocationSource,
    generator: &dyn CrlGenerator,
    shutdown: &mut Shutdown,
    shard_id: u64,
    request: RevokedCertsRequest,
    metadata: CrlMetadata,
) -> Result<ShardBytes, ShardError> {
    let fail = move |stage: Stage| move |source: TransportError| ShardError::transport(shard_id, stage, source);

    let entries = shutdown
        .guard(source.get_revoked_certs(request))
        .await
        .map_err(fail(Stage::OpenSource))?;

    let mut session = shutdown
        .guard(generator.generate_crl())
        .await
        .map_err(fail(Stage::OpenGenerator))?;

    let mut requests = Box::pin(relay_requests(metadata, entries));
    let mut relayed = 0usize;
    loop {
        let next = shutdown
            .guard(async { Ok(requests.next().await) })
            .await
            .map_err(fail(Stage::ReadEntry))?;
        let request = match next {
            Some(request) => request.map_err(fail(Stage::ReadEntry))?,
            None => break,
        };

        let stage = match request {
            GenerateCrlRequest::Metadata(_) => Stage::SendMetadata,
            GenerateCrlRequest::Entry(_) => {
                relayed += 1;
                Stage::SendEntry
            }
        };
        shutdown
            .guard(session.send(request))
            .await
            .map_err(fail(stage))?;
    }
    debug!("Relayed {} entries for shard {}", relayed, shard_id);

    let der = shutdown
        .guard(collect_chunks(session.finish()))
        .await
        .map_err(fail(Stage::ReadOutput))?;

    Ok(ShardBytes { der, relayed })
}
