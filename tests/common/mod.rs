#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use crl_updater::clock::FakeClock;
use crl_updater::metrics::MetricsRegistry;
use crl_updater::pki::crl::{
    CrlChunk, CrlChunkStream, CrlGenerator, CrlMetadata, CrlPublisher, CrlUpdater,
    GenerateCrlRequest, GeneratedCrl, GenerationSession, RevocationRecord, RevocationSource,
    RevocationStream, RevokedCertsRequest, ShardWindow, ShardWindows, TransportError,
    UpdaterConfig,
};
use crl_updater::pki::{Issuer, IssuerDirectory, IssuerNameId};
use crl_updater::telemetry;
use futures::stream;
use rcgen::{
    BasicConstraints, CertificateParams, CertificateRevocationListParams, DistinguishedName,
    DnType, IsCa, KeyIdMethod, KeyPair, KeyUsagePurpose, RevokedCertParams, SerialNumber,
};
use time::OffsetDateTime;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt as _};

/// A CA certificate plus the key that can sign CRLs for it.
pub struct TestCa {
    pub signer: Arc<rcgen::Issuer<'static, KeyPair>>,
    pub issuer: Issuer,
}

pub fn gen_ca(cn: &str) -> TestCa {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    dn.push(DnType::OrganizationName, "Test Organization");
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

    let key_pair = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key_pair).unwrap();
    let issuer = Issuer::from_der(cert.der().to_vec()).unwrap();
    TestCa {
        signer: Arc::new(rcgen::Issuer::new(params, key_pair)),
        issuer,
    }
}

fn to_offset(at: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(at.timestamp()).unwrap()
}

/// Sign a CRL listing `entries`, the way the generation service would.
pub fn sign_crl(
    signer: &rcgen::Issuer<'static, KeyPair>,
    this_update: DateTime<Utc>,
    entries: &[RevocationRecord],
) -> Vec<u8> {
    let params = CertificateRevocationListParams {
        this_update: to_offset(this_update),
        next_update: to_offset(this_update + TimeDelta::days(7)),
        crl_number: SerialNumber::from(1u64),
        issuing_distribution_point: None,
        revoked_certs: entries
            .iter()
            .map(|entry| RevokedCertParams {
                serial_number: SerialNumber::from(entry.serial.parse::<u64>().unwrap()),
                revocation_time: to_offset(entry.revoked_at),
                reason_code: None,
                invalidity_date: None,
            })
            .collect(),
        key_identifier_method: KeyIdMethod::Sha256,
    };
    params.signed_by(signer).unwrap().der().to_vec()
}

/// Split `der` into three chunks, like a streaming response would.
pub fn chunked(der: Vec<u8>) -> Vec<Result<CrlChunk, TransportError>> {
    let size = der.len().div_ceil(3).max(1);
    der.chunks(size)
        .map(|chunk| {
            Ok(CrlChunk {
                chunk: chunk.to_vec(),
            })
        })
        .collect()
}

pub fn record(serial: u64, revoked_at: DateTime<Utc>) -> RevocationRecord {
    RevocationRecord {
        serial: serial.to_string(),
        reason: 0,
        revoked_at,
    }
}

/// What the fake source serves for one shard.
#[derive(Clone)]
pub enum SourceScript {
    Records(Vec<Result<RevocationRecord, TransportError>>),
    Unavailable,
}

/// In-memory revocation source keyed by issuer and shard start.
/// Unscripted shards are empty.
#[derive(Default)]
pub struct FakeSource {
    scripts: Mutex<HashMap<(IssuerNameId, DateTime<Utc>), SourceScript>>,
    requests: Mutex<Vec<RevokedCertsRequest>>,
}

impl FakeSource {
    pub fn script(&self, issuer: IssuerNameId, window: ShardWindow, script: SourceScript) {
        self.scripts
            .lock()
            .unwrap()
            .insert((issuer, window.start), script);
    }

    pub fn requests(&self) -> Vec<RevokedCertsRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RevocationSource for FakeSource {
    async fn get_revoked_certs(
        &self,
        request: RevokedCertsRequest,
    ) -> Result<RevocationStream, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&(request.issuer_name_id, request.expires_after))
            .cloned();
        match script {
            Some(SourceScript::Unavailable) => Err(TransportError::status("source unavailable")),
            Some(SourceScript::Records(records)) => Ok(Box::pin(stream::iter(records))),
            None => Ok(Box::pin(stream::empty())),
        }
    }
}

/// Builds the generator's output from what it was sent.
pub type Responder =
    Arc<dyn Fn(&CrlMetadata, &[RevocationRecord]) -> Vec<Result<CrlChunk, TransportError>> + Send + Sync>;

/// In-memory generation service. Every session's requests are logged.
pub struct FakeGenerator {
    responder: Responder,
    sessions: Arc<Mutex<Vec<Vec<GenerateCrlRequest>>>>,
}

impl FakeGenerator {
    pub fn new(responder: Responder) -> Self {
        Self {
            responder,
            sessions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Signs every CRL with the matching CA's key.
    pub fn signing_with(cas: &[&TestCa]) -> Self {
        let signers: HashMap<_, _> = cas
            .iter()
            .map(|ca| (ca.issuer.name_id(), Arc::clone(&ca.signer)))
            .collect();
        Self::new(Arc::new(move |metadata: &CrlMetadata, entries: &[RevocationRecord]| {
            let signer = &signers[&metadata.issuer_name_id];
            chunked(sign_crl(signer, metadata.this_update, entries))
        }))
    }

    pub fn sessions(&self) -> Vec<Vec<GenerateCrlRequest>> {
        self.sessions.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrlGenerator for FakeGenerator {
    async fn generate_crl(&self) -> Result<Box<dyn GenerationSession>, TransportError> {
        Ok(Box::new(FakeSession {
            responder: Arc::clone(&self.responder),
            sent: Vec::new(),
            log: Arc::clone(&self.sessions),
        }))
    }
}

struct FakeSession {
    responder: Responder,
    sent: Vec<GenerateCrlRequest>,
    log: Arc<Mutex<Vec<Vec<GenerateCrlRequest>>>>,
}

#[async_trait]
impl GenerationSession for FakeSession {
    async fn send(&mut self, request: GenerateCrlRequest) -> Result<(), TransportError> {
        self.sent.push(request);
        Ok(())
    }

    fn finish(self: Box<Self>) -> CrlChunkStream {
        let metadata = match self.sent.first() {
            Some(GenerateCrlRequest::Metadata(metadata)) => metadata.clone(),
            other => panic!("expected metadata first, got {other:?}"),
        };
        let entries: Vec<_> = self
            .sent
            .iter()
            .filter_map(|request| match request {
                GenerateCrlRequest::Entry(entry) => Some(entry.clone()),
                GenerateCrlRequest::Metadata(_) => None,
            })
            .collect();
        let output = (self.responder)(&metadata, &entries);
        self.log.lock().unwrap().push(self.sent);
        Box::pin(stream::iter(output))
    }
}

/// Keeps what it is handed, optionally refusing one shard.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(IssuerNameId, GeneratedCrl)>>,
    fail_shard: Mutex<Option<u64>>,
}

impl RecordingPublisher {
    pub fn fail_on(&self, shard_id: u64) {
        *self.fail_shard.lock().unwrap() = Some(shard_id);
    }

    pub fn published(&self) -> Vec<(IssuerNameId, GeneratedCrl)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrlPublisher for RecordingPublisher {
    async fn publish(&self, issuer: &Issuer, crl: GeneratedCrl) -> Result<(), TransportError> {
        if *self.fail_shard.lock().unwrap() == Some(crl.shard_id) {
            return Err(TransportError::status("bucket unavailable"));
        }
        self.published.lock().unwrap().push((issuer.name_id(), crl));
        Ok(())
    }
}

/// One captured log event with its fields rendered as text.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// `tracing` layer that records every event on the current thread while
/// installed.
#[derive(Clone, Default)]
pub struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl EventCapture {
    pub fn install(&self) -> DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.level == level)
            .cloned()
            .collect()
    }
}

struct FieldVisitor<'a>(&'a mut CapturedEvent);

impl FieldVisitor<'_> {
    fn put(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.0.message = value;
        } else {
            self.0.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for EventCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut captured = CapturedEvent {
            level: *event.metadata().level(),
            message: String::new(),
            fields: HashMap::new(),
        };
        event.record(&mut FieldVisitor(&mut captured));
        self.events.lock().unwrap().push(captured);
    }
}

/// Reference time shared by the tests.
pub fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-14T15:09:26Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn config(num_shards: u64) -> UpdaterConfig {
    UpdaterConfig {
        num_shards,
        lookback: Duration::from_secs(24 * 60 * 60),
        lookforward: Duration::from_secs((num_shards * 3 - 1) * 24 * 60 * 60),
        update_period: Duration::from_secs(60 * 60),
    }
}

pub fn windows(config: &UpdaterConfig) -> ShardWindows {
    config.validate().unwrap()
}

pub struct Harness {
    pub updater: CrlUpdater,
    pub source: Arc<FakeSource>,
    pub generator: Arc<FakeGenerator>,
    pub publisher: Arc<RecordingPublisher>,
    pub registry: MetricsRegistry,
    pub clock: FakeClock,
}

pub fn harness(
    config: UpdaterConfig,
    issuers: Vec<Issuer>,
    source: FakeSource,
    generator: FakeGenerator,
) -> Harness {
    telemetry::init_tracing();

    let source = Arc::new(source);
    let generator = Arc::new(generator);
    let publisher = Arc::new(RecordingPublisher::default());
    let registry = MetricsRegistry::new().unwrap();
    let clock = FakeClock::new(now());
    let updater = CrlUpdater::new(
        config,
        IssuerDirectory::new(issuers),
        Arc::clone(&source) as Arc<dyn RevocationSource>,
        Arc::clone(&generator) as Arc<dyn CrlGenerator>,
        registry.updater_metrics().clone(),
        Arc::new(clock.clone()),
    )
    .unwrap()
    .with_publisher(Arc::clone(&publisher) as Arc<dyn CrlPublisher>);

    Harness {
        updater,
        source,
        generator,
        publisher,
        registry,
        clock,
    }
}
