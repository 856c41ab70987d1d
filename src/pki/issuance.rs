use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ring::digest::{SHA1_FOR_LEGACY_USE_ONLY, digest};
use tracing::{debug, warn};
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::*;

use crate::pki::crl::{ConfigError, CrlError, CrlResult};

/// Stable numeric identifier of an issuing authority.
///
/// The first seven bytes of the SHA-1 digest of the DER-encoded subject name,
/// read big-endian, so the value is always non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IssuerNameId(i64);

impl IssuerNameId {
    pub fn from_raw_subject(subject_der: &[u8]) -> Self {
        let hash = digest(&SHA1_FOR_LEGACY_USE_ONLY, subject_der);
        let mut buf = [0u8; 8];
        buf[1..].copy_from_slice(&hash.as_ref()[..7]);
        Self(i64::from_be_bytes(buf))
    }

    pub const fn from_i64(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for IssuerNameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An issuing authority's certificate, loaded once and never mutated.
#[derive(Debug, Clone)]
pub struct Issuer {
    raw: Arc<Vec<u8>>,
    name_id: IssuerNameId,
    name: String,
}

impl Issuer {
    /// Create an issuer from a DER-encoded certificate
    pub fn from_der(der: impl Into<Vec<u8>>) -> CrlResult<Self> {
        let raw = der.into();
        let (name_id, name) = {
            let (_, cert) = X509Certificate::from_der(&raw)
                .map_err(|e| CrlError::Certificate(e.to_string()))?;
            let subject = cert.subject();
            let name = subject
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_owned)
                .unwrap_or_else(|| subject.to_string());
            (IssuerNameId::from_raw_subject(subject.as_raw()), name)
        };

        Ok(Self {
            raw: Arc::new(raw),
            name_id,
            name,
        })
    }

    /// Create an issuer from the first PEM certificate block in `pem`
    pub fn from_pem(pem: &[u8]) -> CrlResult<Self> {
        let (_, pem) = parse_x509_pem(pem).map_err(|e| CrlError::Certificate(e.to_string()))?;
        Self::from_der(pem.contents)
    }

    /// Read an issuer certificate file, PEM or DER.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let issuer = if bytes.starts_with(b"-----BEGIN") {
            Self::from_pem(&bytes)?
        } else {
            Self::from_der(bytes)?
        };
        debug!(
            "Loaded issuer {} ({}) from {}",
            issuer.name,
            issuer.name_id,
            path.display()
        );
        Ok(issuer)
    }

    /// Parse the certificate from stored DER bytes
    pub fn parse(&self) -> CrlResult<X509Certificate<'_>> {
        let (_, cert) =
            X509Certificate::from_der(&self.raw).map_err(|e| CrlError::Certificate(e.to_string()))?;
        Ok(cert)
    }

    pub fn name_id(&self) -> IssuerNameId {
        self.name_id
    }

    /// Subject common name, used as the metrics and log label.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn der(&self) -> &[u8] {
        &self.raw
    }
}

/// Read-only lookup table of issuers keyed by name ID.
#[derive(Debug, Clone, Default)]
pub struct IssuerDirectory {
    issuers: Arc<BTreeMap<IssuerNameId, Issuer>>,
}

impl IssuerDirectory {
    pub fn new(issuers: impl IntoIterator<Item = Issuer>) -> Self {
        let mut by_id = BTreeMap::new();
        for issuer in issuers {
            if let Some(previous) = by_id.insert(issuer.name_id(), issuer) {
                warn!(
                    "Duplicate issuer name ID {} ({}), keeping the last one",
                    previous.name_id(),
                    previous.name()
                );
            }
        }
        Self {
            issuers: Arc::new(by_id),
        }
    }

    /// Load every issuer certificate file in order.
    pub async fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let mut issuers = Vec::with_capacity(paths.len());
        for path in paths {
            issuers.push(Issuer::load(path).await?);
        }
        Ok(Self::new(issuers))
    }

    pub fn get(&self, id: &IssuerNameId) -> Option<&Issuer> {
        self.issuers.get(id)
    }

    /// Issuers in ascending name ID order.
    pub fn iter(&self) -> impl Iterator<Item = &Issuer> {
        self.issuers.values()
    }

    pub fn len(&self) -> usize {
        self.issuers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issuers.is_empty()
    }
}
