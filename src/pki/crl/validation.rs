use tracing::{debug, warn};
use x509_parser::extensions::ParsedExtension;
use x509_parser::oid_registry::OID_X509_EXT_KEY_USAGE;
use x509_parser::prelude::*;

use super::errors::{CrlError, CrlResult};
use crate::pki::issuance::Issuer;

/// A DER-encoded CRL that is known to parse.
#[derive(Debug, Clone)]
pub struct ParsedCrl {
    der: Vec<u8>,
}

impl ParsedCrl {
    /// Check that `der` is exactly one well-formed CRL
    pub fn from_der(der: Vec<u8>) -> CrlResult<Self> {
        let (rest, _) = CertificateRevocationList::from_der(&der).map_err(|e| CrlError::Parse(e.into()))?;
        if !rest.is_empty() {
            return Err(CrlError::TrailingData(rest.len()));
        }
        Ok(Self { der })
    }

    fn parse(&self) -> CrlResult<CertificateRevocationList<'_>> {
        let (_, crl) =
            CertificateRevocationList::from_der(&self.der).map_err(|e| CrlError::Parse(e.into()))?;
        Ok(crl)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn into_der(self) -> Vec<u8> {
        self.der
    }

    /// Verify the CRL signature against the issuing certificate and return
    /// the number of revoked certificates listed.
    ///
    /// The CRL issuer must match the certificate subject, and a KeyUsage
    /// extension, when present, must allow cRLSign.
    pub fn verify(&self, issuer: &Issuer) -> CrlResult<usize> {
        let crl = self.parse()?;
        let issuer_cert = issuer.parse()?;

        if issuer_cert.tbs_certificate.subject != crl.tbs_cert_list.issuer {
            debug!("CRL issuer does not match certificate subject");
            return Err(CrlError::IssuerMismatch);
        }

        for ext in issuer_cert.tbs_certificate.extensions() {
            if ext.oid == OID_X509_EXT_KEY_USAGE
                && let ParsedExtension::KeyUsage(ku) = ext.parsed_extension()
                && !ku.crl_sign()
            {
                warn!(
                    "Issuer {} not authorized for CRL signing (cRLSign bit not set)",
                    issuer.name()
                );
                return Err(CrlError::UnauthorizedIssuer);
            }
        }

        x509_parser::verify::verify_signature(
            &issuer_cert.tbs_certificate.subject_pki,
            &crl.signature_algorithm,
            &crl.signature_value,
            crl.tbs_cert_list.as_ref(),
        )
        .map_err(|e| {
            debug!("CRL signature verification failed: {:?}", e);
            CrlError::SignatureVerification
        })?;

        Ok(crl.tbs_cert_list.revoked_certificates.len())
    }
}
