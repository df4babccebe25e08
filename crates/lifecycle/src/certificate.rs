//! Uploaded certificate parsing
//!
//! Parses an uploaded X.509 certificate (PEM or DER), extracts the subject
//! CN and the DNS entries of the subjectAltName extension, and retains a
//! normalized PEM rendition of the leaf for staging. MIME/size pre-filters
//! are the orchestrator's job; this module assumes it is handed bytes that
//! at least claim to be a certificate.

use std::collections::BTreeSet;

use tracing::debug;
use x509_parser::extensions::GeneralName;
use x509_parser::parse_x509_certificate;

use crate::domain::Domain;
use crate::error::ParseError;

/// An uploaded certificate with derived metadata
#[derive(Debug, Clone)]
pub struct CertificateArtifact {
    /// Subject common name (validated domain)
    pub subject_cn: Domain,
    /// subjectAltName DNS entries, normalized and with the CN excluded
    pub alt_names: BTreeSet<String>,
    /// Leaf certificate as PEM, as it will be staged to disk
    pub pem: String,
}

impl CertificateArtifact {
    /// Full set of names the certificate covers, CN included.
    ///
    /// Never empty for a parsed artifact; the renderer still treats an
    /// empty set as fatal for callers assembling name sets themselves.
    pub fn name_set(&self) -> BTreeSet<String> {
        let mut names = self.alt_names.clone();
        names.insert(self.subject_cn.as_str().to_string());
        names
    }
}

/// Normalize one subjectAltName entry.
///
/// Tolerates the textual `DNS:host` form some tooling emits; strips the
/// prefix and surrounding whitespace, lowercases the rest.
fn clean_alt_name(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("DNS:")
        .trim()
        .to_ascii_lowercase()
}

/// Parse an uploaded certificate and extract CN and alt names.
pub fn parse_certificate(raw: &[u8]) -> Result<CertificateArtifact, ParseError> {
    // Accept PEM or bare DER; stage as PEM either way.
    let (der, pem_text) = match pem::parse(raw) {
        Ok(block) => {
            if block.tag() != "CERTIFICATE" {
                return Err(ParseError::NotValidCertificate);
            }
            let text = String::from_utf8_lossy(raw).into_owned();
            (block.into_contents(), text)
        }
        Err(_) => {
            let block = pem::Pem::new("CERTIFICATE", raw.to_vec());
            (raw.to_vec(), pem::encode(&block))
        }
    };

    let (_, cert) =
        parse_x509_certificate(&der).map_err(|_| ParseError::NotValidCertificate)?;

    let cn = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .ok_or(ParseError::MissingCn)?;
    let subject_cn = Domain::parse(cn).map_err(|_| ParseError::InvalidCn(cn.to_string()))?;

    let mut alt_names = BTreeSet::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                let cleaned = clean_alt_name(dns);
                if !cleaned.is_empty() && cleaned != subject_cn.as_str() {
                    alt_names.insert(cleaned);
                }
            }
        }
    }

    debug!(
        cn = %subject_cn,
        alt_names = alt_names.len(),
        "Parsed uploaded certificate"
    );

    Ok(CertificateArtifact {
        subject_cn,
        alt_names,
        pem: pem_text,
    })
}
