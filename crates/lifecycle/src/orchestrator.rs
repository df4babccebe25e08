//! Lifecycle orchestration
//!
//! Ties the pipeline together: site-creation hooks, certificate uploads,
//! confirmation, and the admin-facing event dispatch. The orchestrator owns
//! the generation engine, renderer, and stager, and talks to the host
//! platform through the [`SiteRegistry`] and [`TlsProbe`] traits.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use certstage_config::{StagingConfig, UploadPolicy};

use crate::certificate::parse_certificate;
use crate::csr::KeyPairEngine;
use crate::domain::Domain;
use crate::error::{LifecycleError, StagerError};
use crate::probe::{ProbeOutcome, TlsProbe};
use crate::registry::SiteRegistry;
use crate::render::{merge_fragment, ConfigRenderer};
use crate::staging::{ArtifactStager, Stage};

/// An uploaded certificate file as received from the admin surface
#[derive(Debug, Clone, Copy)]
pub struct CertificateUpload<'a> {
    /// Domain the admin surface believes this certificate is for. Advisory
    /// only: the parsed subject CN is authoritative.
    pub domain_hint: &'a str,
    pub bytes: &'a [u8],
    pub mime_type: &'a str,
    pub size: usize,
    /// Display name recorded in the rendered config fragment
    pub uploader: &'a str,
}

/// Admin-surface events the orchestrator dispatches on
#[derive(Debug, Clone, Copy)]
pub enum LifecycleEvent<'a> {
    SiteCreated { site_id: u64, domain: &'a str },
    CertificateUploaded(CertificateUpload<'a>),
    Confirm { domain: &'a str },
    Unconfirm { domain: &'a str },
    RequestCsr { domain: &'a str },
    ViewCsr { domain: &'a str },
    CheckLiveness { domain: &'a str },
}

/// JSON envelope returned to the admin surface
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AdminResponse {
    Success(String),
    Error(String),
}

/// A pending domain with its derived stage and display action
#[derive(Debug, Serialize)]
pub struct FlaggedDomain {
    pub domain: String,
    pub stage: Stage,
    pub action: &'static str,
}

/// Drives the certificate lifecycle end to end
pub struct LifecycleOrchestrator<R: SiteRegistry, P: TlsProbe> {
    aggregate_config: PathBuf,
    upload_policy: UploadPolicy,
    engine: KeyPairEngine,
    renderer: ConfigRenderer,
    stager: ArtifactStager,
    registry: R,
    probe: P,
}

impl<R: SiteRegistry, P: TlsProbe> LifecycleOrchestrator<R, P> {
    pub fn new(config: &StagingConfig, registry: R, probe: P) -> Result<Self, LifecycleError> {
        Ok(Self {
            aggregate_config: config.aggregate_config_path(),
            upload_policy: config.upload.clone(),
            engine: KeyPairEngine::new(config),
            renderer: ConfigRenderer::new(config),
            stager: ArtifactStager::new(config)?,
            registry,
            probe,
        })
    }

    /// Dispatch an admin-surface event and shape the JSON response.
    ///
    /// Every outcome is a response; errors never escape as panics or
    /// process failures.
    pub fn dispatch(&self, event: LifecycleEvent<'_>) -> AdminResponse {
        let result = match event {
            LifecycleEvent::SiteCreated { site_id, domain } => self
                .register_site(site_id, domain)
                .map(|_| "Site registered.".to_string()),
            LifecycleEvent::CertificateUploaded(upload) => self
                .upload_certificate(&upload)
                .map(|domain| format!("{} staged for deployment.", domain)),
            LifecycleEvent::Confirm { domain } => self
                .confirm(domain)
                .map(|domain| domain.into_string()),
            LifecycleEvent::Unconfirm { domain } => self
                .unconfirm(domain)
                .map(|domain| domain.into_string()),
            LifecycleEvent::RequestCsr { domain } => self
                .request_csr(domain)
                .map(|domain| domain.into_string()),
            LifecycleEvent::ViewCsr { domain } => self.view_csr(domain),
            LifecycleEvent::CheckLiveness { domain } => self.check_liveness(domain),
        };

        match result {
            Ok(message) => AdminResponse::Success(message),
            Err(e) => AdminResponse::Error(e.to_string()),
        }
    }

    /// Hook for new site creation.
    ///
    /// If another site already serves the domain, the new site inherits the
    /// existing TLS state and nothing is generated. Otherwise the domain is
    /// flagged pending and a fresh key pair and CSR are exported.
    pub fn register_site(&self, site_id: u64, domain: &str) -> Result<(), LifecycleError> {
        let domain = Domain::parse(domain)?;

        if self
            .registry
            .domain_assigned_elsewhere(domain.as_str(), site_id)
        {
            info!(domain = %domain, site_id, "Domain already served; inheriting TLS state");
            return Ok(());
        }

        self.registry.set_tls_pending(domain.as_str());
        self.engine.generate_csr(domain.as_str())?;
        info!(domain = %domain, site_id, "Flagged new site for TLS");
        Ok(())
    }

    /// Process a certificate upload end to end.
    ///
    /// Order matters: the upload-policy gate and the pending-stage check
    /// both run before anything is written, so a rejected upload leaves the
    /// aggregate config and staging tree untouched.
    pub fn upload_certificate(
        &self,
        upload: &CertificateUpload<'_>,
    ) -> Result<Domain, LifecycleError> {
        if !self.policy_accepts(upload) {
            warn!(
                mime_type = upload.mime_type,
                size = upload.size,
                "Rejected certificate upload by policy"
            );
            return Err(LifecycleError::UploadRejected(
                "This is not a valid x.509 certificate file.".to_string(),
            ));
        }

        let artifact = parse_certificate(upload.bytes)?;
        let domain = artifact.subject_cn.clone();
        if !upload.domain_hint.is_empty()
            && !upload.domain_hint.eq_ignore_ascii_case(domain.as_str())
        {
            warn!(
                hint = upload.domain_hint,
                cn = %domain,
                "Upload domain hint does not match the certificate CN; trusting the CN"
            );
        }
        self.stager.ensure_pending(&domain)?;

        let fragment = self
            .renderer
            .render(&domain, &artifact.name_set(), upload.uploader)?;
        self.merge_into_aggregate(&domain, &fragment)?;
        self.stager.commit_upload(&domain, &artifact.pem)?;

        info!(domain = %domain, uploader = upload.uploader, "Certificate upload committed");
        Ok(domain)
    }

    /// Confirm a deployed domain: clear the pending flag, invalidate site
    /// caches, and archive its artifacts.
    pub fn confirm(&self, domain: &str) -> Result<Domain, LifecycleError> {
        let domain = Domain::parse(domain)?;

        if !self.registry.clear_tls_pending(domain.as_str()) {
            return Err(LifecycleError::ConfirmFailed);
        }

        for site in self.registry.find_sites_by_domain(domain.as_str()) {
            self.registry.invalidate_site_cache(&site);
        }
        self.stager.confirm(&domain);

        info!(domain = %domain, "Domain confirmed");
        Ok(domain)
    }

    /// Re-flag a domain and issue a fresh CSR, superseding any in-flight
    /// certificate.
    pub fn unconfirm(&self, domain: &str) -> Result<Domain, LifecycleError> {
        let domain = Domain::parse(domain)?;

        self.registry.set_tls_pending(domain.as_str());
        self.engine.generate_csr(domain.as_str())?;
        self.stager.discard_staged(&domain);
        for site in self.registry.find_sites_by_domain(domain.as_str()) {
            self.registry.invalidate_site_cache(&site);
        }

        info!(domain = %domain, "Domain returned to pending with a fresh CSR");
        Ok(domain)
    }

    /// The admin "Get CSR" action: same transition as unconfirm.
    pub fn request_csr(&self, domain: &str) -> Result<Domain, LifecycleError> {
        self.unconfirm(domain)
    }

    /// Return the pending CSR text for display.
    pub fn view_csr(&self, domain: &str) -> Result<String, LifecycleError> {
        let domain = Domain::parse(domain)?;

        match self.stager.csr_text(&domain) {
            Ok(text) => Ok(text),
            Err(StagerError::MissingCsr(_)) => Err(LifecycleError::CsrUnavailable),
            Err(e) => Err(e.into()),
        }
    }

    /// Probe a domain over HTTPS and describe the outcome.
    ///
    /// Advisory only; always succeeds once the domain validates.
    pub fn check_liveness(&self, domain: &str) -> Result<String, LifecycleError> {
        let domain = Domain::parse(domain)?;

        let message = match self.probe.probe(domain.as_str()) {
            ProbeOutcome::ConnectFailed(reason) => format!(
                "Unable to connect to <strong>{}</strong> over HTTPS: {}",
                domain, reason
            ),
            ProbeOutcome::EmptyHeaders => format!(
                "A connection to <strong>{}</strong> was made, but no response headers were returned.",
                domain
            ),
            ProbeOutcome::Responding { status } => format!(
                "<strong>{}</strong> is responding over HTTPS (status {}).",
                domain, status
            ),
        };
        Ok(message)
    }

    /// All pending domains with their current stage, for the admin listing.
    pub fn list_flagged_domains(&self) -> Vec<FlaggedDomain> {
        self.registry
            .tls_pending_domains()
            .into_iter()
            .filter_map(|raw| match Domain::parse(&raw) {
                Ok(domain) => {
                    let stage = self.stager.stage_of(&domain);
                    Some(FlaggedDomain {
                        domain: domain.into_string(),
                        stage,
                        action: stage.action_label(),
                    })
                }
                Err(e) => {
                    warn!(domain = %raw, error = %e, "Skipping unparseable pending domain");
                    None
                }
            })
            .collect()
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn stager(&self) -> &ArtifactStager {
        &self.stager
    }

    fn policy_accepts(&self, upload: &CertificateUpload<'_>) -> bool {
        self.upload_policy.accepts(upload.mime_type, upload.size)
    }

    fn merge_into_aggregate(&self, domain: &Domain, fragment: &str) -> Result<(), LifecycleError> {
        let aggregate = match fs::read_to_string(&self.aggregate_config) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(StagerError::Io {
                    artifact: "aggregate config",
                    path: self.aggregate_config.clone(),
                    source,
                }
                .into())
            }
        };

        let merged = merge_fragment(&aggregate, domain.as_str(), fragment);
        fs::write(&self.aggregate_config, merged).map_err(|source| StagerError::Io {
            artifact: "aggregate config",
            path: self.aggregate_config.clone(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use tempfile::TempDir;

    struct StubProbe(ProbeOutcome);

    impl TlsProbe for StubProbe {
        fn probe(&self, _domain: &str) -> ProbeOutcome {
            self.0.clone()
        }
    }

    fn setup(
        probe: ProbeOutcome,
    ) -> (TempDir, LifecycleOrchestrator<MemoryRegistry, StubProbe>) {
        let temp_dir = TempDir::new().unwrap();
        let config = StagingConfig {
            staging_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        let orchestrator =
            LifecycleOrchestrator::new(&config, MemoryRegistry::new(), StubProbe(probe)).unwrap();
        (temp_dir, orchestrator)
    }

    #[test]
    fn test_confirm_without_pending_flag_fails() {
        let (_temp_dir, orchestrator) = setup(ProbeOutcome::EmptyHeaders);

        let response = orchestrator.dispatch(LifecycleEvent::Confirm {
            domain: "a.example.edu",
        });
        assert_eq!(
            response,
            AdminResponse::Error(
                "The domain passed was valid, but confirmation was not successful.".to_string()
            )
        );
    }

    #[test]
    fn test_view_csr_before_generation() {
        let (_temp_dir, orchestrator) = setup(ProbeOutcome::EmptyHeaders);

        let response = orchestrator.dispatch(LifecycleEvent::ViewCsr {
            domain: "a.example.edu",
        });
        assert_eq!(
            response,
            AdminResponse::Error("No CSR is available for this domain.".to_string())
        );
    }

    #[test]
    fn test_upload_rejected_by_mime_type() {
        let (temp_dir, orchestrator) = setup(ProbeOutcome::EmptyHeaders);

        let upload = CertificateUpload {
            domain_hint: "a.example.edu",
            bytes: b"irrelevant",
            mime_type: "text/plain",
            size: 2100,
            uploader: "operator",
        };
        let result = orchestrator.upload_certificate(&upload);
        assert!(matches!(result, Err(LifecycleError::UploadRejected(_))));

        // Nothing was written.
        assert!(!temp_dir.path().join("04_generated_config.conf").exists());
    }

    #[test]
    fn test_upload_rejected_by_size() {
        let (_temp_dir, orchestrator) = setup(ProbeOutcome::EmptyHeaders);

        let upload = CertificateUpload {
            domain_hint: "a.example.edu",
            bytes: b"irrelevant",
            mime_type: "application/x-x509-ca-cert",
            size: 50_000,
            uploader: "operator",
        };
        assert!(matches!(
            orchestrator.upload_certificate(&upload),
            Err(LifecycleError::UploadRejected(_))
        ));
    }

    #[test]
    fn test_liveness_messages() {
        let (_temp_dir, orchestrator) =
            setup(ProbeOutcome::ConnectFailed("refused".to_string()));
        let message = orchestrator.check_liveness("a.example.edu").unwrap();
        assert!(message.contains("Unable to connect"));
        assert!(message.contains("refused"));

        let (_temp_dir, orchestrator) = setup(ProbeOutcome::EmptyHeaders);
        let message = orchestrator.check_liveness("a.example.edu").unwrap();
        assert!(message.contains("no response headers"));

        let (_temp_dir, orchestrator) = setup(ProbeOutcome::Responding { status: 200 });
        let message = orchestrator.check_liveness("a.example.edu").unwrap();
        assert!(message.contains("responding over HTTPS (status 200)"));
    }

    #[test]
    fn test_liveness_requires_valid_domain() {
        let (_temp_dir, orchestrator) = setup(ProbeOutcome::EmptyHeaders);

        assert!(orchestrator.check_liveness("bad domain!").is_err());
    }

    #[test]
    fn test_response_serialization() {
        let success = serde_json::to_string(&AdminResponse::Success("ok".to_string())).unwrap();
        assert_eq!(success, r#"{"success":"ok"}"#);

        let error = serde_json::to_string(&AdminResponse::Error("nope".to_string())).unwrap();
        assert_eq!(error, r#"{"error":"nope"}"#);
    }
}
