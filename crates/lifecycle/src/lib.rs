//! Certificate lifecycle pipeline for a multi-tenant web platform
//!
//! certstage shepherds TLS certificates for platform-hosted domains from
//! first request to deployment. The flow:
//!
//! 1. A new site is registered; its domain is flagged pending and a fresh
//!    RSA key pair and CSR are generated into `pending-cert/`
//!    ([`csr::KeyPairEngine`]).
//! 2. An operator submits the CSR to a certificate authority out of band,
//!    then uploads the issued certificate. The upload is policy-gated,
//!    parsed ([`certificate::parse_certificate`]), rendered into an nginx
//!    server-block fragment and merged into the aggregate config
//!    ([`render`]), and staged to `to-deploy/` next to its private key
//!    ([`staging::ArtifactStager`]).
//! 3. External deployment tooling moves artifacts from `to-deploy/` to
//!    `deployed/` and reloads the web server.
//! 4. The operator probes the domain over HTTPS ([`probe`]) and confirms
//!    it; the pending flag clears and the artifacts are archived to
//!    `complete/`.
//!
//! [`orchestrator::LifecycleOrchestrator`] drives the whole flow and talks
//! to the host platform through the [`registry::SiteRegistry`] trait.

pub mod certificate;
pub mod csr;
pub mod domain;
pub mod error;
pub mod orchestrator;
pub mod probe;
pub mod registry;
pub mod render;
pub mod staging;

pub use certificate::{parse_certificate, CertificateArtifact};
pub use csr::KeyPairEngine;
pub use domain::{is_valid_domain, Domain, DomainError};
pub use error::{GenerationError, LifecycleError, ParseError, RenderError, StagerError};
pub use orchestrator::{
    AdminResponse, CertificateUpload, FlaggedDomain, LifecycleEvent, LifecycleOrchestrator,
};
pub use probe::{HttpsProbe, ProbeOutcome, TlsProbe};
pub use registry::{MemoryRegistry, SiteRef, SiteRegistry};
pub use render::{merge_fragment, ConfigRenderer};
pub use staging::{ArtifactStager, Stage};
