//! Error types for the certificate lifecycle pipeline.
//!
//! Every failure is a value. Validation errors, pipeline-ordering errors,
//! and I/O errors are kept distinct so the orchestrator can always shape a
//! well-formed response; nothing here is fatal to the host process.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::DomainError;

/// CSR/key generation errors
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Cannot generate a CSR for an empty domain")]
    EmptyDomain,

    #[error("Cannot generate a CSR for invalid domain '{0}'")]
    InvalidDomain(String),

    #[error("RSA key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Failed to build the signing request: {0}")]
    CsrBuild(String),

    #[error("Failed to create pending directory {path:?}: {source}")]
    PendingDirFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to export CSR to {path:?}: {source}")]
    CsrExportFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to export private key to {path:?}: {source}")]
    KeyExportFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Uploaded certificate parsing errors
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("This is not a valid x.509 certificate file.")]
    NotValidCertificate,

    #[error("The certificate appeared correct, but a valid CN was not found.")]
    MissingCn,

    #[error("The certificate subject CN '{0}' is not a valid domain")]
    InvalidCn(String),
}

/// Config fragment rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("The certificate declares no usable domain names")]
    NoAltNames,
}

/// Staging pipeline errors.
///
/// `MissingCsr` and `MissingKey` signal a pipeline-ordering violation (a
/// certificate arriving for a domain whose key material was never generated
/// or already consumed), not bad input.
#[derive(Error, Debug)]
pub enum StagerError {
    #[error("No pending CSR exists for domain '{0}'")]
    MissingCsr(String),

    #[error("No pending private key exists for domain '{0}'")]
    MissingKey(String),

    #[error("{artifact} operation failed at {path:?}: {source}")]
    Io {
        artifact: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Top-level error for orchestrator operations
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Stager(#[from] StagerError),

    #[error("{0}")]
    UploadRejected(String),

    #[error("The domain passed was valid, but confirmation was not successful.")]
    ConfirmFailed,

    #[error("No CSR is available for this domain.")]
    CsrUnavailable,
}
