//! Filesystem-backed staging pipeline
//!
//! The deployment pipeline is the filesystem: which directory a domain's
//! artifacts occupy *is* its stage. This is intentional: an operator can
//! intervene by moving files by hand, and external deployment tooling
//! advances domains by moving files between stages. All probing and moving
//! lives behind [`ArtifactStager`] so alternate backends can satisfy the
//! same contract.
//!
//! # Directory structure
//!
//! ```text
//! {staging_dir}/
//! ├── pending-cert/<domain>.csr    # CSR + key, awaiting certificate upload
//! ├── pending-cert/<domain>.key
//! ├── to-deploy/<domain>.cer       # cert + key, awaiting deployment script
//! ├── to-deploy/<domain>.key
//! ├── deployed/<domain>.cer        # deployed, awaiting operator confirmation
//! ├── deployed/<domain>.key
//! ├── complete/<domain>.cer        # terminal archive
//! └── complete/<domain>.key
//! ```
//!
//! External processes mutate this tree concurrently, so stage membership is
//! re-derived on every read and never cached, and every move is
//! move-if-exists with overwrite on the destination.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use certstage_config::StagingConfig;

use crate::domain::Domain;
use crate::error::StagerError;

/// Pipeline stage of a domain's artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// No artifacts anywhere
    None,
    /// CSR and key generated, awaiting certificate upload
    PendingCsr,
    /// Certificate staged, awaiting the deployment script
    AwaitingDeployment,
    /// Deployed, awaiting operator confirmation
    Deployed,
}

impl Stage {
    /// Action label shown by the admin display layer
    pub fn action_label(self) -> &'static str {
        match self {
            Stage::None => "Unavailable",
            Stage::PendingCsr => "View CSR",
            Stage::AwaitingDeployment => "Awaiting deployment",
            Stage::Deployed => "Confirm",
        }
    }
}

/// Owns the staging tree and all transitions between stages
pub struct ArtifactStager {
    pending_cert_dir: PathBuf,
    to_deploy_dir: PathBuf,
    deployed_dir: PathBuf,
    complete_dir: PathBuf,
    intermediate_cert: Option<PathBuf>,
}

impl ArtifactStager {
    /// Create a stager and ensure the staging tree exists.
    pub fn new(config: &StagingConfig) -> Result<Self, StagerError> {
        let stager = Self {
            pending_cert_dir: config.pending_cert_dir(),
            to_deploy_dir: config.to_deploy_dir(),
            deployed_dir: config.deployed_dir(),
            complete_dir: config.complete_dir(),
            intermediate_cert: config.intermediate_cert.clone(),
        };

        for dir in [
            &stager.pending_cert_dir,
            &stager.to_deploy_dir,
            &stager.deployed_dir,
            &stager.complete_dir,
        ] {
            fs::create_dir_all(dir).map_err(|source| StagerError::Io {
                artifact: "staging directory",
                path: dir.clone(),
                source,
            })?;
        }

        debug!(
            staging_dir = %config.staging_dir.display(),
            "Initialized certificate staging tree"
        );
        Ok(stager)
    }

    fn pending_csr(&self, domain: &Domain) -> PathBuf {
        self.pending_cert_dir.join(format!("{}.csr", domain))
    }

    fn pending_key(&self, domain: &Domain) -> PathBuf {
        self.pending_cert_dir.join(format!("{}.key", domain))
    }

    fn staged_cert(&self, domain: &Domain) -> PathBuf {
        self.to_deploy_dir.join(format!("{}.cer", domain))
    }

    fn staged_key(&self, domain: &Domain) -> PathBuf {
        self.to_deploy_dir.join(format!("{}.key", domain))
    }

    fn deployed_cert(&self, domain: &Domain) -> PathBuf {
        self.deployed_dir.join(format!("{}.cer", domain))
    }

    fn deployed_key(&self, domain: &Domain) -> PathBuf {
        self.deployed_dir.join(format!("{}.key", domain))
    }

    /// Current stage of a domain, derived from file presence.
    ///
    /// Later stages take precedence: stale artifacts may physically remain
    /// in earlier directories, and the display layer only cares about the
    /// most-advanced stage. Computed fresh on every call, since external
    /// processes move files between reads.
    pub fn stage_of(&self, domain: &Domain) -> Stage {
        if self.deployed_cert(domain).exists() {
            Stage::Deployed
        } else if self.staged_cert(domain).exists() {
            Stage::AwaitingDeployment
        } else if self.pending_csr(domain).exists() {
            Stage::PendingCsr
        } else {
            Stage::None
        }
    }

    /// Check that the pending CSR and key both exist for a domain.
    ///
    /// Guards certificate uploads: a certificate for a domain whose key was
    /// never generated (or already consumed) is a pipeline-ordering
    /// violation, reported before anything is written.
    pub fn ensure_pending(&self, domain: &Domain) -> Result<(), StagerError> {
        if !self.pending_csr(domain).exists() {
            return Err(StagerError::MissingCsr(domain.to_string()));
        }
        if !self.pending_key(domain).exists() {
            return Err(StagerError::MissingKey(domain.to_string()));
        }
        Ok(())
    }

    /// Read the pending CSR text for a domain.
    pub fn csr_text(&self, domain: &Domain) -> Result<String, StagerError> {
        let path = self.pending_csr(domain);
        if !path.exists() {
            return Err(StagerError::MissingCsr(domain.to_string()));
        }
        fs::read_to_string(&path).map_err(|source| StagerError::Io {
            artifact: "CSR",
            path,
            source,
        })
    }

    /// Stage an uploaded certificate for deployment.
    ///
    /// Writes the certificate (with the configured intermediate chain
    /// appended) to `to-deploy/<domain>.cer` and moves the pending private
    /// key alongside it. The certificate file's permission bits are copied
    /// from the directory mode, masked to read/write.
    pub fn commit_upload(&self, domain: &Domain, cert_pem: &str) -> Result<(), StagerError> {
        self.ensure_pending(domain)?;

        let mut contents = cert_pem.trim_end().to_string();
        contents.push('\n');
        if let Some(ref chain_path) = self.intermediate_cert {
            let chain = fs::read_to_string(chain_path).map_err(|source| StagerError::Io {
                artifact: "intermediate chain",
                path: chain_path.clone(),
                source,
            })?;
            contents.push_str(chain.trim_end());
            contents.push('\n');
        }

        let cert_path = self.staged_cert(domain);
        fs::write(&cert_path, &contents).map_err(|source| StagerError::Io {
            artifact: "certificate",
            path: cert_path.clone(),
            source,
        })?;
        copy_directory_mode(&self.to_deploy_dir, &cert_path);

        let key_src = self.pending_key(domain);
        let key_dst = self.staged_key(domain);
        fs::rename(&key_src, &key_dst).map_err(|source| StagerError::Io {
            artifact: "private key",
            path: key_src,
            source,
        })?;

        info!(domain = %domain, "Staged certificate and key for deployment");
        Ok(())
    }

    /// Terminal transition: archive a confirmed domain's artifacts.
    ///
    /// Removes to-deploy leftovers and moves deployed artifacts into the
    /// complete archive. Every operation is best-effort: a missing file
    /// means some other invocation (or an operator) already advanced the
    /// domain, and the end state is the same either way.
    pub fn confirm(&self, domain: &Domain) {
        remove_if_exists(&self.staged_cert(domain));
        remove_if_exists(&self.staged_key(domain));

        move_if_exists(
            &self.deployed_cert(domain),
            &self.complete_dir.join(format!("{}.cer", domain)),
        );
        move_if_exists(
            &self.deployed_key(domain),
            &self.complete_dir.join(format!("{}.key", domain)),
        );

        info!(domain = %domain, "Archived confirmed domain artifacts");
    }

    /// Discard staged and deployed artifacts for a domain.
    ///
    /// Used by unconfirm: a fresh CSR supersedes whatever was in flight,
    /// and later stages shadow `pending-cert` in [`ArtifactStager::stage_of`],
    /// so stale files must go. Best-effort, like [`ArtifactStager::confirm`].
    pub fn discard_staged(&self, domain: &Domain) {
        remove_if_exists(&self.staged_cert(domain));
        remove_if_exists(&self.staged_key(domain));
        remove_if_exists(&self.deployed_cert(domain));
        remove_if_exists(&self.deployed_key(domain));

        debug!(domain = %domain, "Discarded staged artifacts");
    }
}

/// Remove a file, tolerating absence. Other failures are logged and
/// swallowed: the caller's end state (file gone eventually) does not
/// depend on this succeeding right now.
fn remove_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed stale artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale artifact"),
    }
}

/// Move a file if it exists, overwriting any destination. A missing source
/// is a no-op: concurrent invocations may have already moved it.
fn move_if_exists(src: &Path, dst: &Path) {
    if !src.exists() {
        return;
    }
    if let Err(e) = fs::rename(src, dst) {
        warn!(
            src = %src.display(),
            dst = %dst.display(),
            error = %e,
            "Failed to move artifact between stages"
        );
    }
}

/// Copy the containing directory's permission bits onto a freshly written
/// file, masked to read/write for owner, group, and world.
#[cfg(unix)]
fn copy_directory_mode(dir: &Path, file: &Path) {
    use std::os::unix::fs::PermissionsExt;

    match fs::metadata(dir) {
        Ok(meta) => {
            let mode = meta.permissions().mode() & 0o666;
            if let Err(e) = fs::set_permissions(file, fs::Permissions::from_mode(mode)) {
                warn!(path = %file.display(), error = %e, "Failed to set staged file mode");
            }
        }
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Failed to stat stage directory");
        }
    }
}

#[cfg(not(unix))]
fn copy_directory_mode(_dir: &Path, _file: &Path) {}
