//! Configuration for the certstage certificate lifecycle pipeline.
//!
//! All tunable state lives in [`StagingConfig`]: the staging directory
//! tree, the distinguished-name template applied to every CSR, key
//! parameters, the upload acceptance policy, and the nginx server-block
//! templates. The struct is built once at startup and passed by reference
//! into every pipeline component; nothing in the core performs ambient
//! configuration lookups.
//!
//! # Staging tree
//!
//! ```text
//! {staging_dir}/
//! ├── 04_generated_config.conf   # aggregate nginx config
//! ├── pending-cert/              # <domain>.csr + <domain>.key, awaiting cert
//! ├── to-deploy/                 # <domain>.cer + <domain>.key, awaiting deploy
//! ├── deployed/                  # deployed, awaiting operator confirmation
//! └── complete/                  # terminal archive
//! ```

pub mod validate;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the aggregate nginx configuration inside the staging root
pub const AGGREGATE_CONFIG_FILE: &str = "04_generated_config.conf";

/// Stage directory names inside the staging root
pub const PENDING_CERT_DIR: &str = "pending-cert";
pub const TO_DEPLOY_DIR: &str = "to-deploy";
pub const DEPLOYED_DIR: &str = "deployed";
pub const COMPLETE_DIR: &str = "complete";

/// Placeholder tokens recognized by the server-block templates
pub const PLACEHOLDER_CERT_DOMAIN: &str = "<% cert_domain %>";
pub const PLACEHOLDER_ALT_DOMAINS: &str = "<% alt_domains %>";
pub const PLACEHOLDER_GENERATED: &str = "<% config_generated %>";
pub const PLACEHOLDER_CREATOR: &str = "<% config_creator %>";

const DEFAULT_SINGLE_TEMPLATE: &str = include_str!("../templates/single-domain.conf");
const DEFAULT_MULTI_TEMPLATE: &str = include_str!("../templates/multi-domain.conf");

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Base directory of the staging tree
    pub staging_dir: PathBuf,
    /// Intermediate CA chain appended to every uploaded certificate.
    /// When `None`, certificates are staged as uploaded.
    pub intermediate_cert: Option<PathBuf>,
    /// Distinguished-name template for generated CSRs
    pub dn: DnTemplate,
    /// Key generation parameters
    pub key: KeyConfig,
    /// Upload acceptance policy applied before parsing
    pub upload: UploadPolicy,
    /// nginx server-block templates
    pub templates: ConfigTemplates,
    /// Timeout for the HTTPS liveness probe, in seconds
    pub probe_timeout_secs: u64,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("/var/lib/certstage"),
            intermediate_cert: None,
            dn: DnTemplate::default(),
            key: KeyConfig::default(),
            upload: UploadPolicy::default(),
            templates: ConfigTemplates::default(),
            probe_timeout_secs: 5,
        }
    }
}

impl StagingConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: StagingConfig = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded staging configuration");
        Ok(config)
    }

    /// Directory holding CSR/key pairs awaiting a certificate upload
    pub fn pending_cert_dir(&self) -> PathBuf {
        self.staging_dir.join(PENDING_CERT_DIR)
    }

    /// Directory holding cert/key pairs awaiting the deployment script
    pub fn to_deploy_dir(&self) -> PathBuf {
        self.staging_dir.join(TO_DEPLOY_DIR)
    }

    /// Directory holding deployed cert/key pairs awaiting confirmation
    pub fn deployed_dir(&self) -> PathBuf {
        self.staging_dir.join(DEPLOYED_DIR)
    }

    /// Terminal archive directory
    pub fn complete_dir(&self) -> PathBuf {
        self.staging_dir.join(COMPLETE_DIR)
    }

    /// Path of the aggregate nginx configuration file
    pub fn aggregate_config_path(&self) -> PathBuf {
        self.staging_dir.join(AGGREGATE_CONFIG_FILE)
    }
}

/// Distinguished-name fields stamped into every CSR.
///
/// The common name is filled per request with the (lowercased) domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnTemplate {
    pub country: String,
    pub state_or_province: String,
    pub locality: String,
    pub organization: String,
    pub organizational_unit: String,
    pub email: String,
}

impl Default for DnTemplate {
    fn default() -> Self {
        Self {
            country: "US".to_string(),
            state_or_province: "State".to_string(),
            locality: "City".to_string(),
            organization: "Example Organization".to_string(),
            organizational_unit: "Web Services".to_string(),
            email: "hostmaster@example.org".to_string(),
        }
    }
}

/// Key generation parameters.
///
/// Signing requests are always SHA-256 over RSA; only the modulus size is
/// configurable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// RSA modulus size in bits
    pub bits: usize,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self { bits: 2048 }
    }
}

/// Upload acceptance policy checked before the certificate is parsed.
///
/// The size window is a heuristic inherited from the platform this replaces:
/// a bare leaf certificate from the expected CA historically lands strictly
/// between `min_size` and `max_size` bytes. Deployments using larger keys or
/// many SAN entries should widen the window; the structural parse still
/// rejects anything that is not an X.509 certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPolicy {
    /// Declared MIME type required for uploads
    pub expected_mime: String,
    /// Exclusive lower bound on the declared byte size
    pub min_size: usize,
    /// Exclusive upper bound on the declared byte size
    pub max_size: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            expected_mime: "application/x-x509-ca-cert".to_string(),
            min_size: 2000,
            max_size: 2300,
        }
    }
}

impl UploadPolicy {
    /// Check a declared MIME type and byte size against the policy.
    ///
    /// Both bounds are exclusive.
    pub fn accepts(&self, mime_type: &str, size: usize) -> bool {
        mime_type == self.expected_mime && size > self.min_size && size < self.max_size
    }
}

/// nginx server-block templates for single- and multi-domain certificates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigTemplates {
    /// Template used when the certificate covers only its common name
    pub single: String,
    /// Template used when the certificate carries additional alt names
    pub multi: String,
}

impl Default for ConfigTemplates {
    fn default() -> Self {
        Self {
            single: DEFAULT_SINGLE_TEMPLATE.to_string(),
            multi: DEFAULT_MULTI_TEMPLATE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_paths() {
        let config = StagingConfig {
            staging_dir: PathBuf::from("/srv/tls"),
            ..Default::default()
        };

        assert_eq!(
            config.pending_cert_dir(),
            PathBuf::from("/srv/tls/pending-cert")
        );
        assert_eq!(config.to_deploy_dir(), PathBuf::from("/srv/tls/to-deploy"));
        assert_eq!(config.deployed_dir(), PathBuf::from("/srv/tls/deployed"));
        assert_eq!(config.complete_dir(), PathBuf::from("/srv/tls/complete"));
        assert_eq!(
            config.aggregate_config_path(),
            PathBuf::from("/srv/tls/04_generated_config.conf")
        );
    }

    #[test]
    fn test_upload_policy_bounds_are_exclusive() {
        let policy = UploadPolicy::default();

        assert!(policy.accepts("application/x-x509-ca-cert", 2100));
        assert!(!policy.accepts("application/x-x509-ca-cert", 2000));
        assert!(!policy.accepts("application/x-x509-ca-cert", 2300));
        assert!(!policy.accepts("text/plain", 2100));
    }

    #[test]
    fn test_default_templates_carry_placeholders() {
        let templates = ConfigTemplates::default();

        assert!(templates.single.contains(PLACEHOLDER_CERT_DOMAIN));
        assert!(templates.multi.contains(PLACEHOLDER_CERT_DOMAIN));
        assert!(templates.multi.contains(PLACEHOLDER_ALT_DOMAINS));
    }

    #[test]
    fn test_load_from_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"staging_dir": "/srv/tls", "probe_timeout_secs": 10}"#,
        )
        .unwrap();

        let config = StagingConfig::load(&path).unwrap();
        assert_eq!(config.staging_dir, PathBuf::from("/srv/tls"));
        assert_eq!(config.probe_timeout_secs, 10);
        // Unspecified sections fall back to defaults.
        assert_eq!(config.key.bits, 2048);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            StagingConfig::load(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
