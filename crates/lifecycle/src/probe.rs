//! HTTPS liveness probing
//!
//! After deployment an operator wants to know whether a domain actually
//! answers over HTTPS before confirming it. The probe is advisory only: no
//! outcome blocks any pipeline transition.

use std::time::Duration;

use tracing::debug;

use certstage_config::StagingConfig;

/// Result of probing a domain over HTTPS
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    /// TLS/TCP connection could not be established
    ConnectFailed(String),
    /// Connected, but the response carried no headers
    EmptyHeaders,
    /// Connected and got a response
    Responding { status: u16 },
}

/// A liveness check against `https://{domain}/`
pub trait TlsProbe: Send + Sync {
    fn probe(&self, domain: &str) -> ProbeOutcome;
}

/// Probe backed by a blocking HTTPS client
pub struct HttpsProbe {
    timeout: Duration,
}

impl HttpsProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn from_config(config: &StagingConfig) -> Self {
        Self::new(Duration::from_secs(config.probe_timeout_secs))
    }
}

impl TlsProbe for HttpsProbe {
    fn probe(&self, domain: &str) -> ProbeOutcome {
        let client = match reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
        {
            Ok(client) => client,
            Err(e) => return ProbeOutcome::ConnectFailed(e.to_string()),
        };

        debug!(domain = %domain, "Probing domain over HTTPS");
        match client.get(format!("https://{}/", domain)).send() {
            Err(e) => ProbeOutcome::ConnectFailed(e.to_string()),
            // A response reqwest parses always carries headers, so this
            // arm is dormant here; EmptyHeaders exists for TlsProbe
            // implementations with rawer transports.
            Ok(response) if response.headers().is_empty() => ProbeOutcome::EmptyHeaders,
            Ok(response) => ProbeOutcome::Responding {
                status: response.status().as_u16(),
            },
        }
    }
}
