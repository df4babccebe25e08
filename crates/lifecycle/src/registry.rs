//! Platform site registry integration
//!
//! The lifecycle pipeline runs inside a larger multi-tenant web platform
//! that owns the authoritative site records. Everything the pipeline needs
//! from that platform (pending-TLS flags, domain-to-site lookups, cache
//! invalidation) sits behind [`SiteRegistry`], so the host wires in its
//! own backend and tests run against [`MemoryRegistry`].

use std::collections::BTreeSet;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A site known to the platform registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRef {
    pub site_id: u64,
    pub domain: String,
    pub path: String,
}

/// Host-platform operations the lifecycle pipeline depends on
pub trait SiteRegistry: Send + Sync {
    /// Whether another site already serves this domain.
    ///
    /// When true, a newly created site inherits the existing TLS state and
    /// no new CSR is generated for it.
    fn domain_assigned_elsewhere(&self, domain: &str, site_id: u64) -> bool;

    /// Flag a domain as awaiting TLS configuration.
    fn set_tls_pending(&self, domain: &str);

    /// Clear a domain's pending-TLS flag.
    ///
    /// Returns false if the flag was not set, which callers treat as a
    /// failed confirmation.
    fn clear_tls_pending(&self, domain: &str) -> bool;

    /// All domains currently flagged as awaiting TLS.
    fn tls_pending_domains(&self) -> Vec<String>;

    /// Every site served under a domain (a domain may host several paths).
    fn find_sites_by_domain(&self, domain: &str) -> Vec<SiteRef>;

    /// Drop cached state for a site after its TLS status changed.
    fn invalidate_site_cache(&self, site: &SiteRef);
}

#[derive(Default)]
struct Inner {
    sites: Vec<SiteRef>,
    pending: BTreeSet<String>,
    invalidations: Vec<String>,
}

/// In-memory registry used in tests and single-process embeddings
#[derive(Default)]
pub struct MemoryRegistry {
    inner: RwLock<Inner>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_site(&self, site_id: u64, domain: &str, path: &str) {
        self.inner.write().sites.push(SiteRef {
            site_id,
            domain: domain.to_string(),
            path: path.to_string(),
        });
    }

    pub fn is_pending(&self, domain: &str) -> bool {
        self.inner.read().pending.contains(domain)
    }

    /// Cache keys invalidated so far, in order.
    pub fn invalidations(&self) -> Vec<String> {
        self.inner.read().invalidations.clone()
    }
}

impl SiteRegistry for MemoryRegistry {
    fn domain_assigned_elsewhere(&self, domain: &str, site_id: u64) -> bool {
        self.inner
            .read()
            .sites
            .iter()
            .any(|s| s.domain == domain && s.site_id != site_id)
    }

    fn set_tls_pending(&self, domain: &str) {
        self.inner.write().pending.insert(domain.to_string());
    }

    fn clear_tls_pending(&self, domain: &str) -> bool {
        self.inner.write().pending.remove(domain)
    }

    fn tls_pending_domains(&self) -> Vec<String> {
        self.inner.read().pending.iter().cloned().collect()
    }

    fn find_sites_by_domain(&self, domain: &str) -> Vec<SiteRef> {
        self.inner
            .read()
            .sites
            .iter()
            .filter(|s| s.domain == domain)
            .cloned()
            .collect()
    }

    fn invalidate_site_cache(&self, site: &SiteRef) {
        self.inner
            .write()
            .invalidations
            .push(format!("{}{}", site.domain, site.path));
    }
}
