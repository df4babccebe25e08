//! Domain name validation
//!
//! The allowed character class is `[A-Za-z0-9.-]`. This is deliberately
//! permissive: no length limits and no DNS label structure checks, since
//! operators sometimes stage internal hostnames that would fail stricter
//! rules. Anything passing validation is safe to use as a filesystem path
//! component and as a certificate common name.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static DOMAIN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9.-]+$").expect("domain pattern is valid"));

/// Check a domain string against the allowed character class.
///
/// Returns true iff the string is non-empty and every character is an
/// ASCII letter, digit, `-`, or `.`.
pub fn is_valid_domain(domain: &str) -> bool {
    DOMAIN_PATTERN.is_match(domain)
}

/// Domain validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Domain is empty")]
    Empty,

    #[error("Domain contains characters outside [A-Za-z0-9.-]: '{0}'")]
    InvalidCharacters(String),
}

/// A validated, lowercased hostname.
///
/// `Domain` is the only currency accepted by the pipeline components;
/// constructing one via [`Domain::parse`] is the single place raw strings
/// are checked and normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Domain(String);

impl Domain {
    /// Validate and normalize a raw domain string.
    ///
    /// Surrounding whitespace is trimmed and the result is lowercased
    /// before use as a path component or CSR common name.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::Empty);
        }
        if !is_valid_domain(trimmed) {
            return Err(DomainError::InvalidCharacters(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
