//! Configuration validation
//!
//! Startup checks for the staging tree, the intermediate certificate, and
//! the server-block templates. Validation never mutates the filesystem; it
//! reports errors (configuration that cannot work) and warnings (likely
//! mistakes) separately so the embedding system decides what is fatal.

mod layout;
mod templates;

pub use layout::validate_layout;
pub use templates::lint_templates;

use crate::StagingConfig;

/// Category of a validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Staging directory layout problems
    Layout,
    /// Intermediate certificate problems
    Certificate,
    /// Template problems
    Template,
    /// Upload policy problems
    Policy,
}

/// A fatal configuration problem
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ValidationError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

/// A non-fatal configuration concern
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Accumulated validation outcome
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// True when no errors were recorded (warnings are allowed)
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fold another result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Run all validation passes over a configuration
pub fn validate_config(config: &StagingConfig) -> ValidationResult {
    let mut result = validate_layout(config);
    result.merge(lint_templates(config));
    result
}
