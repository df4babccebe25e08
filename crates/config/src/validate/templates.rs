//! Template linting
//!
//! Checks that the configured server-block templates carry the placeholders
//! the renderer substitutes, and flags likely mistakes.

use super::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};
use crate::{
    StagingConfig, PLACEHOLDER_ALT_DOMAINS, PLACEHOLDER_CERT_DOMAIN, PLACEHOLDER_CREATOR,
    PLACEHOLDER_GENERATED,
};

/// Lint the single- and multi-domain templates
pub fn lint_templates(config: &StagingConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    for (name, template) in [
        ("single", config.templates.single.as_str()),
        ("multi", config.templates.multi.as_str()),
    ] {
        if !template.contains(PLACEHOLDER_CERT_DOMAIN) {
            result.add_error(ValidationError::new(
                ErrorCategory::Template,
                format!(
                    "The {} template never references {}",
                    name, PLACEHOLDER_CERT_DOMAIN
                ),
            ));
        }

        if !template.contains(PLACEHOLDER_GENERATED) || !template.contains(PLACEHOLDER_CREATOR) {
            result.add_warning(ValidationWarning::new(format!(
                "The {} template drops generation metadata ({} / {})",
                name, PLACEHOLDER_GENERATED, PLACEHOLDER_CREATOR
            )));
        }

        // The renderer wraps fragments in BEGIN/END markers itself; a
        // template carrying its own markers would break excision on merge.
        if template.contains("generated server block for") {
            result.add_error(ValidationError::new(
                ErrorCategory::Template,
                format!(
                    "The {} template contains fragment markers; these are added by the renderer",
                    name
                ),
            ));
        }
    }

    if !config.templates.multi.contains(PLACEHOLDER_ALT_DOMAINS) {
        result.add_error(ValidationError::new(
            ErrorCategory::Template,
            format!(
                "The multi template never references {}",
                PLACEHOLDER_ALT_DOMAINS
            ),
        ));
    }

    if config.templates.single.contains(PLACEHOLDER_ALT_DOMAINS) {
        result.add_warning(ValidationWarning::new(format!(
            "The single template references {}, which is always empty for single-domain certs",
            PLACEHOLDER_ALT_DOMAINS
        )));
    }

    result
}
