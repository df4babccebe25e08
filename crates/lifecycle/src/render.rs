//! Server-block fragment rendering and merging
//!
//! Renders an nginx server-block fragment for a certificate (single- or
//! multi-domain template, chosen by the alt names remaining after the CN
//! is excluded) and merges it into the aggregate generated config file.
//! Each domain owns at most one fragment in the aggregate, demarcated by
//! BEGIN/END marker comments keyed to the domain; re-merging excises the
//! previous fragment first, so the operation is idempotent.

use std::collections::BTreeSet;

use chrono::Utc;
use regex::Regex;
use tracing::debug;

use certstage_config::{
    ConfigTemplates, StagingConfig, PLACEHOLDER_ALT_DOMAINS, PLACEHOLDER_CERT_DOMAIN,
    PLACEHOLDER_CREATOR, PLACEHOLDER_GENERATED,
};

use crate::domain::Domain;
use crate::error::RenderError;

/// Marker line opening a domain's fragment in the aggregate file
pub fn begin_marker(domain: &str) -> String {
    format!("# BEGIN generated server block for {}", domain)
}

/// Marker line closing a domain's fragment in the aggregate file
pub fn end_marker(domain: &str) -> String {
    format!("# END generated server block for {}", domain)
}

/// Renders marker-wrapped server-block fragments from the configured templates
pub struct ConfigRenderer {
    templates: ConfigTemplates,
}

impl ConfigRenderer {
    pub fn new(config: &StagingConfig) -> Self {
        Self {
            templates: config.templates.clone(),
        }
    }

    /// Render the fragment for a certificate.
    ///
    /// `names` is the full set of domains the certificate covers, CN
    /// included. The single-domain template is used when nothing remains
    /// after excluding the CN; otherwise the multi-domain template gets the
    /// space-joined remainder as `alt_domains`. An empty name set means the
    /// certificate is malformed and the upload must be rejected.
    pub fn render(
        &self,
        cn: &Domain,
        names: &BTreeSet<String>,
        creator: &str,
    ) -> Result<String, RenderError> {
        if names.is_empty() {
            return Err(RenderError::NoAltNames);
        }

        let alt_domains: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|name| *name != cn.as_str())
            .collect();

        let body = if alt_domains.is_empty() {
            debug!(domain = %cn, "Rendering single-domain server block");
            self.templates
                .single
                .replace(PLACEHOLDER_CERT_DOMAIN, cn.as_str())
        } else {
            debug!(
                domain = %cn,
                alt_domains = alt_domains.len(),
                "Rendering multi-domain server block"
            );
            self.templates
                .multi
                .replace(PLACEHOLDER_CERT_DOMAIN, cn.as_str())
                .replace(PLACEHOLDER_ALT_DOMAINS, &alt_domains.join(" "))
        };

        let body = body
            .replace(
                PLACEHOLDER_GENERATED,
                &Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            )
            .replace(PLACEHOLDER_CREATOR, creator);

        let mut fragment = String::new();
        fragment.push_str(&begin_marker(cn.as_str()));
        fragment.push('\n');
        fragment.push_str(body.trim_end());
        fragment.push('\n');
        fragment.push_str(&end_marker(cn.as_str()));
        fragment.push('\n');
        Ok(fragment)
    }
}

/// Merge a domain's fragment into the aggregate config text.
///
/// Any existing fragment for the domain is excised first (matched by its
/// marker pair), then the new fragment is appended with a trailing newline.
/// Fragments for other domains are left untouched.
pub fn merge_fragment(aggregate: &str, domain: &str, fragment: &str) -> String {
    let pattern = format!(
        r"(?ms)^# BEGIN generated server block for {escaped}$.*?^# END generated server block for {escaped}$\n?",
        escaped = regex::escape(domain)
    );

    // The domain is regex-escaped, so compilation only fails if the
    // surrounding pattern itself is broken; fall back to plain append.
    let mut merged = match Regex::new(&pattern) {
        Ok(re) => re.replace(aggregate, "").into_owned(),
        Err(_) => aggregate.to_string(),
    };

    while merged.ends_with('\n') {
        merged.pop();
    }
    if !merged.is_empty() {
        merged.push('\n');
    }
    merged.push_str(fragment.trim_end());
    merged.push('\n');
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> ConfigRenderer {
        ConfigRenderer::new(&StagingConfig::default())
    }

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_template_when_only_cn() {
        let cn = Domain::parse("a.example.edu").unwrap();
        let fragment = renderer()
            .render(&cn, &names(&["a.example.edu"]), "operator")
            .unwrap();

        assert!(fragment.starts_with("# BEGIN generated server block for a.example.edu\n"));
        assert!(fragment.ends_with("# END generated server block for a.example.edu\n"));
        assert!(fragment.contains("server_name a.example.edu;"));
        assert!(fragment.contains("by operator"));
        // No leftover placeholders.
        assert!(!fragment.contains("<%"));
    }

    #[test]
    fn test_multi_template_when_alt_names_remain() {
        let cn = Domain::parse("a.example.edu").unwrap();
        let fragment = renderer()
            .render(&cn, &names(&["a.example.edu", "b.example.edu"]), "operator")
            .unwrap();

        assert!(fragment.contains("server_name a.example.edu b.example.edu;"));
    }

    #[test]
    fn test_alt_domains_exclude_cn_and_join_with_spaces() {
        let cn = Domain::parse("a.example.edu").unwrap();
        let fragment = renderer()
            .render(
                &cn,
                &names(&["a.example.edu", "b.example.edu", "c.example.edu"]),
                "operator",
            )
            .unwrap();

        assert!(fragment.contains("server_name a.example.edu b.example.edu c.example.edu;"));
    }

    #[test]
    fn test_empty_name_set_is_fatal() {
        let cn = Domain::parse("a.example.edu").unwrap();
        let result = renderer().render(&cn, &BTreeSet::new(), "operator");

        assert!(matches!(result, Err(RenderError::NoAltNames)));
    }

    #[test]
    fn test_merge_into_empty_aggregate() {
        let fragment = "# BEGIN generated server block for a.example.edu\nserver {}\n# END generated server block for a.example.edu\n";

        let merged = merge_fragment("", "a.example.edu", fragment);
        assert_eq!(merged, fragment);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let fragment = "# BEGIN generated server block for a.example.edu\nserver {}\n# END generated server block for a.example.edu\n";

        let once = merge_fragment("", "a.example.edu", fragment);
        let twice = merge_fragment(&once, "a.example.edu", fragment);

        assert_eq!(once, twice);
        assert_eq!(twice.matches("# BEGIN").count(), 1);
    }

    #[test]
    fn test_merge_replaces_only_the_matching_domain() {
        let a = "# BEGIN generated server block for a.example.edu\nserver { old }\n# END generated server block for a.example.edu\n";
        let b = "# BEGIN generated server block for b.example.edu\nserver {}\n# END generated server block for b.example.edu\n";
        let aggregate = merge_fragment(&merge_fragment("", "a.example.edu", a), "b.example.edu", b);

        let a_new = "# BEGIN generated server block for a.example.edu\nserver { new }\n# END generated server block for a.example.edu\n";
        let merged = merge_fragment(&aggregate, "a.example.edu", a_new);

        assert!(!merged.contains("old"));
        assert!(merged.contains("new"));
        assert!(merged.contains("for b.example.edu"));
        assert_eq!(merged.matches("# BEGIN").count(), 2);
    }

    #[test]
    fn test_merge_does_not_match_domain_prefixes() {
        // "a.example.edu" must not excise "aaa.example.edu".
        let long = "# BEGIN generated server block for aaa.example.edu\nserver {}\n# END generated server block for aaa.example.edu\n";
        let aggregate = merge_fragment("", "aaa.example.edu", long);

        let short = "# BEGIN generated server block for a.example.edu\nserver {}\n# END generated server block for a.example.edu\n";
        let merged = merge_fragment(&aggregate, "a.example.edu", short);

        assert!(merged.contains("for aaa.example.edu"));
        assert_eq!(merged.matches("# BEGIN").count(), 2);
    }

    #[test]
    fn test_render_then_merge_twice_keeps_one_block() {
        let cn = Domain::parse("a.example.edu").unwrap();
        let renderer = renderer();
        let name_set = names(&["a.example.edu"]);

        let first = renderer.render(&cn, &name_set, "operator").unwrap();
        let aggregate = merge_fragment("", "a.example.edu", &first);

        let second = renderer.render(&cn, &name_set, "operator").unwrap();
        let merged = merge_fragment(&aggregate, "a.example.edu", &second);

        assert_eq!(merged.matches("# BEGIN").count(), 1);
        assert_eq!(merged.matches("# END").count(), 1);
    }
}
