//! Heuristic risk scan over a serialized plugin manifest.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::plugin::Capabilities;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityIssue {
    pub severity: Severity,
    pub category: String,
    pub message: String,
}

impl SecurityIssue {
    pub fn new(severity: Severity, category: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.to_string(),
            message: message.into(),
        }
    }
}

struct RiskPattern {
    regex: Regex,
    severity: Severity,
    category: &'static str,
    description: &'static str,
}

fn risk_patterns() -> &'static [RiskPattern] {
    static PATTERNS: OnceLock<Vec<RiskPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let table: [(&str, Severity, &'static str, &'static str); 5] = [
            (
                r"\beval\s*\(",
                Severity::Critical,
                "dynamic-code",
                "dynamic code evaluation (eval)",
            ),
            (
                r"\b(?:new\s+)?Function\s*\(",
                Severity::Critical,
                "dynamic-code",
                "dynamic code construction (Function constructor)",
            ),
            (
                r"__proto__|\bconstructor\s*\.\s*prototype\b|\bObject\s*\.\s*prototype\b",
                Severity::High,
                "prototype-pollution",
                "prototype pollution idiom",
            ),
            (
                r"\b(?:document|window)\s*\.",
                Severity::Medium,
                "dom-access",
                "DOM global access",
            ),
            (
                r"\b(?:localStorage|sessionStorage|indexedDB)\b|\bdocument\s*\.\s*cookie\b",
                Severity::Medium,
                "storage-access",
                "browser storage access",
            ),
        ];
        table
            .into_iter()
            .map(|(pattern, severity, category, description)| RiskPattern {
                regex: Regex::new(pattern).expect("valid risk pattern regex"),
                severity,
                category,
                description,
            })
            .collect()
    })
}

/// Scans manifests for risky idioms and capability overreach.
#[derive(Debug, Clone)]
pub struct SecurityScanner {
    max_capabilities: usize,
    allow_unsigned: bool,
}

impl SecurityScanner {
    pub fn new(max_capabilities: usize, allow_unsigned: bool) -> Self {
        Self {
            max_capabilities,
            allow_unsigned,
        }
    }

    /// Issues found, most severe first.
    pub fn scan(
        &self,
        manifest: &str,
        capabilities: &Capabilities,
        signed: bool,
    ) -> Vec<SecurityIssue> {
        let mut issues: Vec<SecurityIssue> = risk_patterns()
            .iter()
            .filter(|p| p.regex.is_match(manifest))
            .map(|p| {
                SecurityIssue::new(
                    p.severity,
                    p.category,
                    format!("manifest contains {}", p.description),
                )
            })
            .collect();

        let enabled = capabilities.enabled_count();
        if enabled > self.max_capabilities {
            issues.push(SecurityIssue::new(
                Severity::Medium,
                "excessive-permissions",
                format!(
                    "{} capabilities requested (threshold {}): {}",
                    enabled,
                    self.max_capabilities,
                    capabilities.enabled().join(", ")
                ),
            ));
        }

        if !signed && !self.allow_unsigned {
            issues.push(SecurityIssue::new(
                Severity::Low,
                "unsigned",
                "plugin is not signed",
            ));
        }

        issues.sort_by(|a, b| b.severity.cmp(&a.severity));
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> SecurityScanner {
        SecurityScanner::new(5, true)
    }

    #[test]
    fn test_clean_manifest() {
        let issues = scanner().scan(r#"{"id":"auth"}"#, &Capabilities::default(), true);
        assert!(issues.is_empty());
    }

    #[test]
    fn test_dynamic_code_is_critical() {
        let issues = scanner().scan(
            r#"{"description":"calls eval(payload)"}"#,
            &Capabilities::default(),
            true,
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);

        let issues = scanner().scan("new Function('x')", &Capabilities::default(), true);
        assert_eq!(issues[0].category, "dynamic-code");
    }

    #[test]
    fn test_prototype_pollution_is_high() {
        let issues = scanner().scan(r#"{"k":"a.__proto__.b"}"#, &Capabilities::default(), true);
        assert_eq!(issues[0].severity, Severity::High);
    }

    #[test]
    fn test_words_inside_identifiers_do_not_match() {
        let issues = scanner().scan(
            r#"{"name":"medieval(1)","note":"windowed.size"}"#,
            &Capabilities::default(),
            true,
        );
        assert!(issues.is_empty());
    }

    #[test]
    fn test_storage_and_dom_are_medium() {
        let issues = scanner().scan(
            "reads localStorage and window.location",
            &Capabilities::default(),
            true,
        );
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.severity == Severity::Medium));
    }

    #[test]
    fn test_excessive_capabilities() {
        let caps = Capabilities {
            modify_request: true,
            modify_response: true,
            handle_errors: true,
            cache_responses: true,
            retry_requests: true,
            network_access: true,
            ..Capabilities::default()
        };
        let issues = scanner().scan("{}", &caps, true);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, "excessive-permissions");
    }

    #[test]
    fn test_unsigned_flag() {
        let strict = SecurityScanner::new(5, false);
        let issues = strict.scan("{}", &Capabilities::default(), false);
        assert_eq!(issues[0].severity, Severity::Low);
        assert!(strict.scan("{}", &Capabilities::default(), true).is_empty());
    }

    #[test]
    fn test_sorted_by_severity() {
        let strict = SecurityScanner::new(5, false);
        let issues = strict.scan("localStorage eval(x)", &Capabilities::default(), false);
        let severities: Vec<Severity> = issues.iter().map(|i| i.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Critical, Severity::Medium, Severity::Low]
        );
    }
}
