//! Pre-registration gate.

use std::sync::OnceLock;

use regex::Regex;
use semver::{Version, VersionReq};
use serde_json::json;

use super::report::{ValidationIssue, ValidationReport};
use super::schema::ConfigSchema;
use super::security::{SecurityScanner, Severity};
use crate::plugin::{
    ErrorCode, Plugin, PluginConfig, PluginDependency, PluginError, PluginErrorKind,
    PluginMetadata, PluginResult,
};

pub const DEFAULT_MAX_PLUGIN_SIZE: usize = 1024 * 1024;
pub const DEFAULT_MAX_CAPABILITIES: usize = 5;
const SIZE_WARNING_RATIO: f64 = 0.8;

/// Version of this library, compared against plugin host-version bounds.
pub const HOST_VERSION: &str = env!("CARGO_PKG_VERSION");

fn id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid plugin id regex"))
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Promotes missing author/license/description to errors and makes
    /// high-severity security findings blocking.
    pub strict: bool,
    pub allow_unsigned: bool,
    pub max_plugin_size: usize,
    pub max_capabilities: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            strict: false,
            allow_unsigned: false,
            max_plugin_size: DEFAULT_MAX_PLUGIN_SIZE,
            max_capabilities: DEFAULT_MAX_CAPABILITIES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidatorConfig,
    scanner: SecurityScanner,
    host_version: Option<Version>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::with_config(ValidatorConfig::default())
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        let scanner = SecurityScanner::new(config.max_capabilities, config.allow_unsigned);
        Self {
            config,
            scanner,
            host_version: Version::parse(HOST_VERSION).ok(),
        }
    }

    /// Overrides the host version checked against `min/max_host_version`.
    pub fn with_host_version(mut self, version: Version) -> Self {
        self.host_version = Some(version);
        self
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Runs every check and fails if any of them blocks registration.
    ///
    /// Non-blocking findings are logged and returned in the report.
    pub fn validate_plugin(
        &self,
        plugin: &dyn Plugin,
        config: &PluginConfig,
    ) -> PluginResult<ValidationReport> {
        let metadata = plugin.metadata();
        let schema = plugin.config_schema();
        let mut report = ValidationReport::default();

        self.check_metadata(metadata, &mut report);
        if let Some(schema) = &schema {
            self.check_schema(schema, config, &mut report);
        }
        self.check_dependencies(metadata, &mut report);

        let manifest = json!({
            "metadata": metadata,
            "config": config,
            "schema": schema,
        })
        .to_string();

        report.security_issues = self.scanner.scan(
            &manifest,
            &metadata.capabilities,
            metadata.signature.is_some(),
        );
        self.check_size(manifest.len(), &mut report);
        self.check_recommended_fields(metadata, &mut report);

        self.decide(metadata, report)
    }

    /// Checks a candidate configuration against a schema.
    pub fn validate_config(
        &self,
        plugin_id: &str,
        schema: &ConfigSchema,
        config: &PluginConfig,
    ) -> PluginResult<()> {
        let violations = schema.validate(&config.to_value());
        if violations.is_empty() {
            return Ok(());
        }
        let messages: Vec<String> = violations.iter().map(ToString::to_string).collect();
        Err(PluginError::validation(
            plugin_id,
            format!("configuration rejected by schema: {}", messages.join("; ")),
        )
        .with_context(json!({ "errors": messages })))
    }

    fn check_metadata(&self, metadata: &PluginMetadata, report: &mut ValidationReport) {
        if metadata.id.is_empty() {
            report.error("id", "plugin id is required");
        } else if !id_pattern().is_match(&metadata.id) {
            report.error(
                "id",
                format!(
                    "plugin id '{}' may only contain letters, digits, '.', '_' and '-'",
                    metadata.id
                ),
            );
        }

        if metadata.name.trim().is_empty() {
            report.error("name", "plugin name is required");
        }

        if metadata.version.trim().is_empty() {
            report.error("version", "plugin version is required");
        } else if let Err(e) = Version::parse(&metadata.version) {
            report.error(
                "version",
                format!("'{}' is not a semantic version: {}", metadata.version, e),
            );
        }

        for (field, value) in [
            ("min_host_version", &metadata.min_host_version),
            ("max_host_version", &metadata.max_host_version),
        ] {
            if let Some(value) = value
                && let Err(e) = Version::parse(value)
            {
                report.error(field, format!("'{}' is not a semantic version: {}", value, e));
            }
        }
    }

    fn check_schema(
        &self,
        schema: &ConfigSchema,
        config: &PluginConfig,
        report: &mut ValidationReport,
    ) {
        if !schema.is_object_root() {
            report.error("config_schema", "config schema root must be of type object");
            return;
        }
        for violation in schema.validate(&config.to_value()) {
            report.error(
                format!("config{}", violation.path.trim_start_matches('$')),
                violation.message,
            );
        }
    }

    fn check_dependencies(&self, metadata: &PluginMetadata, report: &mut ValidationReport) {
        let declared = metadata
            .dependencies
            .iter()
            .map(|d| ("dependencies", d))
            .chain(metadata.peer_dependencies.iter().map(|d| ("peer_dependencies", d)));

        for (field, dependency) in declared {
            self.check_dependency(&metadata.id, field, dependency, report);
        }
    }

    fn check_dependency(
        &self,
        plugin_id: &str,
        field: &str,
        dependency: &PluginDependency,
        report: &mut ValidationReport,
    ) {
        if dependency.id.trim().is_empty() {
            report.error(field, "dependency id is required");
            return;
        }
        if dependency.id == plugin_id {
            report.error(field, format!("plugin '{}' cannot depend on itself", plugin_id));
        }
        if dependency.version.trim().is_empty() {
            report.error(
                field,
                format!("dependency '{}' has no version constraint", dependency.id),
            );
        } else if let Err(e) = VersionReq::parse(&dependency.version) {
            report.error(
                field,
                format!(
                    "dependency '{}' has invalid version constraint '{}': {}",
                    dependency.id, dependency.version, e
                ),
            );
        }
    }

    fn check_size(&self, size: usize, report: &mut ValidationReport) {
        let max = self.config.max_plugin_size;
        if size > max {
            report.error(
                "size",
                format!("serialized plugin is {} bytes, limit is {} bytes", size, max),
            );
        } else if size as f64 >= max as f64 * SIZE_WARNING_RATIO {
            report.warning(
                "size",
                format!("serialized plugin is {} bytes, close to the {} byte limit", size, max),
            );
        }
    }

    fn check_recommended_fields(&self, metadata: &PluginMetadata, report: &mut ValidationReport) {
        for (field, value) in [
            ("author", &metadata.author),
            ("license", &metadata.license),
            ("description", &metadata.description),
        ] {
            if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
                let message = format!("plugin should declare {}", field);
                if self.config.strict {
                    report.error(field, message);
                } else {
                    report.warning(field, message);
                }
            }
        }
    }

    /// Host-version bounds, checked only once the metadata itself is valid.
    fn check_host_compatibility(&self, metadata: &PluginMetadata) -> PluginResult<()> {
        let Some(host) = &self.host_version else {
            return Ok(());
        };

        let min = metadata
            .min_host_version
            .as_deref()
            .and_then(|v| Version::parse(v).ok());
        let max = metadata
            .max_host_version
            .as_deref()
            .and_then(|v| Version::parse(v).ok());

        let too_old = min.as_ref().is_some_and(|min| host < min);
        let too_new = max.as_ref().is_some_and(|max| host > max);
        if too_old || too_new {
            return Err(PluginError::new(
                PluginErrorKind::Compatibility,
                &metadata.id,
                ErrorCode::HostIncompatible,
                format!(
                    "host version {} is outside the supported range [{}, {}]",
                    host,
                    metadata.min_host_version.as_deref().unwrap_or("*"),
                    metadata.max_host_version.as_deref().unwrap_or("*"),
                ),
            ));
        }
        Ok(())
    }

    fn decide(
        &self,
        metadata: &PluginMetadata,
        report: ValidationReport,
    ) -> PluginResult<ValidationReport> {
        let id = metadata.id.as_str();

        if !report.errors.is_empty() {
            let messages: Vec<String> = report.errors.iter().map(ToString::to_string).collect();
            return Err(PluginError::validation(
                id,
                format!("plugin validation failed: {}", messages.join("; ")),
            )
            .with_context(json!({
                "errors": report.errors,
                "warnings": report.warnings,
            })));
        }

        let blocking_severity = if self.config.strict {
            Severity::High
        } else {
            Severity::Critical
        };
        let blocking: Vec<_> = report
            .security_issues
            .iter()
            .filter(|issue| issue.severity >= blocking_severity)
            .collect();
        if !blocking.is_empty() {
            let messages: Vec<&str> = blocking.iter().map(|i| i.message.as_str()).collect();
            return Err(PluginError::security(
                id,
                format!("security check failed: {}", messages.join("; ")),
            )
            .with_context(json!({ "issues": blocking })));
        }

        self.check_host_compatibility(metadata)?;

        for warning in &report.warnings {
            tracing::warn!(plugin = %id, field = %warning.field, "{}", warning.message);
        }
        for issue in &report.security_issues {
            tracing::warn!(
                plugin = %id,
                severity = %issue.severity,
                category = %issue.category,
                "{}",
                issue.message
            );
        }

        Ok(report)
    }
}

/// Whether `version` satisfies the semver `constraint`.
pub fn version_satisfies(constraint: &str, version: &str) -> bool {
    match (VersionReq::parse(constraint), Version::parse(version)) {
        (Ok(req), Ok(version)) => req.matches(&version),
        _ => false,
    }
}

impl ValidationReport {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue::new(field, message));
    }

    fn warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue::new(field, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{Capabilities, PluginMetadata};
    use async_trait::async_trait;

    struct Candidate {
        metadata: PluginMetadata,
        schema: Option<ConfigSchema>,
    }

    #[async_trait]
    impl Plugin for Candidate {
        fn metadata(&self) -> &PluginMetadata {
            &self.metadata
        }

        fn config_schema(&self) -> Option<ConfigSchema> {
            self.schema.clone()
        }
    }

    fn complete(id: &str) -> PluginMetadata {
        PluginMetadata::new(id, "Candidate", "1.0.0")
            .with_author("Plugwire Team")
            .with_license("MIT")
            .with_description("test plugin")
    }

    fn candidate(metadata: PluginMetadata) -> Candidate {
        Candidate {
            metadata,
            schema: None,
        }
    }

    fn validate(validator: &Validator, plugin: &Candidate) -> PluginResult<ValidationReport> {
        validator.validate_plugin(plugin, &PluginConfig::default())
    }

    #[test]
    fn test_valid_plugin_passes() {
        let signed = complete("auth").with_signature("sha256:3f1c");
        let report = validate(&Validator::new(), &candidate(signed)).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn test_unsigned_plugin_flagged_by_default() {
        let report = validate(&Validator::new(), &candidate(complete("auth"))).unwrap();
        assert!(report.errors.is_empty());
        assert_eq!(report.security_issues.len(), 1);
        assert_eq!(report.security_issues[0].category, "unsigned");
        assert_eq!(report.security_issues[0].severity, Severity::Low);

        let strict = Validator::with_config(ValidatorConfig {
            strict: true,
            ..ValidatorConfig::default()
        });
        assert!(validate(&strict, &candidate(complete("auth"))).is_ok());

        let permissive = Validator::with_config(ValidatorConfig {
            allow_unsigned: true,
            ..ValidatorConfig::default()
        });
        let report = validate(&permissive, &candidate(complete("auth"))).unwrap();
        assert!(report.security_issues.is_empty());
    }

    #[test]
    fn test_bad_id_rejected() {
        for id in ["", "has space", "slash/id", "semi;colon"] {
            let err = validate(&Validator::new(), &candidate(complete(id))).unwrap_err();
            assert_eq!(err.code, ErrorCode::ValidationFailed, "id {:?}", id);
            assert_eq!(err.kind, PluginErrorKind::Validation);
        }
    }

    #[test]
    fn test_errors_are_aggregated() {
        let metadata = PluginMetadata::new("x", "", "one")
            .with_dependency(PluginDependency::required("", "^1"))
            .with_dependency(PluginDependency::required("x", "^1"));
        let err = validate(&Validator::new(), &candidate(metadata)).unwrap_err();

        let errors = err.context.unwrap()["errors"].as_array().unwrap().len();
        assert_eq!(errors, 4);
    }

    #[test]
    fn test_invalid_dependency_constraint() {
        let metadata =
            complete("a").with_peer_dependency(PluginDependency::required("b", "not-a-range"));
        let err = validate(&Validator::new(), &candidate(metadata)).unwrap_err();
        assert!(err.message.contains("invalid version constraint"));
    }

    #[test]
    fn test_schema_root_must_be_object() {
        let plugin = Candidate {
            metadata: complete("a"),
            schema: Some(ConfigSchema::string()),
        };
        let err = validate(&Validator::new(), &plugin).unwrap_err();
        assert!(err.message.contains("root must be of type object"));
    }

    #[test]
    fn test_config_checked_against_schema() {
        let plugin = Candidate {
            metadata: complete("a"),
            schema: Some(ConfigSchema::object().require("token")),
        };
        let validator = Validator::new();
        assert!(validator.validate_plugin(&plugin, &PluginConfig::default()).is_err());
        assert!(
            validator
                .validate_plugin(&plugin, &PluginConfig::new().with("token", "t"))
                .is_ok()
        );
    }

    #[test]
    fn test_critical_security_always_blocks() {
        let metadata = complete("a").with_description("runs eval(input)");
        let err = validate(&Validator::new(), &candidate(metadata)).unwrap_err();
        assert_eq!(err.code, ErrorCode::SecurityViolation);
        assert_eq!(err.kind, PluginErrorKind::Permission);
    }

    #[test]
    fn test_high_security_blocks_only_in_strict_mode() {
        let metadata = complete("a").with_description("touches __proto__");

        let report = validate(&Validator::new(), &candidate(metadata.clone())).unwrap();
        assert_eq!(report.security_issues[0].severity, Severity::High);

        let strict = Validator::with_config(ValidatorConfig {
            strict: true,
            ..ValidatorConfig::default()
        });
        let err = validate(&strict, &candidate(metadata)).unwrap_err();
        assert_eq!(err.code, ErrorCode::SecurityViolation);
    }

    #[test]
    fn test_strict_mode_requires_recommended_fields() {
        let bare = PluginMetadata::new("a", "A", "1.0.0");
        let report = validate(&Validator::new(), &candidate(bare.clone())).unwrap();
        assert_eq!(report.warnings.len(), 3);

        let strict = Validator::with_config(ValidatorConfig {
            strict: true,
            ..ValidatorConfig::default()
        });
        let err = validate(&strict, &candidate(bare)).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[test]
    fn test_size_limits() {
        let tiny = Validator::with_config(ValidatorConfig {
            max_plugin_size: 64,
            ..ValidatorConfig::default()
        });
        let err = validate(&tiny, &candidate(complete("a"))).unwrap_err();
        assert!(err.message.contains("limit is 64 bytes"));

        let manifest_len = {
            let meta = complete("a");
            json!({"metadata": meta, "config": PluginConfig::default(), "schema": null})
                .to_string()
                .len()
        };
        let near = Validator::with_config(ValidatorConfig {
            max_plugin_size: manifest_len + 1,
            ..ValidatorConfig::default()
        });
        let report = validate(&near, &candidate(complete("a"))).unwrap();
        assert_eq!(report.warnings[0].field, "size");
    }

    #[test]
    fn test_excessive_capabilities_warn_only() {
        let caps = Capabilities {
            modify_request: true,
            modify_response: true,
            handle_errors: true,
            cache_responses: true,
            retry_requests: true,
            network_access: true,
            storage_access: true,
            read_credentials: true,
        };
        let report =
            validate(&Validator::new(), &candidate(complete("a").with_capabilities(caps))).unwrap();
        assert_eq!(report.security_issues[0].category, "excessive-permissions");
    }

    #[test]
    fn test_host_version_bounds() {
        let validator = Validator::new().with_host_version(Version::new(1, 4, 0));
        let old_host = complete("a").with_host_versions(Some("2.0.0"), None::<&str>);
        let err = validate(&validator, &candidate(old_host)).unwrap_err();
        assert_eq!(err.code, ErrorCode::HostIncompatible);
        assert_eq!(err.kind, PluginErrorKind::Compatibility);

        let in_range =
            complete("a").with_host_versions(Some("1.0.0"), Some("1.9.9"));
        assert!(validate(&validator, &candidate(in_range)).is_ok());

        let malformed = complete("a").with_host_versions(Some("1.x"), None::<&str>);
        let err = validate(&validator, &candidate(malformed)).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[test]
    fn test_version_satisfies() {
        assert!(version_satisfies("^1.2", "1.4.0"));
        assert!(!version_satisfies("^1.2", "2.0.0"));
        assert!(version_satisfies(">=0.3.0, <0.5.0", "0.4.1"));
        assert!(!version_satisfies("garbage", "1.0.0"));
    }
}
