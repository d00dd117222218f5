//! Plugin validation: metadata, configuration schemas and a security scan.
//!
//! The [`Validator`] runs before a plugin is admitted to the registry.
//! Errors and blocking security findings reject the plugin; everything
//! else is logged and returned in a [`ValidationReport`].

mod report;
mod schema;
mod security;
mod validator;

pub use report::{ValidationIssue, ValidationReport};
pub use schema::{ConfigSchema, SchemaType, SchemaViolation};
pub use security::{SecurityIssue, SecurityScanner, Severity};
pub use validator::{
    DEFAULT_MAX_CAPABILITIES, DEFAULT_MAX_PLUGIN_SIZE, HOST_VERSION, Validator, ValidatorConfig,
    version_satisfies,
};
