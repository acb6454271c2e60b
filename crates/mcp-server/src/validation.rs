// crates/mcp-server/src/validation.rs
// ============================================================================
// Module: Schema Validation
// Description: Per-method and per-tool JSON Schema validation of `params`.
// Purpose: Reject malformed `params` before a handler ever sees them (§4.9).
// Dependencies: jsonschema, serde_json
// ============================================================================

//! ## Overview
//! The [`Validator`] owns a registry of `method → compiled schema`. The
//! router validates raw `params` against the schema for the resolved method
//! before dispatch. [`Validator::validate_against`] lets a tool's own
//! `inputSchema` be checked through the same machinery, so
//! [`crate::registry::tools::ValidatedToolWrapper`] does not need its own
//! compiler.

use std::collections::HashMap;
use std::sync::RwLock;

use jsonschema::Validator as CompiledSchema;
use serde_json::Value;

/// One schema validation failure.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// JSON Pointer to the offending location, empty string for the root.
    pub path: String,
    /// Human-readable description of the violation.
    pub message: String,
}

/// Validation mode controlling how [`Validator::check`] treats failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Any validation error prevents dispatch.
    Strict,
    /// Validation errors are returned to the caller but do not, by
    /// themselves, stop the router; permissive deployments may choose to
    /// log and proceed.
    Lenient,
}

/// Registry of compiled JSON schemas keyed by method name.
///
/// # Invariants
/// - A schema, once registered, validates against JSON Schema draft
///   2020-12.
pub struct Validator {
    mode: ValidationMode,
    schemas: RwLock<HashMap<String, CompiledSchema>>,
}

impl Validator {
    /// Builds an empty validator in the given mode.
    #[must_use]
    pub fn new(mode: ValidationMode) -> Self {
        Self {
            mode,
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the validator's mode.
    #[must_use]
    pub const fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Compiles and registers a schema for `method`, replacing any prior
    /// registration.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaCompileError`] if `schema` is not a valid JSON Schema
    /// document.
    ///
    /// # Panics
    ///
    /// Never panics; a poisoned lock is treated as an internal error
    /// surfaced through the `Result`, not a panic.
    pub fn register(
        &self,
        method: impl Into<String>,
        schema: &Value,
    ) -> Result<(), SchemaCompileError> {
        let compiled =
            jsonschema::validator_for(schema).map_err(|err| SchemaCompileError(err.to_string()))?;
        let mut schemas = self.schemas.write().map_err(|_| {
            SchemaCompileError("validator registry lock poisoned".to_string())
        })?;
        schemas.insert(method.into(), compiled);
        Ok(())
    }

    /// Validates `params` against the schema registered for `method`.
    ///
    /// Returns an empty list when no schema is registered for `method`:
    /// absence of a schema means the method accepts any shape.
    #[must_use]
    pub fn check(&self, method: &str, params: &Value) -> Vec<ValidationIssue> {
        let Ok(schemas) = self.schemas.read() else {
            return vec![ValidationIssue {
                path: String::new(),
                message: "validator registry lock poisoned".to_string(),
            }];
        };
        let Some(schema) = schemas.get(method) else {
            return Vec::new();
        };
        Self::validate_against(schema, params)
    }

    /// Validates `params` against the tool's declared `inputSchema`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaCompileError`] if `input_schema` does not compile.
    pub fn validate_ad_hoc(
        input_schema: &Value,
        params: &Value,
    ) -> Result<Vec<ValidationIssue>, SchemaCompileError> {
        let compiled = jsonschema::validator_for(input_schema)
            .map_err(|err| SchemaCompileError(err.to_string()))?;
        Ok(Self::validate_against(&compiled, params))
    }

    fn validate_against(schema: &CompiledSchema, params: &Value) -> Vec<ValidationIssue> {
        schema
            .iter_errors(params)
            .map(|err| ValidationIssue {
                path: err.instance_path().to_string(),
                message: err.to_string(),
            })
            .collect()
    }
}

/// A schema document failed to compile.
#[derive(Debug, Clone, thiserror::Error)]
#[error("schema compile error: {0}")]
pub struct SchemaCompileError(pub String);

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        clippy::dbg_macro,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only framing assertions."
    )]

    use super::*;

    #[test]
    fn accepts_valid_params() {
        let validator = Validator::new(ValidationMode::Strict);
        validator
            .register(
                "tools/call",
                &serde_json::json!({
                    "type": "object",
                    "required": ["name"],
                    "properties": { "name": { "type": "string" } }
                }),
            )
            .expect("schema compiles");
        let issues = validator.check("tools/call", &serde_json::json!({"name": "echo"}));
        assert!(issues.is_empty());
    }

    #[test]
    fn reports_issues_for_invalid_params() {
        let validator = Validator::new(ValidationMode::Strict);
        validator
            .register(
                "tools/call",
                &serde_json::json!({
                    "type": "object",
                    "required": ["name"],
                }),
            )
            .expect("schema compiles");
        let issues = validator.check("tools/call", &serde_json::json!({}));
        assert!(!issues.is_empty());
    }

    #[test]
    fn unregistered_method_has_no_schema_and_passes() {
        let validator = Validator::new(ValidationMode::Strict);
        let issues = validator.check("unknown/method", &serde_json::json!(null));
        assert!(issues.is_empty());
    }
}
