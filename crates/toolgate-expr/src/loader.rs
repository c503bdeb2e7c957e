//! Bundle loader: parse, schema-validate, and precompile a YAML contract
//! bundle (§4.6.3).
//!
//! The six-step pipeline is grounded verbatim on
//! `original_source/src/callguard/yaml_engine/loader.py`: size cap, raw-byte
//! hash, YAML parse requiring a top-level mapping, JSON-Schema validation,
//! duplicate-id rejection, regex precompilation, and rejection of
//! `output.text` selectors inside `type: pre` contracts. The schema itself
//! is derived from [`Bundle`]'s `schemars::JsonSchema` impl rather than
//! hand-authored, the same pattern as
//! `abp-cli/tests/config_schema_test.rs`'s `schema_for!`.

use std::path::Path;

use regex::Regex;
use sha2::{Digest, Sha256};
use toolgate_core::error::ErrorCode;

use crate::bundle::{Bundle, ContractKind, API_VERSION, KIND};
use crate::error::ConfigError;

/// Bundles larger than this are rejected before parsing (§4.6.3 step 1).
pub const MAX_BUNDLE_SIZE: usize = 1_048_576;

/// A loaded, schema-valid bundle plus the hex-encoded SHA-256 hash of its
/// raw source bytes (§6's `policy_version`).
pub struct LoadedBundle {
    /// The parsed bundle.
    pub bundle: Bundle,
    /// Lowercase hex SHA-256 of the exact byte stream that was parsed.
    pub policy_version: String,
}

/// Load and validate a bundle from a file on disk.
pub fn load_bundle_file(path: impl AsRef<Path>) -> Result<LoadedBundle, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read(path).map_err(|err| {
        ConfigError::new(
            ErrorCode::ConfigInvalidYaml,
            format!("failed to read bundle file '{}': {err}", path.display()),
        )
    })?;
    load_bundle(&raw)
}

/// Load and validate a bundle from raw YAML bytes (a file's contents, or an
/// in-memory string's bytes).
pub fn load_bundle(raw: &[u8]) -> Result<LoadedBundle, ConfigError> {
    if raw.len() > MAX_BUNDLE_SIZE {
        return Err(ConfigError::new(
            ErrorCode::ConfigBundleTooLarge,
            format!("Bundle file too large ({} bytes, max {MAX_BUNDLE_SIZE})", raw.len()),
        ));
    }

    let policy_version = compute_hash(raw);

    let value: serde_json::Value = serde_yaml::from_slice(raw)
        .map_err(|err| ConfigError::new(ErrorCode::ConfigInvalidYaml, format!("YAML parse error: {err}")))?;

    if !value.is_object() {
        return Err(ConfigError::new(
            ErrorCode::ConfigInvalidYaml,
            "YAML document must be a mapping".to_string(),
        ));
    }

    validate_schema(&value)?;

    let bundle: Bundle = serde_json::from_value(value)
        .map_err(|err| ConfigError::new(ErrorCode::ConfigSchemaViolation, format!("Schema validation failed: {err}")))?;

    if bundle.api_version != API_VERSION {
        return Err(ConfigError::new(
            ErrorCode::ConfigSchemaViolation,
            format!("Schema validation failed: apiVersion must be '{API_VERSION}'"),
        ));
    }
    if bundle.kind != KIND {
        return Err(ConfigError::new(
            ErrorCode::ConfigSchemaViolation,
            format!("Schema validation failed: kind must be '{KIND}'"),
        ));
    }

    validate_unique_ids(&bundle)?;
    validate_contract_shapes(&bundle)?;
    validate_regexes(&bundle)?;
    validate_pre_selectors(&bundle)?;

    Ok(LoadedBundle { bundle, policy_version })
}

fn compute_hash(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    format!("{:x}", hasher.finalize())
}

fn validate_schema(value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema = schemars::schema_for!(Bundle);
    let schema_value =
        serde_json::to_value(schema).map_err(|err| ConfigError::new(ErrorCode::Internal, err.to_string()))?;
    let validator = jsonschema::validator_for(&schema_value)
        .map_err(|err| ConfigError::new(ErrorCode::Internal, format!("failed to compile bundle schema: {err}")))?;
    let errors: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::new(
            ErrorCode::ConfigSchemaViolation,
            format!("Schema validation failed: {}", errors.join("; ")),
        ))
    }
}

fn validate_unique_ids(bundle: &Bundle) -> Result<(), ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for contract in &bundle.contracts {
        if !seen.insert(contract.id.as_str()) {
            return Err(ConfigError::new(
                ErrorCode::ConfigDuplicateContractId,
                format!("Duplicate contract id: '{}'", contract.id),
            ));
        }
    }
    Ok(())
}

/// Per-kind field requirements the derived JSON Schema can't express as a
/// conditional (`tool` required for `pre`/`post`; `limits` required for
/// `session`), §4.6.1.
fn validate_contract_shapes(bundle: &Bundle) -> Result<(), ConfigError> {
    for contract in &bundle.contracts {
        match contract.kind {
            ContractKind::Pre | ContractKind::Post => {
                if contract.tool.is_none() {
                    return Err(ConfigError::new(
                        ErrorCode::ConfigSchemaViolation,
                        format!("Contract '{}': 'tool' is required for type: pre/post contracts", contract.id),
                    ));
                }
            }
            ContractKind::Session => {
                if contract.limits.is_none() {
                    return Err(ConfigError::new(
                        ErrorCode::ConfigSchemaViolation,
                        format!("Contract '{}': 'limits' is required for type: session contracts", contract.id),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn validate_regexes(bundle: &Bundle) -> Result<(), ConfigError> {
    for contract in &bundle.contracts {
        if let Some(when) = &contract.when {
            validate_expression_regexes(when)?;
        }
    }
    Ok(())
}

fn validate_expression_regexes(expr: &serde_json::Value) -> Result<(), ConfigError> {
    let Some(obj) = expr.as_object() else {
        return Ok(());
    };
    if let Some(serde_json::Value::Array(items)) = obj.get("all") {
        for item in items {
            validate_expression_regexes(item)?;
        }
        return Ok(());
    }
    if let Some(serde_json::Value::Array(items)) = obj.get("any") {
        for item in items {
            validate_expression_regexes(item)?;
        }
        return Ok(());
    }
    if let Some(inner) = obj.get("not") {
        return validate_expression_regexes(inner);
    }
    for operator in obj.values() {
        let Some(operator_map) = operator.as_object() else {
            continue;
        };
        if let Some(pattern) = operator_map.get("matches").and_then(|v| v.as_str()) {
            try_compile_regex(pattern)?;
        }
        if let Some(serde_json::Value::Array(patterns)) = operator_map.get("matches_any") {
            for pattern in patterns {
                if let Some(pattern) = pattern.as_str() {
                    try_compile_regex(pattern)?;
                }
            }
        }
    }
    Ok(())
}

fn try_compile_regex(pattern: &str) -> Result<(), ConfigError> {
    Regex::new(pattern).map(|_| ()).map_err(|err| {
        ConfigError::new(
            ErrorCode::ConfigInvalidRegex,
            format!("Invalid regex pattern '{pattern}': {err}"),
        )
    })
}

fn validate_pre_selectors(bundle: &Bundle) -> Result<(), ConfigError> {
    for contract in &bundle.contracts {
        if contract.kind != ContractKind::Pre {
            continue;
        }
        let Some(when) = &contract.when else {
            continue;
        };
        if expression_has_selector(when, "output.text") {
            return Err(ConfigError::new(
                ErrorCode::ConfigInvalidSelectorForType,
                format!(
                    "Contract '{}': output.text selector is not available in type: pre contracts",
                    contract.id
                ),
            ));
        }
    }
    Ok(())
}

fn expression_has_selector(expr: &serde_json::Value, target: &str) -> bool {
    let Some(obj) = expr.as_object() else {
        return false;
    };
    if let Some(serde_json::Value::Array(items)) = obj.get("all") {
        return items.iter().any(|item| expression_has_selector(item, target));
    }
    if let Some(serde_json::Value::Array(items)) = obj.get("any") {
        return items.iter().any(|item| expression_has_selector(item, target));
    }
    if let Some(inner) = obj.get("not") {
        return expression_has_selector(inner, target);
    }
    obj.contains_key(target)
}
