//! Bundle grammar types (§4.6.1).
//!
//! Grounded on `original_source/src/callguard/yaml_engine/loader.py`'s
//! schema shape (`apiVersion`/`kind`/`metadata`/`contracts`/`defaults`/
//! `limits`). Field types double as the `schemars::JsonSchema` source for
//! the embedded validation schema (`src/loader.rs`), the same
//! derive-a-schema-instead-of-hand-authoring-JSON pattern as
//! `abp-cli/tests/config_schema_test.rs`'s `schema_for!(BackplaneConfig)`.
//!
//! `when` stays an untyped `serde_json::Value`: the expression grammar is a
//! recursive, selector-keyed mapping (`{selector: {operator: operand}}` vs.
//! `{all: [...]}` vs. `{any: [...]}` vs. `{not: expr}}`) that doesn't fit a
//! tagged-enum derive without reserving `all`/`any`/`not` as selector names
//! — exactly the ambiguity `loader.py`'s own `_validate_expression_regexes`
//! resolves by dict-key introspection rather than a schema. `src/evaluator.rs`
//! walks this value tree the same way.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The only `apiVersion` this engine accepts.
pub const API_VERSION: &str = "toolgate/v1";

/// The only `kind` this engine accepts.
pub const KIND: &str = "ContractBundle";

/// A parsed, schema-valid (but not yet compiled) policy bundle (§4.6.1).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Bundle {
    /// Must equal [`API_VERSION`] exactly.
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Must equal [`KIND`] exactly.
    pub kind: String,
    /// Bundle metadata.
    pub metadata: BundleMetadata,
    /// Contracts in this bundle. Must be non-empty.
    #[schemars(length(min = 1))]
    pub contracts: Vec<ContractDef>,
    /// Free-form default values referenced by `when` expressions. Not
    /// interpreted by the loader or evaluator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<serde_json::Value>,
    /// Top-level limits, merged with any `type: session` contract limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<SessionLimitsDef>,
}

/// `metadata` block of a [`Bundle`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BundleMetadata {
    /// Human-readable bundle name.
    pub name: String,
    /// Any other metadata fields the bundle author included.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The three contract flavors (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContractKind {
    /// `(envelope) -> Verdict`.
    Pre,
    /// `(envelope, tool_result) -> Verdict`.
    Post,
    /// `(session) -> Verdict`.
    Session,
}

/// One entry in `contracts` (§4.6.1).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContractDef {
    /// Unique within the bundle (§4.6.3 step 4).
    pub id: String,
    /// Which contract flavor this is.
    #[serde(rename = "type")]
    pub kind: ContractKind,
    /// Required for `pre`/`post`: a tool name or `"*"`. Absent for `session`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// The guarding expression for `pre`/`post`. Absent for `session`
    /// (whose condition is purely its `limits`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "expr_schema")]
    pub when: Option<serde_json::Value>,
    /// What happens when `when` evaluates truthy, for `pre`/`post`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<ThenDef>,
    /// Session bounds, for `type: session` contracts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<SessionLimitsDef>,
}

fn expr_schema(_gen: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object"
    })
}

/// What a `pre`/`post` contract does when its `when` expression is truthy.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ThenDef {
    /// `deny` blocks the call; `warn` only annotates audit output.
    pub effect: Effect,
    /// Message surfaced to the agent (deny) or recorded in audit (warn).
    /// A synthesized reason is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Free-form labels, carried into audit metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// The effect of a truthy `pre`/`post` contract (§4.6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Block the call.
    Deny,
    /// Allow the call but annotate audit output.
    Warn,
}

/// Integer session bounds, as they appear in YAML (§4.6.1). Lowered to
/// [`toolgate_core::SessionLimits`] by `src/compiler.rs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SessionLimitsDef {
    /// Cap on total executions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tool_calls: Option<u64>,
    /// Cap on total attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u64>,
    /// Per-tool execution caps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_calls_per_tool: Option<BTreeMap<String, u64>>,
}
