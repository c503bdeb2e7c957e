//! Lowers a loaded [`Bundle`] into trait objects the pipeline consumes
//! directly (§4.6.4).
//!
//! `type: session` contracts contribute only their `limits`, merged
//! stricter-wins into the bundle's aggregated [`SessionLimits`] — they are
//! never compiled into [`SessionCondition`] trait objects. Only a
//! programmatic session contract registered directly with a Guard uses that
//! trait; the YAML grammar's `session` contracts are pure limit
//! declarations (§4.6.1, §4.6.4).

use std::sync::Arc;

use toolgate_core::{Envelope, PostCondition, PreCondition, SessionLimits, ToolTarget, Verdict};

use crate::bundle::{Bundle, ContractDef, ContractKind, Effect};
use crate::evaluator::evaluate_expression;

/// The product of compiling a [`Bundle`]: ready-to-register contracts plus
/// the session limits its `type: session` contracts declared, and the
/// bundle's `policy_version`.
pub struct CompiledBundle {
    /// Compiled `pre` contracts, in declaration order.
    pub pre: Vec<Arc<dyn PreCondition>>,
    /// Compiled `post` contracts, in declaration order.
    pub post: Vec<Arc<dyn PostCondition>>,
    /// Aggregated session limits declared by `type: session` contracts
    /// (stricter-wins merge, §4.6.4).
    pub limits: SessionLimits,
    /// Hex SHA-256 of the bundle's raw source bytes.
    pub policy_version: String,
}

/// Compile a loaded bundle, stamping `policy_version` onto the result.
pub fn compile_bundle(bundle: &Bundle, policy_version: String) -> CompiledBundle {
    let mut pre: Vec<Arc<dyn PreCondition>> = Vec::new();
    let mut post: Vec<Arc<dyn PostCondition>> = Vec::new();
    let mut limits = bundle
        .limits
        .as_ref()
        .map(session_limits_from_def)
        .unwrap_or_default();

    for contract in &bundle.contracts {
        match contract.kind {
            ContractKind::Pre => pre.push(Arc::new(YamlPreCondition::new(contract))),
            ContractKind::Post => post.push(Arc::new(YamlPostCondition::new(contract))),
            ContractKind::Session => {
                if let Some(def) = &contract.limits {
                    limits = limits.merge(session_limits_from_def(def));
                }
            }
        }
    }

    CompiledBundle {
        pre,
        post,
        limits,
        policy_version,
    }
}

fn session_limits_from_def(def: &crate::bundle::SessionLimitsDef) -> SessionLimits {
    SessionLimits {
        max_tool_calls: def.max_tool_calls,
        max_attempts: def.max_attempts,
        max_calls_per_tool: def.max_calls_per_tool.clone().unwrap_or_default(),
    }
}

/// A compiled `type: pre` contract: evaluates `when`, produces a
/// [`Verdict`] per its `then.effect` (`deny` fails, `warn` passes but
/// carries the message).
struct YamlPreCondition {
    id: String,
    tool: ToolTarget,
    when: Option<serde_json::Value>,
    effect: Effect,
    message: Option<String>,
}

impl YamlPreCondition {
    fn new(contract: &ContractDef) -> Self {
        let then = contract.then.as_ref();
        Self {
            id: contract.id.clone(),
            tool: ToolTarget::from_str(contract.tool.clone().unwrap_or_default()),
            when: contract.when.clone(),
            effect: then.map(|t| t.effect).unwrap_or(Effect::Deny),
            message: then.and_then(|t| t.message.clone()),
        }
    }
}

#[async_trait::async_trait]
impl PreCondition for YamlPreCondition {
    fn name(&self) -> &str {
        &self.id
    }

    fn tool(&self) -> &ToolTarget {
        &self.tool
    }

    async fn check(&self, envelope: &Envelope) -> Verdict {
        verdict_for(&self.when, &self.effect, &self.message, &self.id, envelope, None)
    }
}

/// A compiled `type: post` contract, identical in shape to
/// [`YamlPreCondition`] but with `output.text` available to its `when`.
struct YamlPostCondition {
    id: String,
    tool: ToolTarget,
    when: Option<serde_json::Value>,
    effect: Effect,
    message: Option<String>,
}

impl YamlPostCondition {
    fn new(contract: &ContractDef) -> Self {
        let then = contract.then.as_ref();
        Self {
            id: contract.id.clone(),
            tool: ToolTarget::from_str(contract.tool.clone().unwrap_or_default()),
            when: contract.when.clone(),
            effect: then.map(|t| t.effect).unwrap_or(Effect::Deny),
            message: then.and_then(|t| t.message.clone()),
        }
    }
}

#[async_trait::async_trait]
impl PostCondition for YamlPostCondition {
    fn name(&self) -> &str {
        &self.id
    }

    fn tool(&self) -> &ToolTarget {
        &self.tool
    }

    async fn check(&self, envelope: &Envelope, result: &serde_json::Value) -> Verdict {
        let output_text = result.as_str().map(str::to_string).unwrap_or_else(|| result.to_string());
        verdict_for(&self.when, &self.effect, &self.message, &self.id, envelope, Some(output_text.as_str()))
    }
}

fn verdict_for(
    when: &Option<serde_json::Value>,
    effect: &Effect,
    message: &Option<String>,
    id: &str,
    envelope: &Envelope,
    output_text: Option<&str>,
) -> Verdict {
    let Some(when) = when else {
        return Verdict::pass();
    };
    let result = evaluate_expression(when, envelope, output_text);
    if !result.is_truthy() {
        return Verdict::pass();
    }

    let reason = message.clone().unwrap_or_else(|| synthesize_message(id, &result));
    match effect {
        Effect::Deny => Verdict::fail(reason),
        Effect::Warn => Verdict::pass_with(reason),
    }
}

fn synthesize_message(id: &str, result: &crate::evaluator::EvalResult) -> String {
    match result.error_message() {
        Some(detail) => format!("contract '{id}' could not be evaluated: {detail}"),
        None => format!("contract '{id}' condition was met"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::ThenDef;
    use serde_json::json;

    fn pre_contract(id: &str, tool: &str, when: serde_json::Value, effect: Effect) -> ContractDef {
        ContractDef {
            id: id.to_string(),
            kind: ContractKind::Pre,
            tool: Some(tool.to_string()),
            when: Some(when),
            then: Some(ThenDef {
                effect,
                message: None,
                tags: None,
            }),
            limits: None,
        }
    }

    #[tokio::test]
    async fn deny_contract_fails_when_truthy() {
        let contract = pre_contract(
            "block-env",
            "read_file",
            json!({"args.path": {"contains": ".env"}}),
            Effect::Deny,
        );
        let compiled = YamlPreCondition::new(&contract);

        let mut input = serde_json::Map::new();
        input.insert("path".into(), json!("/home/.env"));
        let env = Envelope::builder("read_file").tool_input(input).build();

        let verdict = compiled.check(&env).await;
        assert!(verdict.failed());
    }

    #[tokio::test]
    async fn warn_contract_passes_but_carries_message() {
        let mut then = ThenDef {
            effect: Effect::Warn,
            message: Some("looked sensitive".to_string()),
            tags: None,
        };
        then.effect = Effect::Warn;
        let contract = ContractDef {
            id: "flag".to_string(),
            kind: ContractKind::Pre,
            tool: Some("read_file".to_string()),
            when: Some(json!({"args.path": {"contains": ".env"}})),
            then: Some(then),
            limits: None,
        };
        let compiled = YamlPreCondition::new(&contract);

        let mut input = serde_json::Map::new();
        input.insert("path".into(), json!("/home/.env"));
        let env = Envelope::builder("read_file").tool_input(input).build();

        let verdict = compiled.check(&env).await;
        assert!(verdict.passed);
        assert_eq!(verdict.message, "looked sensitive");
    }

    #[tokio::test]
    async fn non_matching_condition_passes_silently() {
        let contract = pre_contract(
            "block-env",
            "read_file",
            json!({"args.path": {"contains": ".env"}}),
            Effect::Deny,
        );
        let compiled = YamlPreCondition::new(&contract);

        let mut input = serde_json::Map::new();
        input.insert("path".into(), json!("/home/readme.txt"));
        let env = Envelope::builder("read_file").tool_input(input).build();

        let verdict = compiled.check(&env).await;
        assert!(verdict.passed);
    }

    #[tokio::test]
    async fn policy_error_denies_with_synthesized_message() {
        let contract = pre_contract(
            "type-check",
            "custom_tool",
            json!({"args.count": {"gt": 5}}),
            Effect::Deny,
        );
        let compiled = YamlPreCondition::new(&contract);

        let mut input = serde_json::Map::new();
        input.insert("count".into(), json!("not_a_number"));
        let env = Envelope::builder("custom_tool").tool_input(input).build();

        let verdict = compiled.check(&env).await;
        assert!(verdict.failed());
        assert!(verdict.message.contains("type-check"));
    }

    #[tokio::test]
    async fn post_condition_sees_output_text() {
        let contract = ContractDef {
            id: "flag-secret".to_string(),
            kind: ContractKind::Post,
            tool: Some("*".to_string()),
            when: Some(json!({"output.text": {"matches_any": ["(?i)secret"]}})),
            then: Some(ThenDef {
                effect: Effect::Warn,
                message: None,
                tags: None,
            }),
            limits: None,
        };
        let compiled = YamlPostCondition::new(&contract);
        let env = Envelope::builder("read_file").build();
        let verdict = compiled.check(&env, &json!("this has a SECRET in it")).await;
        assert!(verdict.passed);
        assert!(!verdict.message.is_empty());
    }

    #[test]
    fn session_contracts_merge_into_limits_not_trait_objects() {
        use crate::bundle::{BundleMetadata, SessionLimitsDef};

        let bundle = Bundle {
            api_version: crate::bundle::API_VERSION.to_string(),
            kind: crate::bundle::KIND.to_string(),
            metadata: BundleMetadata {
                name: "test".to_string(),
                extra: Default::default(),
            },
            contracts: vec![ContractDef {
                id: "session-limits".to_string(),
                kind: ContractKind::Session,
                tool: None,
                when: None,
                then: None,
                limits: Some(SessionLimitsDef {
                    max_tool_calls: Some(50),
                    max_attempts: Some(120),
                    max_calls_per_tool: None,
                }),
            }],
            defaults: None,
            limits: None,
        };

        let compiled = compile_bundle(&bundle, "deadbeef".to_string());
        assert!(compiled.pre.is_empty());
        assert!(compiled.post.is_empty());
        assert_eq!(compiled.limits.max_tool_calls, Some(50));
        assert_eq!(compiled.limits.max_attempts, Some(120));
    }
}
