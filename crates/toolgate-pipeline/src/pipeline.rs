//! The governance pipeline: ordering and short-circuiting of limits, hooks,
//! and contracts around one proposed tool call (§4.7).
//!
//! Grounded on `abp-runtime::pipeline::Pipeline` (`Vec<Box<dyn Stage>>`,
//! sequential `execute()`, `tracing::debug!` per stage) generalized from an
//! open-ended stage list to the spec's fixed pre/post ordering, since unlike
//! the teacher's pipeline this one has a mandated check order rather than a
//! caller-assembled one.

use std::sync::Arc;

use toolgate_audit::{ContractEvalRecord, DecisionSource, HookEvalRecord};
use toolgate_core::{
    AfterHook, BeforeHook, Envelope, PostCondition, PreCondition, Session, SessionCondition,
    SessionLimits, ToolRegistry, Verdict,
};

/// Outcome of a pre-execute pass: either allow, or deny with enough context
/// to phrase an audit reason.
#[derive(Debug, Clone)]
pub enum PreOutcome {
    /// Proceed with (possibly hook-modified) arguments.
    Allow,
    /// Block the call.
    Deny {
        /// Why.
        reason: String,
        /// Which stage produced the denial.
        source: DecisionSource,
        /// A more specific name for the decision, if any (e.g. a limit key).
        decision_name: Option<String>,
    },
}

/// Result of [`GovernancePipeline::pre_execute`]. Carries the (possibly
/// hook-modified) arguments plus every hook/contract evaluated, in order,
/// for the audit record — including the one that short-circuited.
pub struct PreDecision {
    /// Allow or deny, with reason.
    pub outcome: PreOutcome,
    /// `tool_input` after applying any `modify` hook decisions in order.
    pub tool_input: serde_json::Map<String, serde_json::Value>,
    /// Every hook evaluated, in evaluation order.
    pub hooks_evaluated: Vec<HookEvalRecord>,
    /// Every contract evaluated, in evaluation order.
    pub contracts_evaluated: Vec<ContractEvalRecord>,
}

/// Result of [`GovernancePipeline::post_execute`]. Post-contracts are
/// observation-only: they never change whether the call is considered to
/// have succeeded, only whether warnings are surfaced (§4.7 step 1).
pub struct PostDecision {
    /// Whether the tool execution itself succeeded (echoed back unchanged).
    pub tool_success: bool,
    /// Whether every post-contract passed.
    pub postconditions_passed: bool,
    /// One phrased warning per failing post-contract.
    pub warnings: Vec<String>,
    /// Every post-contract evaluated, in evaluation order.
    pub contracts_evaluated: Vec<ContractEvalRecord>,
}

/// Orders and short-circuits the checks a `Guard` runs around one call.
/// Holds no state of its own beyond the registered hooks/contracts/limits —
/// `Session` carries the mutable counters this pipeline reads.
pub struct GovernancePipeline {
    before_hooks: Vec<Arc<dyn BeforeHook>>,
    after_hooks: Vec<Arc<dyn AfterHook>>,
    pre_conditions: Vec<Arc<dyn PreCondition>>,
    post_conditions: Vec<Arc<dyn PostCondition>>,
    session_conditions: Vec<Arc<dyn SessionCondition>>,
    limits: SessionLimits,
    tool_registry: ToolRegistry,
}

impl GovernancePipeline {
    /// Build a pipeline from its registered checks and limits.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        before_hooks: Vec<Arc<dyn BeforeHook>>,
        after_hooks: Vec<Arc<dyn AfterHook>>,
        pre_conditions: Vec<Arc<dyn PreCondition>>,
        post_conditions: Vec<Arc<dyn PostCondition>>,
        session_conditions: Vec<Arc<dyn SessionCondition>>,
        limits: SessionLimits,
        tool_registry: ToolRegistry,
    ) -> Self {
        Self {
            before_hooks,
            after_hooks,
            pre_conditions,
            post_conditions,
            session_conditions,
            limits,
            tool_registry,
        }
    }

    /// Run the ordered pre-execute checks (§4.7 steps 1-7). Assumes
    /// `session.record_attempt(envelope)` was already called for this call.
    pub async fn pre_execute(&self, envelope: &Envelope, session: &Session) -> PreDecision {
        tracing::debug!(target: "toolgate.pipeline", call_id = %envelope.call_id(), tool = envelope.tool_name(), "pre_execute");
        let mut hooks_evaluated = Vec::new();
        let mut contracts_evaluated = Vec::new();
        let mut tool_input = envelope.tool_input().clone();

        // 1. Attempt limit. Strictly greater than: this call's own attempt
        // was already counted by `record_attempt` before we got here.
        if let Some(max_attempts) = self.limits.max_attempts {
            if session.attempt_count().await > max_attempts {
                tracing::debug!(target: "toolgate.pipeline", stage = "attempt_limit", "deny");
                return PreDecision {
                    outcome: PreOutcome::Deny {
                        reason: format!("attempt limit exceeded: max_attempts={max_attempts}"),
                        source: DecisionSource::AttemptLimit,
                        decision_name: Some("max_attempts".to_string()),
                    },
                    tool_input,
                    hooks_evaluated,
                    contracts_evaluated,
                };
            }
        }

        // 2. Before-hooks, in registration order.
        let mut current = envelope.clone();
        for hook in &self.before_hooks {
            if !hook.tool().matches(current.tool_name()) || !hook.when(&current) {
                continue;
            }
            tracing::debug!(target: "toolgate.pipeline", stage = "before_hook", hook = hook.name(), "evaluating");
            let decision = hook.before(&current).await;
            match &decision.action {
                toolgate_core::HookAction::Allow => {
                    hooks_evaluated.push(HookEvalRecord {
                        name: hook.name().to_string(),
                        result: "allow".to_string(),
                        reason: None,
                    });
                }
                toolgate_core::HookAction::Deny { reason } => {
                    hooks_evaluated.push(HookEvalRecord {
                        name: hook.name().to_string(),
                        result: "deny".to_string(),
                        reason: Some(reason.clone()),
                    });
                    tracing::debug!(target: "toolgate.pipeline", stage = "before_hook", hook = hook.name(), "deny");
                    return PreDecision {
                        outcome: PreOutcome::Deny {
                            reason: reason.clone(),
                            source: DecisionSource::Hook,
                            decision_name: Some(hook.name().to_string()),
                        },
                        tool_input: current.tool_input().clone(),
                        hooks_evaluated,
                        contracts_evaluated,
                    };
                }
                toolgate_core::HookAction::Modify { modified_input } => {
                    hooks_evaluated.push(HookEvalRecord {
                        name: hook.name().to_string(),
                        result: "modify".to_string(),
                        reason: None,
                    });
                    current = current.with_tool_input(modified_input.clone());
                }
            }
        }
        tool_input = current.tool_input().clone();

        // 3. Pre-contracts, in registration order.
        for contract in &self.pre_conditions {
            if !contract.tool().matches(current.tool_name()) {
                continue;
            }
            tracing::debug!(target: "toolgate.pipeline", stage = "precondition", contract = contract.name(), "evaluating");
            let verdict = contract.check(&current).await;
            contracts_evaluated.push(contract_record(contract.name(), "pre", &verdict));
            if verdict.failed() {
                tracing::debug!(target: "toolgate.pipeline", stage = "precondition", contract = contract.name(), "deny");
                return PreDecision {
                    outcome: PreOutcome::Deny {
                        reason: verdict.message,
                        source: DecisionSource::Precondition,
                        decision_name: Some(contract.name().to_string()),
                    },
                    tool_input,
                    hooks_evaluated,
                    contracts_evaluated,
                };
            }
        }

        // 4. Session contracts, in registration order.
        for contract in &self.session_conditions {
            tracing::debug!(target: "toolgate.pipeline", stage = "session_contract", contract = contract.name(), "evaluating");
            let verdict = contract.check(session).await;
            contracts_evaluated.push(contract_record(contract.name(), "session", &verdict));
            if verdict.failed() {
                tracing::debug!(target: "toolgate.pipeline", stage = "session_contract", contract = contract.name(), "deny");
                return PreDecision {
                    outcome: PreOutcome::Deny {
                        reason: verdict.message,
                        source: DecisionSource::SessionContract,
                        decision_name: Some(contract.name().to_string()),
                    },
                    tool_input,
                    hooks_evaluated,
                    contracts_evaluated,
                };
            }
        }

        // 5. Execution-count limit.
        if let Some(max_tool_calls) = self.limits.max_tool_calls {
            if session.execution_count().await >= max_tool_calls {
                tracing::debug!(target: "toolgate.pipeline", stage = "execution_limit", "deny");
                return PreDecision {
                    outcome: PreOutcome::Deny {
                        reason: format!("execution limit reached: max_tool_calls={max_tool_calls}"),
                        source: DecisionSource::OperationLimit,
                        decision_name: Some("max_tool_calls".to_string()),
                    },
                    tool_input,
                    hooks_evaluated,
                    contracts_evaluated,
                };
            }
        }

        // 6. Per-tool limit.
        if let Some(cap) = self.limits.max_calls_per_tool.get(current.tool_name()) {
            if session.tool_execution_count(current.tool_name()).await >= *cap {
                tracing::debug!(target: "toolgate.pipeline", stage = "per_tool_limit", tool = current.tool_name(), "deny");
                return PreDecision {
                    outcome: PreOutcome::Deny {
                        reason: format!(
                            "per-tool limit reached for {}: max_calls_per_tool={cap}",
                            current.tool_name()
                        ),
                        source: DecisionSource::OperationLimit,
                        decision_name: Some(format!("max_calls_per_tool:{}", current.tool_name())),
                    },
                    tool_input,
                    hooks_evaluated,
                    contracts_evaluated,
                };
            }
        }

        tracing::debug!(target: "toolgate.pipeline", "allow");
        PreDecision {
            outcome: PreOutcome::Allow,
            tool_input,
            hooks_evaluated,
            contracts_evaluated,
        }
    }

    /// Run post-contracts and after-hooks once execution has occurred
    /// (§4.7's `post_execute`). Never invoked when the executor raised.
    pub async fn post_execute(
        &self,
        envelope: &Envelope,
        result: &serde_json::Value,
        tool_success: bool,
    ) -> PostDecision {
        tracing::debug!(target: "toolgate.pipeline", call_id = %envelope.call_id(), tool = envelope.tool_name(), tool_success, "post_execute");
        let mut contracts_evaluated = Vec::new();
        let mut warnings = Vec::new();
        let mut postconditions_passed = true;

        for contract in &self.post_conditions {
            if !contract.tool().matches(envelope.tool_name()) {
                continue;
            }
            tracing::debug!(target: "toolgate.pipeline", stage = "postcondition", contract = contract.name(), "evaluating");
            let verdict = contract.check(envelope, result).await;
            contracts_evaluated.push(contract_record(contract.name(), "post", &verdict));
            if verdict.failed() {
                postconditions_passed = false;
                warnings.push(phrase_warning(
                    &self.tool_registry,
                    envelope.tool_name(),
                    &verdict.message,
                ));
            }
        }

        for hook in &self.after_hooks {
            if !hook.tool().matches(envelope.tool_name()) || !hook.when(envelope) {
                continue;
            }
            tracing::debug!(target: "toolgate.pipeline", stage = "after_hook", hook = hook.name(), "evaluating");
            hook.after(envelope, result).await;
        }

        PostDecision {
            tool_success,
            postconditions_passed,
            warnings,
            contracts_evaluated,
        }
    }
}

fn contract_record(name: &str, kind: &str, verdict: &Verdict) -> ContractEvalRecord {
    ContractEvalRecord {
        name: name.to_string(),
        contract_type: kind.to_string(),
        passed: verdict.passed,
        message: verdict.message.clone(),
    }
}

/// Warning phrasing depends on the tool's side effect: a pure read suggests
/// retrying; anything else notes the tool already ran and the agent must
/// assess the result before proceeding (§4.7 step 1).
fn phrase_warning(registry: &ToolRegistry, tool_name: &str, message: &str) -> String {
    use toolgate_core::SideEffect;
    match registry.side_effect(tool_name) {
        SideEffect::None => format!("{message} (consider retrying this read)"),
        _ => format!("{message} (the tool already executed; assess the result before proceeding)"),
    }
}
