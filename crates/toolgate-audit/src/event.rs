//! The audit event payload (§3, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use toolgate_core::Principal;
use uuid::Uuid;

/// What happened to a proposed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// The call was allowed and executed.
    CallAllow,
    /// The call was blocked (enforce mode).
    CallDeny,
    /// The call would have been blocked, but observe mode let it through.
    CallWouldDeny,
    /// A before-hook replaced the call's arguments.
    CallModify,
    /// The executor raised.
    CallError,
}

/// Which stage of the pipeline produced a deny decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// `session.attempt_count() > max_attempts`.
    AttemptLimit,
    /// A before-hook denied.
    Hook,
    /// A pre-contract failed.
    Precondition,
    /// A session contract failed.
    SessionContract,
    /// An execution-count or per-tool limit was hit.
    OperationLimit,
}

/// One entry in `hooks_evaluated`: the outcome of a single hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookEvalRecord {
    /// Hook name.
    pub name: String,
    /// `"allow" | "deny" | "modify"`.
    pub result: String,
    /// Hook-supplied reason, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One entry in `contracts_evaluated`: the outcome of a single contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractEvalRecord {
    /// Contract name.
    pub name: String,
    /// `"pre" | "post" | "session"`.
    #[serde(rename = "type")]
    pub contract_type: String,
    /// Whether the contract's verdict passed.
    pub passed: bool,
    /// Verdict message.
    pub message: String,
}

/// The audit event emitted for every pipeline decision. Exact field list
/// and wire shape per §6 — sinks serialize this type byte-for-byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// The envelope's call id.
    pub call_id: Uuid,
    /// The tool that was called.
    pub tool_name: String,
    /// What happened.
    pub action: Action,
    /// Human-readable reason for `action`.
    pub reason: String,
    /// RFC-3339 UTC timestamp of the event.
    pub timestamp: DateTime<Utc>,
    /// Bundle hash, or `null` for a purely programmatic policy.
    #[serde(default)]
    pub policy_version: Option<String>,
    /// The calling principal, if supplied.
    #[serde(default)]
    pub principal: Option<Principal>,
    /// Which pipeline stage produced a deny decision.
    #[serde(default)]
    pub decision_source: Option<DecisionSource>,
    /// A more specific name for the decision (e.g.
    /// `"max_calls_per_tool:bash"`).
    #[serde(default)]
    pub decision_name: Option<String>,
    /// Every hook evaluated for this call, in evaluation order.
    pub hooks_evaluated: Vec<HookEvalRecord>,
    /// Every contract evaluated for this call, in evaluation order.
    pub contracts_evaluated: Vec<ContractEvalRecord>,
    /// Arbitrary additional context.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}
