//! Before/after hook callbacks (§4.3).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::target::ToolTarget;

/// What a before-hook decided to do with a proposed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum HookAction {
    /// Let the call proceed unchanged.
    Allow,
    /// Block the call. `reason` is surfaced to the agent.
    Deny {
        /// Why the call was blocked.
        reason: String,
    },
    /// Replace `tool_input` for downstream checks and execution.
    Modify {
        /// The replacement arguments.
        modified_input: serde_json::Map<String, serde_json::Value>,
    },
}

/// Result of a before-hook evaluation. `reason` is always present (empty
/// string on `allow`); `modified_input` is present iff `action == modify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookDecision {
    /// The chosen action.
    pub action: HookAction,
}

impl HookDecision {
    /// Allow the call to proceed.
    pub fn allow() -> Self {
        Self {
            action: HookAction::Allow,
        }
    }

    /// Deny the call with a reason.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            action: HookAction::Deny {
                reason: reason.into(),
            },
        }
    }

    /// Replace the call's arguments.
    pub fn modify(modified_input: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            action: HookAction::Modify { modified_input },
        }
    }

    /// The denial reason, if this decision denies.
    pub fn deny_reason(&self) -> Option<&str> {
        match &self.action {
            HookAction::Deny { reason } => Some(reason),
            _ => None,
        }
    }

    /// The replacement arguments, if this decision modifies.
    pub fn modified_input(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match &self.action {
            HookAction::Modify { modified_input } => Some(modified_input),
            _ => None,
        }
    }
}

/// A before-call hook. Runs in registration order; the pipeline skips a
/// hook whose `when` predicate returns `false` for the current envelope.
#[async_trait]
pub trait BeforeHook: Send + Sync {
    /// Name recorded in `hooks_evaluated` for audit.
    fn name(&self) -> &str;

    /// Tool this hook applies to (`*` for all tools).
    fn tool(&self) -> &ToolTarget;

    /// Optional guard; default always applies.
    fn when(&self, _envelope: &Envelope) -> bool {
        true
    }

    /// Evaluate the hook.
    async fn before(&self, envelope: &Envelope) -> HookDecision;
}

/// An after-call hook. Runs once execution has occurred (successfully or
/// not); its result is ignored by the pipeline.
#[async_trait]
pub trait AfterHook: Send + Sync {
    /// Name recorded in `hooks_evaluated` for audit.
    fn name(&self) -> &str;

    /// Tool this hook applies to (`*` for all tools).
    fn tool(&self) -> &ToolTarget;

    /// Optional guard; default always applies.
    fn when(&self, _envelope: &Envelope) -> bool {
        true
    }

    /// Run the hook. Return value is ignored.
    async fn after(&self, envelope: &Envelope, result: &serde_json::Value);
}

/// Adapter wrapping a plain synchronous closure as a [`BeforeHook`],
/// grounding §9's "behavior must be indistinguishable" note for
/// synchronous vs. suspending implementations.
pub struct FnBeforeHook<F> {
    name: String,
    tool: ToolTarget,
    f: F,
}

impl<F> FnBeforeHook<F>
where
    F: Fn(&Envelope) -> HookDecision + Send + Sync,
{
    /// Build a before-hook from a plain closure.
    pub fn new(name: impl Into<String>, tool: ToolTarget, f: F) -> Self {
        Self {
            name: name.into(),
            tool,
            f,
        }
    }
}

#[async_trait]
impl<F> BeforeHook for FnBeforeHook<F>
where
    F: Fn(&Envelope) -> HookDecision + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn tool(&self) -> &ToolTarget {
        &self.tool
    }

    async fn before(&self, envelope: &Envelope) -> HookDecision {
        (self.f)(envelope)
    }
}
