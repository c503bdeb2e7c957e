//! The `Guard` facade (§4.8): construction, hook/contract registries, and
//! the `run()` wrapper around the executor.
//!
//! Grounded on `original_source/tests/test_yaml_engine/test_integration.py`'s
//! `Edictum.from_yaml(path, mode=, audit_sink=)` / `guard.run(...)` shape —
//! the Python prototype's `EdictumDenied` becomes [`Denied`], its implicit
//! `mode` attribute becomes [`Mode`], and a raised exception on deny becomes
//! `Result<_, RunError>`.

use std::sync::Arc;

use chrono::Utc;
use toolgate_audit::{Action, AuditEvent, Sink};
use toolgate_core::{
    AfterHook, BeforeHook, Envelope, EnvelopeBuilder, PostCondition, PreCondition, Principal,
    Session, SessionCondition, SessionLimits, ToolRegistry,
};

use crate::executor::{ExecutorError, ToolExecutor};
use crate::pipeline::{GovernancePipeline, PreOutcome};

/// Whether a deny decision actually blocks the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Deny decisions raise [`Denied`] and the tool never runs.
    #[default]
    Enforce,
    /// Nothing is blocked; a would-be deny is recorded as `call_would_deny`
    /// and the tool executes anyway.
    Observe,
}

/// The tool was blocked in enforce mode.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct Denied {
    /// The verdict/hook reason, verbatim.
    pub message: String,
}

/// Everything [`Guard::run`] can fail with.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RunError {
    /// The call was blocked in enforce mode.
    #[error(transparent)]
    Denied(#[from] Denied),
    /// The executor raised.
    #[error("execution failed: {0}")]
    Execution(String),
    /// The host runtime cancelled the call before the executor completed.
    #[error("cancelled")]
    Cancelled,
}

/// Configured mode, registries, limits, policy version, and audit sinks for
/// one governance boundary. Construct with [`GuardBuilder`] or
/// [`Guard::from_yaml_bytes`]/[`Guard::from_yaml_file`].
pub struct Guard {
    mode: Mode,
    pipeline: GovernancePipeline,
    limits: SessionLimits,
    policy_version: Option<String>,
    sinks: Vec<Arc<dyn Sink>>,
}

impl Guard {
    /// Start building a `Guard` programmatically.
    pub fn builder() -> GuardBuilder {
        GuardBuilder::new()
    }

    /// Build a `Guard` from a YAML bundle file on disk.
    pub fn from_yaml_file(
        path: impl AsRef<std::path::Path>,
        mode: Mode,
        sinks: Vec<Arc<dyn Sink>>,
    ) -> Result<Self, toolgate_expr::ConfigError> {
        let raw = std::fs::read(path.as_ref()).map_err(|err| {
            toolgate_expr::ConfigError::new(
                toolgate_core::error::ErrorCode::ConfigInvalidYaml,
                format!("failed to read bundle file '{}': {err}", path.as_ref().display()),
            )
        })?;
        Self::from_yaml_bytes(&raw, mode, sinks)
    }

    /// Build a `Guard` from raw YAML bundle bytes (§4.6.3, §4.6.4).
    pub fn from_yaml_bytes(
        raw: &[u8],
        mode: Mode,
        sinks: Vec<Arc<dyn Sink>>,
    ) -> Result<Self, toolgate_expr::ConfigError> {
        let loaded = toolgate_expr::load_bundle(raw)?;
        let compiled = toolgate_expr::compile_bundle(&loaded.bundle, loaded.policy_version);
        let limits = compiled.limits.clone();

        let pipeline = GovernancePipeline::new(
            vec![],
            vec![],
            compiled.pre,
            compiled.post,
            vec![],
            compiled.limits,
            ToolRegistry::new(),
        );

        Ok(Self {
            mode,
            limits,
            policy_version: Some(compiled.policy_version),
            sinks,
            pipeline,
        })
    }

    /// Resolve a named bundle from a template catalog. Not specified beyond
    /// the `run()` contract the adapter consumes (§4.8): no catalog exists
    /// in this crate, so every lookup fails.
    pub fn from_template(name: &str) -> Result<Self, toolgate_expr::ConfigError> {
        Err(toolgate_expr::ConfigError::new(
            toolgate_core::error::ErrorCode::ConfigInvalidYaml,
            format!("Template '{name}' not found"),
        ))
    }

    /// The configured mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The bundle hash this guard was built from, or `None` for a purely
    /// programmatic guard.
    pub fn policy_version(&self) -> Option<&str> {
        self.policy_version.as_deref()
    }

    /// The guard's aggregated session limits.
    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    /// Run one governed tool call end to end (§4.8's `run()`).
    ///
    /// Builds an envelope, records the attempt, evaluates `pre_execute`,
    /// emits any `call_modify` records followed by exactly one terminal
    /// audit event, and — on allow (enforce) or deny (observe) — invokes
    /// `executor` and runs `post_execute` before the terminal event.
    pub async fn run(
        &self,
        tool_name: &str,
        tool_input: serde_json::Map<String, serde_json::Value>,
        principal: Option<Principal>,
        executor: &dyn ToolExecutor,
        session: &Session,
    ) -> Result<serde_json::Value, RunError> {
        let mut builder = EnvelopeBuilder::new(tool_name)
            .tool_input(tool_input)
            .session_id(session.session_id().to_string());
        if let Some(principal) = principal {
            builder = builder.principal(principal);
        }
        let envelope = builder.build();

        tracing::debug!(target: "toolgate.pipeline", call_id = %envelope.call_id(), tool = tool_name, mode = ?self.mode, "run");
        session.record_attempt(envelope.clone()).await;
        let pre_decision = self.pipeline.pre_execute(&envelope, session).await;

        for hook_record in pre_decision.hooks_evaluated.iter().filter(|h| h.result == "modify") {
            self.emit(AuditEvent {
                call_id: envelope.call_id(),
                tool_name: tool_name.to_string(),
                action: Action::CallModify,
                reason: String::new(),
                timestamp: Utc::now(),
                policy_version: self.policy_version.clone(),
                principal: envelope.principal().cloned(),
                decision_source: None,
                decision_name: Some(hook_record.name.clone()),
                hooks_evaluated: pre_decision.hooks_evaluated.clone(),
                contracts_evaluated: pre_decision.contracts_evaluated.clone(),
                metadata: serde_json::Map::new(),
            })
            .await;
        }

        let modified_envelope = envelope.with_tool_input(pre_decision.tool_input.clone());

        match &pre_decision.outcome {
            PreOutcome::Deny {
                reason,
                source,
                decision_name,
            } if self.mode == Mode::Enforce => {
                self.emit(AuditEvent {
                    call_id: envelope.call_id(),
                    tool_name: tool_name.to_string(),
                    action: Action::CallDeny,
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                    policy_version: self.policy_version.clone(),
                    principal: envelope.principal().cloned(),
                    decision_source: Some(*source),
                    decision_name: decision_name.clone(),
                    hooks_evaluated: pre_decision.hooks_evaluated.clone(),
                    contracts_evaluated: pre_decision.contracts_evaluated.clone(),
                    metadata: serde_json::Map::new(),
                })
                .await;
                Err(Denied {
                    message: reason.clone(),
                }
                .into())
            }
            PreOutcome::Deny {
                reason,
                source,
                decision_name,
            } => {
                // Observe mode: the call would have been denied, but we
                // execute it anyway and report exactly one `call_would_deny`
                // event, per §4.7/§8's "Observe ≡ enforce decisions".
                let outcome = self
                    .execute_and_audit(
                        &modified_envelope,
                        executor,
                        session,
                        Action::CallWouldDeny,
                        reason.clone(),
                        Some(*source),
                        decision_name.clone(),
                        &pre_decision.hooks_evaluated,
                        &pre_decision.contracts_evaluated,
                    )
                    .await;
                outcome.map_err(|err| match err {
                    ExecuteError::Executor(ExecutorError::Cancelled) => RunError::Cancelled,
                    ExecuteError::Executor(ExecutorError::Failed(msg)) => RunError::Execution(msg),
                })
            }
            PreOutcome::Allow => {
                let outcome = self
                    .execute_and_audit(
                        &modified_envelope,
                        executor,
                        session,
                        Action::CallAllow,
                        String::new(),
                        None,
                        None,
                        &pre_decision.hooks_evaluated,
                        &pre_decision.contracts_evaluated,
                    )
                    .await;
                outcome.map_err(|err| match err {
                    ExecuteError::Executor(ExecutorError::Cancelled) => RunError::Cancelled,
                    ExecuteError::Executor(ExecutorError::Failed(msg)) => RunError::Execution(msg),
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_and_audit(
        &self,
        envelope: &Envelope,
        executor: &dyn ToolExecutor,
        session: &Session,
        terminal_action: Action,
        terminal_reason: String,
        decision_source: Option<toolgate_audit::DecisionSource>,
        decision_name: Option<String>,
        hooks_evaluated: &[toolgate_audit::HookEvalRecord],
        pre_contracts_evaluated: &[toolgate_audit::ContractEvalRecord],
    ) -> Result<serde_json::Value, ExecuteError> {
        tracing::debug!(target: "toolgate.pipeline", call_id = %envelope.call_id(), tool = envelope.tool_name(), "executing");
        let input_value = serde_json::Value::Object(envelope.tool_input().clone());
        match executor.execute(&input_value).await {
            Ok(result) => {
                session.record_execution(envelope.tool_name()).await;
                let post_decision = self.pipeline.post_execute(envelope, &result, true).await;

                let mut contracts_evaluated = pre_contracts_evaluated.to_vec();
                contracts_evaluated.extend(post_decision.contracts_evaluated.clone());

                let mut metadata = serde_json::Map::new();
                if !post_decision.warnings.is_empty() {
                    metadata.insert(
                        "warnings".to_string(),
                        serde_json::Value::Array(
                            post_decision
                                .warnings
                                .iter()
                                .cloned()
                                .map(serde_json::Value::String)
                                .collect(),
                        ),
                    );
                }

                self.emit(AuditEvent {
                    call_id: envelope.call_id(),
                    tool_name: envelope.tool_name().to_string(),
                    action: terminal_action,
                    reason: terminal_reason,
                    timestamp: Utc::now(),
                    policy_version: self.policy_version.clone(),
                    principal: envelope.principal().cloned(),
                    decision_source,
                    decision_name,
                    hooks_evaluated: hooks_evaluated.to_vec(),
                    contracts_evaluated,
                    metadata,
                })
                .await;

                Ok(result)
            }
            Err(err) => {
                let reason = match &err {
                    ExecutorError::Cancelled => "cancelled".to_string(),
                    ExecutorError::Failed(msg) => msg.clone(),
                };
                self.emit(AuditEvent {
                    call_id: envelope.call_id(),
                    tool_name: envelope.tool_name().to_string(),
                    action: Action::CallError,
                    reason,
                    timestamp: Utc::now(),
                    policy_version: self.policy_version.clone(),
                    principal: envelope.principal().cloned(),
                    decision_source: None,
                    decision_name: None,
                    hooks_evaluated: hooks_evaluated.to_vec(),
                    contracts_evaluated: pre_contracts_evaluated.to_vec(),
                    metadata: serde_json::Map::new(),
                })
                .await;
                Err(ExecuteError::Executor(err))
            }
        }
    }

    async fn emit(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.emit(&event).await;
        }
    }
}

enum ExecuteError {
    Executor(ExecutorError),
}

/// Builds a [`Guard`] from programmatic hooks/contracts/limits, without a
/// YAML bundle.
#[derive(Default)]
pub struct GuardBuilder {
    mode: Mode,
    before_hooks: Vec<Arc<dyn BeforeHook>>,
    after_hooks: Vec<Arc<dyn AfterHook>>,
    pre_conditions: Vec<Arc<dyn PreCondition>>,
    post_conditions: Vec<Arc<dyn PostCondition>>,
    session_conditions: Vec<Arc<dyn SessionCondition>>,
    limits: SessionLimits,
    tool_registry: ToolRegistry,
    sinks: Vec<Arc<dyn Sink>>,
}

impl GuardBuilder {
    /// An empty builder: enforce mode, no hooks/contracts, unbounded limits.
    pub fn new() -> Self {
        Self {
            mode: Mode::Enforce,
            before_hooks: Vec::new(),
            after_hooks: Vec::new(),
            pre_conditions: Vec::new(),
            post_conditions: Vec::new(),
            session_conditions: Vec::new(),
            limits: SessionLimits::unbounded(),
            tool_registry: ToolRegistry::new(),
            sinks: Vec::new(),
        }
    }

    /// Set the mode.
    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Register a before-hook. Hooks run in registration order.
    #[must_use]
    pub fn before_hook(mut self, hook: Arc<dyn BeforeHook>) -> Self {
        self.before_hooks.push(hook);
        self
    }

    /// Register an after-hook.
    #[must_use]
    pub fn after_hook(mut self, hook: Arc<dyn AfterHook>) -> Self {
        self.after_hooks.push(hook);
        self
    }

    /// Register a pre-contract. Programmatic contracts registered here run
    /// before any YAML-compiled contracts merged in separately (§4.7 step 3).
    #[must_use]
    pub fn pre_condition(mut self, condition: Arc<dyn PreCondition>) -> Self {
        self.pre_conditions.push(condition);
        self
    }

    /// Register a post-contract.
    #[must_use]
    pub fn post_condition(mut self, condition: Arc<dyn PostCondition>) -> Self {
        self.post_conditions.push(condition);
        self
    }

    /// Register a session-contract.
    #[must_use]
    pub fn session_condition(mut self, condition: Arc<dyn SessionCondition>) -> Self {
        self.session_conditions.push(condition);
        self
    }

    /// Set (merging stricter-wins with any already present) the guard's
    /// session limits.
    #[must_use]
    pub fn limits(mut self, limits: SessionLimits) -> Self {
        self.limits = self.limits.merge(limits);
        self
    }

    /// Override the tool registry used to phrase post-contract warnings.
    #[must_use]
    pub fn tool_registry(mut self, registry: ToolRegistry) -> Self {
        self.tool_registry = registry;
        self
    }

    /// Attach an audit sink. Multiple sinks all receive every event.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Finalize into a programmatic [`Guard`] with `policy_version = None`.
    pub fn build(self) -> Guard {
        let pipeline = GovernancePipeline::new(
            self.before_hooks,
            self.after_hooks,
            self.pre_conditions,
            self.post_conditions,
            self.session_conditions,
            self.limits.clone(),
            self.tool_registry,
        );
        Guard {
            mode: self.mode,
            limits: self.limits,
            policy_version: None,
            sinks: self.sinks,
            pipeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FnToolExecutor;
    use toolgate_core::{FnPreCondition, ToolTarget, Verdict};

    fn echo_executor() -> FnToolExecutor<impl Fn(serde_json::Value) -> std::future::Ready<Result<serde_json::Value, ExecutorError>>> {
        FnToolExecutor::new(|input| std::future::ready(Ok(input)))
    }

    #[tokio::test]
    async fn enforce_mode_denies_and_does_not_execute() {
        let guard = Guard::builder()
            .pre_condition(Arc::new(FnPreCondition::new(
                "block-env",
                ToolTarget::from_str("read_file"),
                |env: &toolgate_core::Envelope| {
                    if env.get_arg("path").and_then(|v| v.as_str()).is_some_and(|p| p.contains(".env")) {
                        Verdict::fail("Sensitive file blocked.")
                    } else {
                        Verdict::pass()
                    }
                },
            )))
            .build();

        let session = Session::new("s1");
        let executor = echo_executor();
        let mut input = serde_json::Map::new();
        input.insert("path".into(), serde_json::json!("/home/.env"));

        let err = guard.run("read_file", input, None, &executor, &session).await.unwrap_err();
        match err {
            RunError::Denied(denied) => assert_eq!(denied.message, "Sensitive file blocked."),
            other => panic!("expected Denied, got {other:?}"),
        }
        assert_eq!(session.execution_count().await, 0);
    }

    #[tokio::test]
    async fn observe_mode_executes_anyway() {
        let guard = Guard::builder()
            .mode(Mode::Observe)
            .pre_condition(Arc::new(FnPreCondition::new(
                "block-env",
                ToolTarget::from_str("read_file"),
                |_env: &toolgate_core::Envelope| Verdict::fail("blocked"),
            )))
            .build();

        let session = Session::new("s1");
        let executor = echo_executor();
        let mut input = serde_json::Map::new();
        input.insert("path".into(), serde_json::json!("/home/.env"));

        let result = guard.run("read_file", input, None, &executor, &session).await.unwrap();
        assert_eq!(result["path"], serde_json::json!("/home/.env"));
        assert_eq!(session.execution_count().await, 1);
    }

    #[tokio::test]
    async fn allowed_call_executes_and_increments_counters() {
        let guard = Guard::builder().build();
        let session = Session::new("s1");
        let executor = echo_executor();
        let result = guard
            .run("read_file", serde_json::Map::new(), None, &executor, &session)
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({}));
        assert_eq!(session.execution_count().await, 1);
        assert_eq!(session.tool_execution_count("read_file").await, 1);
    }

    #[tokio::test]
    async fn executor_failure_surfaces_as_execution_error() {
        let guard = Guard::builder().build();
        let session = Session::new("s1");
        let executor = FnToolExecutor::new(|_input| async move { Err(ExecutorError::Failed("disk full".into())) });
        let err = guard
            .run("write_file", serde_json::Map::new(), None, &executor, &session)
            .await
            .unwrap_err();
        match err {
            RunError::Execution(msg) => assert_eq!(msg, "disk full"),
            other => panic!("expected Execution, got {other:?}"),
        }
        assert_eq!(session.execution_count().await, 0);
    }

    #[tokio::test]
    async fn from_template_always_fails() {
        let err = Guard::from_template("nonexistent").unwrap_err();
        assert_eq!(err.message, "Template 'nonexistent' not found");
    }
}
