//! Governance interceptor for autonomous agent tool calls.
//!
//! If you only take one dependency, take this one: it re-exports
//! `toolgate-core` (the data model and trait seams), `toolgate-audit` (the
//! audit event contract and sinks), `toolgate-expr` (the YAML policy
//! engine), and `toolgate-pipeline` (the governance pipeline and `Guard`
//! facade) under a single namespace.

#![warn(missing_docs)]

pub use toolgate_audit::{
    Action, AuditEvent, ContractEvalRecord, DecisionSource, FileSink, HookEvalRecord, HttpSink,
    HttpSinkConfig, OnFailure, Sink, StdoutSink,
};
pub use toolgate_core::{
    error, ext, AfterHook, BeforeHook, Envelope, EnvelopeBuilder, FnBeforeHook, FnPostCondition,
    FnPreCondition, FnSessionCondition, HookAction, HookDecision, PostCondition, PreCondition,
    Principal, Session, SessionCondition, SessionLimits, SideEffect, ToolKind, ToolRegistry,
    ToolTarget, Verdict,
};
pub use toolgate_expr::{
    compile_bundle, evaluate_expression, load_bundle, load_bundle_file, Bundle, BundleMetadata,
    CompiledBundle, ConfigError, ContractDef, ContractKind, EvalResult, Effect, LoadedBundle,
    SessionLimitsDef, ThenDef, API_VERSION, KIND, MAX_BUNDLE_SIZE,
};
pub use toolgate_pipeline::{
    Denied, ExecutorError, FnToolExecutor, GovernancePipeline, Guard, GuardBuilder, Mode,
    PostDecision, PreDecision, PreOutcome, RunError, ToolExecutor,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn facade_reexports_form_a_working_guard() {
        let guard = Guard::builder().build();
        let session = Session::new("s1");
        let executor = FnToolExecutor::new(|input: serde_json::Value| async move { Ok(input) });

        let result = guard
            .run("read_file", serde_json::Map::new(), None, &executor, &session)
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({}));
        assert_eq!(guard.policy_version(), None);
    }
}
