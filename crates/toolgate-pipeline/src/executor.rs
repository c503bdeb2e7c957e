//! The opaque tool executor the pipeline invokes on allow (§6).
//!
//! Idiomatic Rust's answer to `executor(**tool_input) -> result`: a single
//! JSON value instead of a kwargs splat, and a typed error instead of a
//! raised exception. [`ExecutorError::Cancelled`] is how an executor that
//! raced its own work against the host runtime's cancellation reports that
//! outcome back to the pipeline (§5's cancellation propagation) — `Guard`
//! itself has no special cancellation machinery, it just treats this variant
//! differently when recording the audit event and session counters.

use async_trait::async_trait;

/// Why a tool executor failed to produce a result.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    /// The executor raised; `0` is surfaced verbatim in the audit reason.
    #[error("{0}")]
    Failed(String),
    /// The host runtime cancelled the call before the executor completed.
    #[error("cancelled")]
    Cancelled,
}

/// The tool executor the pipeline delegates to on allow. Implementations are
/// opaque to the pipeline: it never inspects `tool_input` beyond what the
/// contracts/hooks already validated, and never inspects a successful
/// result except to pass it on to post-contracts and after-hooks.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run the tool with the given (possibly hook-modified) arguments.
    async fn execute(&self, tool_input: &serde_json::Value) -> Result<serde_json::Value, ExecutorError>;
}

/// Adapter wrapping a plain async closure as a [`ToolExecutor`], for tests
/// and small host integrations that don't want to name a struct.
pub struct FnToolExecutor<F> {
    f: F,
}

impl<F, Fut> FnToolExecutor<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value, ExecutorError>> + Send,
{
    /// Build an executor from a closure returning a future.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> ToolExecutor for FnToolExecutor<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value, ExecutorError>> + Send,
{
    async fn execute(&self, tool_input: &serde_json::Value) -> Result<serde_json::Value, ExecutorError> {
        (self.f)(tool_input.clone()).await
    }
}
