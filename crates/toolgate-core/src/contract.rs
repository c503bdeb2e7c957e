//! Pre/post/session contract trait seams (§4.2).
//!
//! Contracts are expressed as `async_trait` traits rather than a tagged
//! closure variant. This is a Rust-idiomatic substitution for the source's
//! "duck-typed callable tagged with its kind": an `async_trait` trait
//! object stored in a registry `Vec`, dispatched by registration order —
//! the same shape the governance pipeline itself uses for hooks, and the
//! shape `abp-runtime`'s own `PipelineStage` uses for pluggable stages.

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::session::Session;
use crate::target::ToolTarget;
use crate::verdict::Verdict;

/// `(envelope) -> Verdict`, bound to a tool name (or wildcard).
#[async_trait]
pub trait PreCondition: Send + Sync {
    /// Name recorded in `contracts_evaluated` for audit.
    fn name(&self) -> &str;

    /// Tool this contract applies to.
    fn tool(&self) -> &ToolTarget;

    /// Evaluate the contract against the proposed call.
    async fn check(&self, envelope: &Envelope) -> Verdict;
}

/// `(envelope, tool_result) -> Verdict`, bound similarly to a pre-contract.
#[async_trait]
pub trait PostCondition: Send + Sync {
    /// Name recorded in `contracts_evaluated` for audit.
    fn name(&self) -> &str;

    /// Tool this contract applies to.
    fn tool(&self) -> &ToolTarget;

    /// Evaluate the contract against the call and its result.
    async fn check(&self, envelope: &Envelope, result: &serde_json::Value) -> Verdict;
}

/// `(session) -> Verdict`, not bound to a tool.
#[async_trait]
pub trait SessionCondition: Send + Sync {
    /// Name recorded in `contracts_evaluated` for audit.
    fn name(&self) -> &str;

    /// Evaluate the contract against session state.
    async fn check(&self, session: &Session) -> Verdict;
}

/// Adapter wrapping a plain synchronous closure as a [`PreCondition`].
pub struct FnPreCondition<F> {
    name: String,
    tool: ToolTarget,
    f: F,
}

impl<F> FnPreCondition<F>
where
    F: Fn(&Envelope) -> Verdict + Send + Sync,
{
    /// Build a pre-contract from a plain closure.
    pub fn new(name: impl Into<String>, tool: ToolTarget, f: F) -> Self {
        Self {
            name: name.into(),
            tool,
            f,
        }
    }
}

#[async_trait]
impl<F> PreCondition for FnPreCondition<F>
where
    F: Fn(&Envelope) -> Verdict + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn tool(&self) -> &ToolTarget {
        &self.tool
    }

    async fn check(&self, envelope: &Envelope) -> Verdict {
        (self.f)(envelope)
    }
}

/// Adapter wrapping a plain synchronous closure as a [`PostCondition`].
pub struct FnPostCondition<F> {
    name: String,
    tool: ToolTarget,
    f: F,
}

impl<F> FnPostCondition<F>
where
    F: Fn(&Envelope, &serde_json::Value) -> Verdict + Send + Sync,
{
    /// Build a post-contract from a plain closure.
    pub fn new(name: impl Into<String>, tool: ToolTarget, f: F) -> Self {
        Self {
            name: name.into(),
            tool,
            f,
        }
    }
}

#[async_trait]
impl<F> PostCondition for FnPostCondition<F>
where
    F: Fn(&Envelope, &serde_json::Value) -> Verdict + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn tool(&self) -> &ToolTarget {
        &self.tool
    }

    async fn check(&self, envelope: &Envelope, result: &serde_json::Value) -> Verdict {
        (self.f)(envelope, result)
    }
}

/// Adapter wrapping a plain synchronous closure as a [`SessionCondition`].
pub struct FnSessionCondition<F> {
    name: String,
    f: F,
}

impl<F> FnSessionCondition<F>
where
    F: Fn(&Session) -> Verdict + Send + Sync,
{
    /// Build a session-contract from a plain closure.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> SessionCondition for FnSessionCondition<F>
where
    F: Fn(&Session) -> Verdict + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, session: &Session) -> Verdict {
        (self.f)(session)
    }
}
