//! Data model and trait seams for the tool-call governance interceptor.
//!
//! This crate defines the shapes every other governance crate builds on:
//! the immutable [`Envelope`], the [`Verdict`]/[`HookDecision`] result
//! types, the [`PreCondition`]/[`PostCondition`]/[`SessionCondition`] and
//! [`BeforeHook`]/[`AfterHook`] trait seams, concurrency-safe [`Session`]
//! state, and the shared [`error::ErrorCode`] taxonomy.

#![warn(missing_docs)]

mod contract;
mod envelope;
pub mod error;
pub mod ext;
mod hook;
mod limits;
mod session;
mod target;

pub use contract::{
    FnPostCondition, FnPreCondition, FnSessionCondition, PostCondition, PreCondition,
    SessionCondition,
};
pub use envelope::{Envelope, EnvelopeBuilder, Principal, SideEffect, ToolKind, ToolRegistry};
pub use hook::{AfterHook, BeforeHook, FnBeforeHook, HookAction, HookDecision};
pub use limits::SessionLimits;
pub use session::Session;
pub use target::ToolTarget;

mod verdict;
pub use verdict::Verdict;
