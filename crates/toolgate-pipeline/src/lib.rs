//! Governance pipeline ordering and the `Guard` facade (§4.7, §4.8).
//!
//! `GovernancePipeline` fixes the check order (attempt limit, before-hooks,
//! pre-contracts, session contracts, execution/per-tool limits) and
//! produces the decisions `Guard::run` turns into executor calls and audit
//! events. Everything a host application needs to govern one tool call
//! lives behind [`Guard`]: build one with [`Guard::builder`] for
//! programmatic hooks/contracts, or [`Guard::from_yaml_bytes`]/
//! [`Guard::from_yaml_file`] to compile a YAML bundle into one.

#![warn(missing_docs)]

mod executor;
mod guard;
mod pipeline;

pub use executor::{ExecutorError, FnToolExecutor, ToolExecutor};
pub use guard::{Denied, Guard, GuardBuilder, Mode, RunError};
pub use pipeline::{GovernancePipeline, PostDecision, PreDecision, PreOutcome};
