//! Audit event payload and pluggable sinks for the governance pipeline.
//!
//! Defines the wire-exact [`AuditEvent`] (§6) and the [`Sink`] trait every
//! delivery backend implements: [`StdoutSink`], [`FileSink`], and
//! [`HttpSink`] (with Splunk HEC / Datadog / webhook constructors).

#![warn(missing_docs)]

mod event;
mod file;
mod http;
mod sink;
mod stdout;

pub use event::{Action, AuditEvent, ContractEvalRecord, DecisionSource, HookEvalRecord};
pub use file::FileSink;
pub use http::{HttpSink, HttpSinkConfig, OnFailure};
pub use sink::Sink;
pub use stdout::StdoutSink;
