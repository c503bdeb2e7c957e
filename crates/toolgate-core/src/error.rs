//! Stable error taxonomy shared across the governance crates (SPEC_FULL §4.9).
//!
//! Grounded on `abp-error`'s `ErrorCode`/`ErrorCategory` split: a small,
//! stable, machine-readable code per error family, with a `category()`
//! method mapping codes to a broader grouping. Crates higher in the stack
//! (`toolgate-pipeline`'s `ConfigError`/`Denied`, `toolgate-expr`'s
//! `PolicyError`) carry one of these codes rather than inventing their own
//! ad hoc string taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad family an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bundle/loader problems and mis-typed configuration (§7).
    Config,
    /// Fail-closed evaluator conditions (§7's "Policy error").
    Policy,
    /// Executor invocation failures.
    Execution,
    /// Audit sink delivery failures.
    Sink,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Policy => "policy",
            Self::Execution => "execution",
            Self::Sink => "sink",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Machine-readable, stable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Bundle bytes exceeded the size cap.
    ConfigBundleTooLarge,
    /// Bundle is not valid YAML, or not a top-level mapping.
    ConfigInvalidYaml,
    /// Bundle failed JSON-Schema validation.
    ConfigSchemaViolation,
    /// Two contracts in the same bundle share an `id`.
    ConfigDuplicateContractId,
    /// A `matches`/`matches_any` pattern failed to compile as a regex.
    ConfigInvalidRegex,
    /// An `output.text` selector was used inside a `type: pre` contract.
    ConfigInvalidSelectorForType,
    /// A deliberate decision to block the call in enforce mode.
    PolicyDenied,
    /// The evaluator could not resolve a typed comparison (fail-closed).
    PolicyEvaluationError,
    /// The executor raised.
    ExecutionFailed,
    /// The call was cancelled by the host runtime before it completed.
    ExecutionCancelled,
    /// An audit sink failed to deliver an event after exhausting retries.
    SinkDeliveryFailed,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigBundleTooLarge
            | Self::ConfigInvalidYaml
            | Self::ConfigSchemaViolation
            | Self::ConfigDuplicateContractId
            | Self::ConfigInvalidRegex
            | Self::ConfigInvalidSelectorForType => ErrorCategory::Config,

            Self::PolicyDenied | Self::PolicyEvaluationError => ErrorCategory::Policy,

            Self::ExecutionFailed | Self::ExecutionCancelled => ErrorCategory::Execution,

            Self::SinkDeliveryFailed => ErrorCategory::Sink,

            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation (e.g. `"CONFIG_INVALID_YAML"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigBundleTooLarge => "CONFIG_BUNDLE_TOO_LARGE",
            Self::ConfigInvalidYaml => "CONFIG_INVALID_YAML",
            Self::ConfigSchemaViolation => "CONFIG_SCHEMA_VIOLATION",
            Self::ConfigDuplicateContractId => "CONFIG_DUPLICATE_CONTRACT_ID",
            Self::ConfigInvalidRegex => "CONFIG_INVALID_REGEX",
            Self::ConfigInvalidSelectorForType => "CONFIG_INVALID_SELECTOR_FOR_TYPE",
            Self::PolicyDenied => "POLICY_DENIED",
            Self::PolicyEvaluationError => "POLICY_EVALUATION_ERROR",
            Self::ExecutionFailed => "EXECUTION_FAILED",
            Self::ExecutionCancelled => "EXECUTION_CANCELLED",
            Self::SinkDeliveryFailed => "SINK_DELIVERY_FAILED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
