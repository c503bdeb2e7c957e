//! The uniform pass/fail result shared by every contract kind.

use serde::{Deserialize, Serialize};

/// Result of evaluating a single contract. A failing verdict must carry an
/// **actionable** message: it is surfaced to the agent verbatim so the
/// agent can self-correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the contract's condition was satisfied.
    pub passed: bool,
    /// Human/agent-readable explanation. Required to be non-empty on a
    /// failing verdict; optional in spirit (but always present here) on a
    /// passing one.
    pub message: String,
}

impl Verdict {
    /// A passing verdict with no message.
    pub fn pass() -> Self {
        Self {
            passed: true,
            message: String::new(),
        }
    }

    /// A passing verdict carrying an informational message (e.g. for a
    /// `warn`-effect contract that still needs audit-visible text).
    pub fn pass_with(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    /// A failing verdict with an actionable message.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }

    /// `true` iff this verdict failed.
    pub fn failed(&self) -> bool {
        !self.passed
    }
}
