//! Declarative session bounds shared by YAML session contracts and the
//! Guard (§4.6.4, §4.7 steps 5-6).
//!
//! Lives in `toolgate-core` rather than `toolgate-expr` or
//! `toolgate-pipeline` because both crates need the shape: `toolgate-expr`'s
//! compiler produces a `SessionLimits` from a bundle's `session` contracts
//! and top-level `limits`, and `toolgate-pipeline`'s Guard merges it with
//! whatever limits it was constructed with. Putting it in either crate
//! would make the other depend on it transitively for no other reason.

use std::collections::BTreeMap;

/// Integer bounds on a session's attempt/execution counters. `None` means
/// unbounded. Grounded on §4.6.1's `type: session` `limits` mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionLimits {
    /// Cap on `Session::execution_count()` (§4.7 step 5).
    pub max_tool_calls: Option<u64>,
    /// Cap on `Session::attempt_count()` (§4.7 step 1).
    pub max_attempts: Option<u64>,
    /// Per-tool cap on `Session::tool_execution_count(name)` (§4.7 step 6).
    pub max_calls_per_tool: BTreeMap<String, u64>,
}

impl SessionLimits {
    /// No bounds at all.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Combine two sets of limits, keeping the stricter (lower) bound
    /// wherever both sides specify one — per §4.6.4's "session contracts
    /// contribute their limits to the Guard's limits (taking the stricter
    /// of multiple if present)".
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            max_tool_calls: merge_stricter(self.max_tool_calls, other.max_tool_calls),
            max_attempts: merge_stricter(self.max_attempts, other.max_attempts),
            max_calls_per_tool: merge_per_tool(self.max_calls_per_tool, other.max_calls_per_tool),
        }
    }
}

fn merge_stricter(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

fn merge_per_tool(mut a: BTreeMap<String, u64>, b: BTreeMap<String, u64>) -> BTreeMap<String, u64> {
    for (tool, cap) in b {
        a.entry(tool)
            .and_modify(|existing| *existing = (*existing).min(cap))
            .or_insert(cap);
    }
    a
}
