//! The tool-name binding shared by hooks and pre/post contracts.

/// A hook or pre/post contract is bound to either a specific tool name or
/// the wildcard `*`. Dispatch is by exact match with fallback to wildcard
/// (§4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolTarget {
    /// Bound to exactly one tool name.
    Named(String),
    /// Matches every tool.
    Wildcard,
}

impl ToolTarget {
    /// Construct a target from a name, treating the literal string `"*"`
    /// as the wildcard — mirrors the YAML grammar's `tool: "*"` spelling.
    pub fn from_str(tool: impl Into<String>) -> Self {
        let tool = tool.into();
        if tool == "*" {
            ToolTarget::Wildcard
        } else {
            ToolTarget::Named(tool)
        }
    }

    /// Whether this target applies to `tool_name`.
    pub fn matches(&self, tool_name: &str) -> bool {
        match self {
            ToolTarget::Named(name) => name == tool_name,
            ToolTarget::Wildcard => true,
        }
    }
}
