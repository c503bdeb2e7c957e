//! Immutable per-call record and the tool → side-effect registry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification of how reversible a tool's effects are, used to phrase
/// post-contract warnings (§4.5) and to seed registry defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// No observable effect (e.g. a pure read).
    None,
    /// Re-running the call produces the same end state.
    Idempotent,
    /// The effect can be undone, but doing so is not automatic.
    Reversible,
    /// The effect cannot be undone.
    Irreversible,
}

/// Broad category used only to seed [`ToolRegistry::register_defaults`];
/// not persisted on the envelope itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Pure reads (file reads, queries).
    Read,
    /// Content-producing writes.
    Write,
    /// Arbitrary shell execution.
    Shell,
}

impl ToolKind {
    fn default_side_effect(self) -> SideEffect {
        match self {
            ToolKind::Read => SideEffect::None,
            ToolKind::Write => SideEffect::Idempotent,
            ToolKind::Shell => SideEffect::Irreversible,
        }
    }
}

/// Identity of the caller proposing a tool call. Every field is optional;
/// `claims` defaults to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Human or service user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Service account id, when the caller is a service rather than a human.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    /// Organization id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    /// Role label (e.g. "admin", "readonly").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// External ticket/request reference, for audit correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_ref: Option<String>,
    /// Arbitrary additional claims (e.g. from a signed token).
    #[serde(default)]
    pub claims: BTreeMap<String, serde_json::Value>,
}

/// Immutable per-call record supplied to every hook and contract.
///
/// An `Envelope` is built once via [`EnvelopeBuilder`] and never mutated
/// afterwards — there is no setter. A `modify` hook decision produces a
/// *new* envelope (see [`Envelope::with_tool_input`]) rather than mutating
/// the original in place, so "the rest of the envelope is unchanged" (§4.3)
/// holds by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    call_id: Uuid,
    tool_name: String,
    tool_input: serde_json::Map<String, serde_json::Value>,
    timestamp: DateTime<Utc>,
    session_id: Option<String>,
    side_effect: SideEffect,
    environment: String,
    principal: Option<Principal>,
}

impl Envelope {
    /// Start building an envelope for the given tool.
    #[must_use]
    pub fn builder(tool_name: impl Into<String>) -> EnvelopeBuilder {
        EnvelopeBuilder::new(tool_name)
    }

    /// Unique identifier generated on construction.
    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    /// Tool identifier, matched against contracts and hooks.
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// The call's arguments.
    pub fn tool_input(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.tool_input
    }

    /// Wall-clock of envelope creation, UTC.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Link to the owning [`crate::Session`], if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Side-effect classification for this call.
    pub fn side_effect(&self) -> SideEffect {
        self.side_effect
    }

    /// Free-form environment label (e.g. `"production"`, `"staging"`).
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// The calling principal, if supplied.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Reads a dotted path into `tool_input`, e.g. `"request.headers.auth"`.
    /// Returns `None` if any intermediate key is missing or the traversal
    /// hits a non-object value before reaching the end of the path.
    pub fn get_arg(&self, dotted_path: &str) -> Option<&serde_json::Value> {
        let mut segments = dotted_path.split('.');
        let first = segments.next()?;
        let mut current = self.tool_input.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Canonical convention: returns `tool_input["command"]` iff
    /// `tool_name == "Bash"`. Hooks and YAML selectors rely on this exact
    /// behavior, so it must not be generalized to other tool names.
    pub fn bash_command(&self) -> Option<&str> {
        if self.tool_name != "Bash" {
            return None;
        }
        self.tool_input.get("command").and_then(|v| v.as_str())
    }

    /// Produce a new envelope with `tool_input` replaced; every other field
    /// is copied unchanged. Used by `modify` hook decisions.
    #[must_use]
    pub fn with_tool_input(&self, tool_input: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            tool_input,
            ..self.clone()
        }
    }
}

/// Builder for [`Envelope`]. Normalizes inputs per §4.1: `tool_input` is
/// shallow-copied (it's already owned here, so this is simply "takes
/// ownership"), `principal.claims` is deep-copied (`serde_json::Value`
/// clones have value semantics, so a plain `.clone()` can never alias the
/// caller's map), and the timestamp defaults to the wall clock at
/// construction.
pub struct EnvelopeBuilder {
    tool_name: String,
    tool_input: serde_json::Map<String, serde_json::Value>,
    timestamp: Option<DateTime<Utc>>,
    session_id: Option<String>,
    side_effect: SideEffect,
    environment: String,
    principal: Option<Principal>,
}

impl EnvelopeBuilder {
    /// Start a new builder for `tool_name`, with `environment` defaulting
    /// to `"development"` and `side_effect` to [`SideEffect::None`].
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_input: serde_json::Map::new(),
            timestamp: None,
            session_id: None,
            side_effect: SideEffect::None,
            environment: "development".to_string(),
            principal: None,
        }
    }

    /// Set the call's arguments.
    #[must_use]
    pub fn tool_input(mut self, tool_input: serde_json::Map<String, serde_json::Value>) -> Self {
        self.tool_input = tool_input;
        self
    }

    /// Override the construction timestamp (primarily for tests).
    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Link this envelope to a session id.
    #[must_use]
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the side-effect classification.
    #[must_use]
    pub fn side_effect(mut self, side_effect: SideEffect) -> Self {
        self.side_effect = side_effect;
        self
    }

    /// Set the environment label.
    #[must_use]
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Attach a principal (deep-copied on `build`).
    #[must_use]
    pub fn principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Finalize the envelope.
    #[must_use]
    pub fn build(self) -> Envelope {
        Envelope {
            call_id: Uuid::new_v4(),
            tool_name: self.tool_name,
            tool_input: self.tool_input,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            session_id: self.session_id,
            side_effect: self.side_effect,
            environment: self.environment,
            principal: self.principal,
        }
    }
}

/// Mapping from `tool_name` to [`SideEffect`]. Unknown tools resolve to
/// [`SideEffect::None`].
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    side_effects: BTreeMap<String, SideEffect>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicitly set (or override) the side effect for a tool.
    pub fn register(&mut self, tool_name: impl Into<String>, side_effect: SideEffect) {
        self.side_effects.insert(tool_name.into(), side_effect);
    }

    /// Seed a default side effect for `tool_name` based on `kind`.
    /// Idempotent: only inserts when the tool has no existing entry.
    pub fn register_defaults(&mut self, tool_name: impl Into<String>, kind: ToolKind) {
        self.side_effects
            .entry(tool_name.into())
            .or_insert_with(|| kind.default_side_effect());
    }

    /// The side effect registered for `tool_name`, or [`SideEffect::None`]
    /// if unknown.
    pub fn side_effect(&self, tool_name: &str) -> SideEffect {
        self.side_effects
            .get(tool_name)
            .copied()
            .unwrap_or(SideEffect::None)
    }
}
