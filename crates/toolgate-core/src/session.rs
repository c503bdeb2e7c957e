//! Per-agent-run mutable state (§4.4).
//!
//! `abp-runtime::budget::BudgetTracker` grounds the counter shape here, but
//! its independent-per-dimension `AtomicU64`s are not strong enough: §5
//! requires that a session counter *read* used to enforce a limit and the
//! matching *increment* be atomic together with respect to other
//! concurrent `run()`s sharing the session — a compound operation, not a
//! set of independently-atomic ones. `Session` instead guards all counters
//! and history behind a single `tokio::sync::Mutex`, acquired briefly per
//! operation and never held across a suspending contract/hook/executor
//! call.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::envelope::Envelope;

struct SessionState {
    history: Vec<Envelope>,
    attempt_count: u64,
    execution_count: u64,
    tool_execution_counts: BTreeMap<String, u64>,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            history: Vec::new(),
            attempt_count: 0,
            execution_count: 0,
            tool_execution_counts: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }
}

/// Mutable per-agent-run record: observed envelopes, attempt/execution
/// counters, and arbitrary metadata.
pub struct Session {
    session_id: String,
    started_at: DateTime<Utc>,
    state: Mutex<SessionState>,
}

impl Session {
    /// Open a new session with a freshly stamped `started_at`.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            started_at: Utc::now(),
            state: Mutex::new(SessionState::new()),
        }
    }

    /// Unique session identifier.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// When this session was opened, UTC.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Record an attempt: appends `envelope` to history and increments the
    /// attempt counter, atomically. Must be called once per `run()`,
    /// before the governance pipeline reads `attempt_count()` — the
    /// pipeline's attempt-limit check assumes the current call is already
    /// counted (§4.7 step 1).
    pub async fn record_attempt(&self, envelope: Envelope) {
        let mut state = self.state.lock().await;
        state.attempt_count += 1;
        state.history.push(envelope);
    }

    /// Record that `tool_name` actually executed (the executor was
    /// invoked and did not get cancelled). Increments both the overall and
    /// per-tool execution counters atomically.
    pub async fn record_execution(&self, tool_name: &str) {
        let mut state = self.state.lock().await;
        state.execution_count += 1;
        *state
            .tool_execution_counts
            .entry(tool_name.to_string())
            .or_insert(0) += 1;
    }

    /// Total attempts regardless of outcome.
    pub async fn attempt_count(&self) -> u64 {
        self.state.lock().await.attempt_count
    }

    /// Total calls that were allowed and actually ran.
    pub async fn execution_count(&self) -> u64 {
        self.state.lock().await.execution_count
    }

    /// Executions of a specific tool.
    pub async fn tool_execution_count(&self, tool_name: &str) -> u64 {
        self.state
            .lock()
            .await
            .tool_execution_counts
            .get(tool_name)
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of every envelope observed so far, in call order.
    pub async fn history(&self) -> Vec<Envelope> {
        self.state.lock().await.history.clone()
    }

    /// Set a metadata entry.
    pub async fn set_metadata(&self, key: impl Into<String>, value: serde_json::Value) {
        self.state.lock().await.metadata.insert(key.into(), value);
    }

    /// Read a metadata entry.
    pub async fn metadata(&self, key: &str) -> Option<serde_json::Value> {
        self.state.lock().await.metadata.get(key).cloned()
    }
}
