//! Protocol-shape extension traits (SPEC_FULL §4.10).
//!
//! Cost modeling, human-approval gates, and persistent storage backends
//! are explicitly out of scope (spec §1): "their protocol shapes are
//! defined; semantics are left to implementers." These traits are that
//! shape — grounded on `original_source/src/callguard/budget.py`,
//! `gates.py`, and `storage.py` respectively — and a minimal default
//! implementation of each. None of them are invoked by
//! `toolgate-pipeline`'s governance pipeline; they exist for host
//! applications to wire up.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::envelope::Envelope;

/// Estimates the monetary cost of a proposed call. Grounded on
/// `budget.py`'s `CostModel` protocol.
pub trait CostModel: Send + Sync {
    /// Estimated cost in USD for this call.
    fn estimate_cost(&self, envelope: &Envelope) -> f64;
}

/// A cost model that always estimates zero, for hosts that don't track
/// spend. Grounded on `budget.py`'s `DefaultCostModel`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroCostModel;

impl CostModel for ZeroCostModel {
    fn estimate_cost(&self, _envelope: &Envelope) -> f64 {
        0.0
    }
}

/// Status of a human-approval gate. Grounded on `gates.py`'s `GateStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    /// Awaiting a human decision.
    Pending,
    /// A human approved the call.
    Approved,
    /// A human denied the call.
    Denied,
    /// No decision arrived before the gate's deadline.
    TimedOut,
}

/// Decides whether a call requires human approval before it may proceed.
/// Grounded on `gates.py`'s `GatePolicy`. Actually suspending for a human
/// decision is out of scope; this trait only names the question being
/// asked.
pub trait GatePolicy: Send + Sync {
    /// Whether `envelope` requires human sign-off.
    fn requires_approval(&self, envelope: &Envelope) -> bool;
}

/// A gate policy that never requires approval.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoApprovalRequired;

impl GatePolicy for NoApprovalRequired {
    fn requires_approval(&self, _envelope: &Envelope) -> bool {
        false
    }
}

/// Pluggable persistence for session/bundle state. Grounded on
/// `storage.py`'s `StorageBackend` protocol. Not wired into the
/// governance pipeline (persistent session storage is out of scope); a
/// seam for host applications that want to survive restarts.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Fetch a previously stored value.
    async fn get(&self, key: &str) -> Option<serde_json::Value>;
    /// Store a value.
    async fn set(&self, key: &str, value: serde_json::Value);
    /// Remove a value.
    async fn delete(&self, key: &str);
    /// List all stored keys.
    async fn list_keys(&self) -> Vec<String>;
}

/// An in-memory [`StorageBackend`], grounded on `storage.py`'s
/// `MemoryBackend`. Data does not survive process restart.
#[derive(Debug, Default)]
pub struct MemoryStorageBackend {
    data: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl MemoryStorageBackend {
    /// An empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorageBackend {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.data.lock().unwrap().get(key).cloned()
    }

    async fn set(&self, key: &str, value: serde_json::Value) {
        self.data.lock().unwrap().insert(key.to_string(), value);
    }

    async fn delete(&self, key: &str) {
        self.data.lock().unwrap().remove(key);
    }

    async fn list_keys(&self) -> Vec<String> {
        self.data.lock().unwrap().keys().cloned().collect()
    }
}
