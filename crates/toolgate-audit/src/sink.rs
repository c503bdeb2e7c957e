//! The `Sink` trait every audit backend implements (§4.5).

use async_trait::async_trait;

use crate::event::AuditEvent;

/// A destination for audit events. `emit` may suspend but must never
/// raise out to the pipeline — implementations catch and log their own
/// errors.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver `event`.
    async fn emit(&self, event: &AuditEvent);
}
