//! Stdout sink: one JSON object per line, flushed after every write.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::event::AuditEvent;
use crate::sink::Sink;

/// Writes each event as a single JSON object followed by `\n` to stdout,
/// flushing after every write (§4.5).
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl StdoutSink {
    /// A new stdout sink.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sink for StdoutSink {
    async fn emit(&self, event: &AuditEvent) {
        let line = match serde_json::to_string(event) {
            Ok(s) => s,
            Err(err) => {
                tracing::error!(target: "toolgate.audit.stdout", error = %err, "failed to serialize audit event");
                return;
            }
        };
        let mut stdout = tokio::io::stdout();
        if let Err(err) = stdout.write_all(line.as_bytes()).await {
            tracing::error!(target: "toolgate.audit.stdout", error = %err, "failed to write audit event");
            return;
        }
        if let Err(err) = stdout.write_all(b"\n").await {
            tracing::error!(target: "toolgate.audit.stdout", error = %err, "failed to write newline");
            return;
        }
        if let Err(err) = stdout.flush().await {
            tracing::error!(target: "toolgate.audit.stdout", error = %err, "failed to flush stdout");
        }
    }
}
