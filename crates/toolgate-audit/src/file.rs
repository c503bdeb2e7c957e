//! File sink: append-mode JSONL, one object per emit (§4.5).

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::event::AuditEvent;
use crate::sink::Sink;

/// Opens `path` in append mode per `emit`, writes one JSON line, and
/// closes it. A mutex serializes concurrent emits so observers never see
/// torn lines.
pub struct FileSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSink {
    /// Target JSONL file. Parent directories must already exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn emit(&self, event: &AuditEvent) {
        let line = match serde_json::to_string(event) {
            Ok(s) => s,
            Err(err) => {
                tracing::error!(target: "toolgate.audit.file", error = %err, "failed to serialize audit event");
                return;
            }
        };

        let _guard = self.write_lock.lock().await;
        let file = OpenOptions::new().create(true).append(true).open(&self.path).await;
        let mut file = match file {
            Ok(f) => f,
            Err(err) => {
                tracing::error!(target: "toolgate.audit.file", path = %self.path.display(), error = %err, "failed to open audit log");
                return;
            }
        };
        if let Err(err) = file.write_all(line.as_bytes()).await {
            tracing::error!(target: "toolgate.audit.file", error = %err, "failed to write audit event");
            return;
        }
        if let Err(err) = file.write_all(b"\n").await {
            tracing::error!(target: "toolgate.audit.file", error = %err, "failed to write newline");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_event() -> AuditEvent {
        AuditEvent {
            call_id: Uuid::new_v4(),
            tool_name: "Bash".into(),
            action: crate::event::Action::CallAllow,
            reason: String::new(),
            timestamp: Utc::now(),
            policy_version: None,
            principal: None,
            decision_source: None,
            decision_name: None,
            hooks_evaluated: vec![],
            contracts_evaluated: vec![],
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn writes_jsonl_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = FileSink::new(&path);

        sink.emit(&sample_event()).await;
        sink.emit(&sample_event()).await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(parsed["tool_name"], "Bash");
        }
    }
}
