//! The six literal end-to-end scenarios from the testable-properties section
//! of the governance spec, run against the real `Guard`/YAML stack.

use std::sync::{Arc, Mutex};

use toolgate_audit::{Action, AuditEvent, DecisionSource, Sink};
use toolgate_core::Session;
use toolgate_pipeline::{ExecutorError, FnToolExecutor, Guard, Mode};

/// Collects every emitted event in memory for assertions.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<AuditEvent>>,
}

#[async_trait::async_trait]
impl Sink for RecordingSink {
    async fn emit(&self, event: &AuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

impl RecordingSink {
    fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

fn sensitive_read_bundle() -> &'static str {
    r#"
apiVersion: toolgate/v1
kind: ContractBundle
metadata:
  name: sensitive-reads
contracts:
  - id: block-sensitive-reads
    type: pre
    tool: read_file
    when:
      args.path:
        contains_any: [".env", ".secret"]
    then:
      effect: deny
      message: "Sensitive file blocked."
"#
}

fn echo_executor() -> FnToolExecutor<impl Fn(serde_json::Value) -> std::future::Ready<Result<serde_json::Value, ExecutorError>>> {
    FnToolExecutor::new(|input| std::future::ready(Ok(serde_json::json!(format!("contents of {input}")))))
}

fn sensitive_path_input() -> serde_json::Map<String, serde_json::Value> {
    let mut input = serde_json::Map::new();
    input.insert("path".into(), serde_json::json!("/home/.env"));
    input
}

#[tokio::test]
async fn scenario_1_sensitive_read_deny() {
    let sink = Arc::new(RecordingSink::default());
    let guard = Guard::from_yaml_bytes(sensitive_read_bundle().as_bytes(), Mode::Enforce, vec![sink.clone()]).unwrap();
    let session = Session::new("s1");
    let executor = echo_executor();

    let err = guard
        .run("read_file", sensitive_path_input(), None, &executor, &session)
        .await
        .unwrap_err();

    match err {
        toolgate_pipeline::RunError::Denied(denied) => assert_eq!(denied.message, "Sensitive file blocked."),
        other => panic!("expected Denied, got {other:?}"),
    }

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, Action::CallDeny);
    assert_eq!(events[0].decision_source, Some(DecisionSource::Precondition));
}

#[tokio::test]
async fn scenario_2_observe_mode_executes_and_logs_would_deny() {
    let sink = Arc::new(RecordingSink::default());
    let guard = Guard::from_yaml_bytes(sensitive_read_bundle().as_bytes(), Mode::Observe, vec![sink.clone()]).unwrap();
    let session = Session::new("s1");
    let executor = echo_executor();

    let result = guard
        .run("read_file", sensitive_path_input(), None, &executor, &session)
        .await
        .unwrap();

    assert!(result.as_str().unwrap().contains("/home/.env"));

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, Action::CallWouldDeny);
}

#[tokio::test]
async fn scenario_3_per_tool_limit_denies_third_call() {
    let guard = Guard::builder()
        .limits(toolgate_core::SessionLimits {
            max_calls_per_tool: {
                let mut m = std::collections::BTreeMap::new();
                m.insert("bash".to_string(), 2);
                m
            },
            ..Default::default()
        })
        .build();
    let session = Session::new("s1");
    let executor = echo_executor();

    for _ in 0..2 {
        let mut input = serde_json::Map::new();
        input.insert("command".into(), serde_json::json!("ls"));
        guard.run("bash", input, None, &executor, &session).await.unwrap();
    }

    let mut input = serde_json::Map::new();
    input.insert("command".into(), serde_json::json!("ls"));
    let err = guard.run("bash", input, None, &executor, &session).await.unwrap_err();
    match err {
        toolgate_pipeline::RunError::Denied(denied) => {
            assert!(denied.message.contains("max_calls_per_tool"));
        }
        other => panic!("expected Denied, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_4_attempt_limit_preempts_before_any_hook() {
    let hook_ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let hook_ran_clone = hook_ran.clone();
    let hook = Arc::new(toolgate_core::FnBeforeHook::new(
        "marker",
        toolgate_core::ToolTarget::Wildcard,
        move |_env| {
            hook_ran_clone.store(true, std::sync::atomic::Ordering::SeqCst);
            toolgate_core::HookDecision::allow()
        },
    ));
    let guard = Guard::builder()
        .before_hook(hook)
        .limits(toolgate_core::SessionLimits {
            max_attempts: Some(1),
            ..Default::default()
        })
        .build();
    let session = Session::new("s1");
    let executor = echo_executor();

    guard
        .run("read_file", serde_json::Map::new(), None, &executor, &session)
        .await
        .unwrap();
    assert!(hook_ran.load(std::sync::atomic::Ordering::SeqCst));
    hook_ran.store(false, std::sync::atomic::Ordering::SeqCst);

    let err = guard
        .run("read_file", serde_json::Map::new(), None, &executor, &session)
        .await
        .unwrap_err();
    match err {
        toolgate_pipeline::RunError::Denied(_) => {}
        other => panic!("expected Denied, got {other:?}"),
    }
    assert!(!hook_ran.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn scenario_5_fail_closed_type_mismatch_denies() {
    let bundle = r#"
apiVersion: toolgate/v1
kind: ContractBundle
metadata:
  name: type-check
contracts:
  - id: type-check
    type: pre
    tool: custom_tool
    when:
      args.count:
        gt: 5
    then:
      effect: deny
"#;
    let guard = Guard::from_yaml_bytes(bundle.as_bytes(), Mode::Enforce, vec![]).unwrap();
    let session = Session::new("s1");
    let executor = echo_executor();

    let mut input = serde_json::Map::new();
    input.insert("count".into(), serde_json::json!("not_a_number"));

    let err = guard.run("custom_tool", input, None, &executor, &session).await.unwrap_err();
    match err {
        toolgate_pipeline::RunError::Denied(denied) => {
            assert!(denied.message.contains("type-check"));
        }
        other => panic!("expected Denied, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_6_modify_hook_composition() {
    let hook = Arc::new(toolgate_core::FnBeforeHook::new(
        "redirect-to-safe-path",
        toolgate_core::ToolTarget::from_str("write_file"),
        |_env| {
            let mut map = serde_json::Map::new();
            map.insert("path".into(), serde_json::json!("/safe/x"));
            toolgate_core::HookDecision::modify(map)
        },
    ));
    let sink = Arc::new(RecordingSink::default());
    let guard = Guard::builder().before_hook(hook).sink(sink.clone()).build();
    let session = Session::new("s1");

    let received_path = Arc::new(Mutex::new(None));
    let received_path_clone = received_path.clone();
    let executor = FnToolExecutor::new(move |input: serde_json::Value| {
        let received_path_clone = received_path_clone.clone();
        async move {
            *received_path_clone.lock().unwrap() = input.get("path").and_then(|v| v.as_str()).map(str::to_string);
            Ok(serde_json::json!("written"))
        }
    });

    let mut input = serde_json::Map::new();
    input.insert("path".into(), serde_json::json!("/tmp/x"));
    guard.run("write_file", input, None, &executor, &session).await.unwrap();

    assert_eq!(received_path.lock().unwrap().as_deref(), Some("/safe/x"));

    let events = sink.events();
    assert_eq!(events.iter().filter(|e| e.action == Action::CallModify).count(), 1);
    assert_eq!(events.iter().filter(|e| e.action == Action::CallAllow).count(), 1);
}
