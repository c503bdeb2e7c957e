//! YAML policy engine: bundle grammar, loader, expression evaluator, and
//! contract compiler (§4.6).
//!
//! [`load_bundle`] parses and validates a raw YAML bundle; [`compile_bundle`]
//! lowers it into [`toolgate_core::PreCondition`]/[`toolgate_core::PostCondition`]
//! trait objects plus an aggregated [`toolgate_core::SessionLimits`], ready
//! for a `toolgate-pipeline` Guard to register.

#![warn(missing_docs)]

mod bundle;
mod compiler;
mod error;
mod evaluator;
mod loader;

pub use bundle::{Bundle, BundleMetadata, ContractDef, ContractKind, Effect, SessionLimitsDef, ThenDef, API_VERSION, KIND};
pub use compiler::{compile_bundle, CompiledBundle};
pub use error::ConfigError;
pub use evaluator::{evaluate_expression, EvalResult};
pub use loader::{load_bundle, load_bundle_file, LoadedBundle, MAX_BUNDLE_SIZE};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use toolgate_core::PreCondition as _;

    const BUNDLE: &str = r#"
apiVersion: toolgate/v1
kind: ContractBundle
metadata:
  name: example
contracts:
  - id: block-sensitive-reads
    type: pre
    tool: read_file
    when:
      args.path:
        contains: ".env"
    then:
      effect: deny
      message: "Sensitive file blocked."
  - id: session-limits
    type: session
    limits:
      max_tool_calls: 50
      max_attempts: 120
"#;

    #[tokio::test]
    async fn load_then_compile_end_to_end() {
        let loaded = load_bundle(BUNDLE.as_bytes()).expect("loads");
        let compiled = compile_bundle(&loaded.bundle, loaded.policy_version.clone());

        assert_eq!(compiled.pre.len(), 1);
        assert!(compiled.post.is_empty());
        assert_eq!(compiled.limits.max_tool_calls, Some(50));
        assert_eq!(compiled.policy_version, loaded.policy_version);

        let mut input = serde_json::Map::new();
        input.insert("path".into(), serde_json::json!("/home/.env"));
        let env = toolgate_core::Envelope::builder("read_file").tool_input(input).build();

        let verdict = compiled.pre[0].check(&env).await;
        assert!(verdict.failed());
        assert_eq!(verdict.message, "Sensitive file blocked.");
    }
}
