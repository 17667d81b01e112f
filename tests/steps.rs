mod common;

use std::sync::Arc;

use serde_json::{Value, json};

use common::TestHarness;
use pipewright::context::current_pipeline_context;
use pipewright::steps::{
    ParamSpec, StepError, StepFailure, StepMetadata, StepRegistry, WorkspaceSandbox,
};
use pipewright::types::{ParamType, SecurityLevel, StepCategory};

fn trivial_meta(name: &str) -> StepMetadata {
    StepMetadata::new(name, "test step").security_level(SecurityLevel::Trusted)
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let registry = StepRegistry::new();
    registry
        .register(trivial_meta("twice"), |_call| async { Ok(Value::Null) })
        .unwrap();
    let err = registry
        .register(trivial_meta("twice"), |_call| async { Ok(Value::Null) })
        .unwrap_err();
    assert!(matches!(err, StepError::Duplicate { step } if step == "twice"));
}

#[tokio::test]
async fn unknown_step_errors_with_name() {
    let harness = TestHarness::new();
    let err = harness
        .registry
        .execute("missing", harness.ctx("p"), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, StepError::Unknown { step } if step == "missing"));
}

#[tokio::test]
async fn arity_and_types_are_validated() {
    let harness = TestHarness::new();
    let ctx = harness.ctx("p");

    // Too few arguments.
    let err = harness
        .registry
        .execute("echo", Arc::clone(&ctx), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, StepError::BadArgs { .. }), "got: {err:?}");

    // Wrong type.
    let err = harness
        .registry
        .execute("echo", Arc::clone(&ctx), vec![json!(42)])
        .await
        .unwrap_err();
    match err {
        StepError::BadArgs { step, reason } => {
            assert_eq!(step, "echo");
            assert!(reason.contains("message"));
            assert!(reason.contains("string"));
        }
        other => panic!("expected BadArgs, got {other:?}"),
    }

    // Too many arguments.
    let err = harness
        .registry
        .execute("echo", ctx, vec![json!("a"), json!("b")])
        .await
        .unwrap_err();
    assert!(matches!(err, StepError::BadArgs { .. }));
}

#[tokio::test]
async fn trailing_defaults_may_be_omitted() {
    let registry = StepRegistry::new();
    registry
        .register(
            trivial_meta("greet")
                .param(ParamSpec::required("name", ParamType::String))
                .param(ParamSpec::optional("greeting", ParamType::String)),
            |call| async move {
                let name = call.str_arg(0).unwrap_or_default();
                let greeting = call.str_arg(1).unwrap_or_else(|| "hello".to_string());
                Ok(json!(format!("{greeting}, {name}")))
            },
        )
        .unwrap();

    let harness = TestHarness::new();
    let out = registry
        .execute("greet", harness.ctx("p"), vec![json!("dev")])
        .await
        .unwrap();
    assert_eq!(out, json!("hello, dev"));
}

#[tokio::test]
async fn dispatch_bridges_the_pipeline_context() {
    let registry = StepRegistry::new();
    registry
        .register(trivial_meta("whoami"), |_call| async move {
            let ctx = current_pipeline_context()
                .ok_or_else(|| StepFailure::msg("no implicit context"))?;
            Ok(json!(ctx.pipeline_name()))
        })
        .unwrap();

    let harness = TestHarness::new();
    let out = registry
        .execute("whoami", harness.ctx("deploy-web"), vec![])
        .await
        .unwrap();
    assert_eq!(out, json!("deploy-web"));
}

#[tokio::test]
async fn stats_track_totals_and_failures() {
    let harness = TestHarness::new();
    let ctx = harness.ctx("p");

    harness
        .registry
        .execute("echo", Arc::clone(&ctx), vec![json!("one")])
        .await
        .unwrap();
    harness
        .registry
        .execute("echo", Arc::clone(&ctx), vec![json!("two")])
        .await
        .unwrap();
    let _ = harness
        .registry
        .execute("error", ctx, vec![json!("kaboom")])
        .await;

    let echo_stats = harness.registry.stats("echo").unwrap();
    assert_eq!(echo_stats.total, 2);
    assert_eq!(echo_stats.successes, 2);
    assert_eq!(echo_stats.total, echo_stats.successes + echo_stats.failures);
    assert!(echo_stats.last_success_at.is_some());

    let error_stats = harness.registry.stats("error").unwrap();
    assert_eq!(error_stats.total, 1);
    assert_eq!(error_stats.failures, 1);
    assert_eq!(error_stats.last_error.as_deref(), Some("kaboom"));

    let aggregate = harness.registry.registry_stats();
    assert_eq!(aggregate.total_executions, 3);
    assert_eq!(aggregate.total_failures, 1);
    assert!(aggregate.success_rate > 0.6 && aggregate.success_rate < 0.7);
}

#[tokio::test]
async fn registry_stats_count_categories_and_levels() {
    let registry = StepRegistry::with_builtins();
    let stats = registry.registry_stats();
    assert_eq!(stats.total_steps, registry.names().len());
    let util = stats
        .by_category
        .iter()
        .find(|(c, _)| *c == StepCategory::Util)
        .map(|(_, n)| *n)
        .unwrap_or(0);
    assert!(util >= 3);
    let restricted = stats
        .by_security_level
        .iter()
        .find(|(l, _)| *l == SecurityLevel::Restricted)
        .map(|(_, n)| *n)
        .unwrap_or(0);
    assert!(restricted >= 3);
}

#[tokio::test]
async fn isolated_steps_cannot_spawn_subprocesses_under_workspace_sandbox() {
    let registry = StepRegistry::new();
    registry
        .register(
            StepMetadata::new("sh", "isolated shell")
                .security_level(SecurityLevel::Isolated)
                .param(ParamSpec::required("script", ParamType::String)),
            |_call| async { Ok(Value::Null) },
        )
        .unwrap();
    registry.set_sandbox(Arc::new(WorkspaceSandbox::new()));

    let harness = TestHarness::new();
    let err = registry
        .execute("sh", harness.ctx("p"), vec![json!("true")])
        .await
        .unwrap_err();
    assert!(matches!(err, StepError::Sandbox(_)), "got: {err:?}");
}

#[tokio::test]
async fn workspace_steps_stay_inside_the_root() {
    let harness = TestHarness::new();
    let ctx = harness.ctx("p");

    harness
        .registry
        .execute(
            "write_file",
            Arc::clone(&ctx),
            vec![json!("out/notes.txt"), json!("hello file")],
        )
        .await
        .unwrap();
    let content = harness
        .registry
        .execute("read_file", Arc::clone(&ctx), vec![json!("out/notes.txt")])
        .await
        .unwrap();
    assert_eq!(content, json!("hello file"));

    let exists = harness
        .registry
        .execute("file_exists", Arc::clone(&ctx), vec![json!("out/notes.txt")])
        .await
        .unwrap();
    assert_eq!(exists, json!(true));

    // Traversal is refused at the workspace seam.
    let err = harness
        .registry
        .execute("read_file", ctx, vec![json!("../escape.txt")])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("workspace"), "got: {err}");
}

#[tokio::test]
async fn global_registry_carries_builtins() {
    let registry = StepRegistry::global();
    assert!(registry.contains("echo"));
    assert!(registry.contains("sh"));
    let meta = registry.metadata("delay").unwrap();
    assert!(meta.suspending);
    assert_eq!(meta.params.len(), 1);
}
