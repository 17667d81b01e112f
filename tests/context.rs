mod common;

use std::sync::Arc;

use serde_json::json;

use common::TestHarness;
use pipewright::context::{
    EnvironmentStore, LocatorError, ServiceLocator, current_pipeline_context, spawn_in_context,
    with_pipeline_context,
};
use pipewright::logging::current_log_context;
use pipewright::secrets::SecretStore;

#[tokio::test]
async fn missing_manager_errors_name_the_type() {
    let services = Arc::new(ServiceLocator::new());
    let err = services.get::<SecretStore>().unwrap_err();
    match err {
        LocatorError::NoSuchService { type_name, .. } => {
            assert!(type_name.contains("SecretStore"));
        }
        other => panic!("expected NoSuchService, got {other:?}"),
    }
}

#[tokio::test]
async fn context_accessors_resolve_registered_managers() {
    let harness = TestHarness::new();
    let ctx = harness.ctx("p");
    assert!(ctx.env().is_ok());
    assert!(ctx.params().is_ok());
    assert!(ctx.secrets().is_ok());
    assert!(ctx.workspace().is_ok());
    assert!(ctx.logging().is_ok());
    assert!(ctx.bus().is_ok());
}

#[tokio::test]
async fn bare_locator_context_reports_missing_env() {
    let services = Arc::new(ServiceLocator::new());
    let ctx = Arc::new(pipewright::context::PipelineContext::new("p", services));
    assert!(matches!(
        ctx.env(),
        Err(LocatorError::NoSuchService { .. })
    ));
}

#[tokio::test]
async fn pipeline_context_carries_the_log_correlation() {
    let harness = TestHarness::new();
    let ctx = harness.ctx("corr");
    let execution_id = ctx.execution_id().to_string();
    with_pipeline_context(ctx, async move {
        let log_ctx = current_log_context().expect("log context installed");
        assert_eq!(log_ctx.correlation_id.as_deref(), Some(execution_id.as_str()));
        assert_eq!(
            log_ctx.extra.get("pipeline").map(String::as_str),
            Some("corr")
        );
    })
    .await;
}

#[tokio::test]
async fn state_holder_flows_through_context_and_subtasks() {
    let harness = TestHarness::new();
    let ctx = harness.ctx("p");
    with_pipeline_context(Arc::clone(&ctx), async move {
        let current = current_pipeline_context().expect("ctx");
        current
            .state()
            .provide("current_stage", json!("Build"), async {
                // A spawned subtask inherits the context and observes the
                // provided value through it.
                let handle = spawn_in_context(async {
                    let inner = current_pipeline_context().expect("inherited ctx");
                    inner.state().consume("current_stage")
                });
                assert_eq!(handle.await.unwrap(), Some(json!("Build")));
            })
            .await;
        assert_eq!(current.state().consume("current_stage"), None);
    })
    .await;
}

#[tokio::test]
async fn remember_is_shared_across_clones_of_the_context() {
    let harness = TestHarness::new();
    let ctx = harness.ctx("p");
    let first = ctx.state().remember("answer", || json!(41));
    let second = ctx.state().remember("answer", || json!(99));
    assert_eq!(first, json!(41));
    assert_eq!(second, json!(41));
    ctx.state().invalidate();
    assert_eq!(ctx.state().remember("answer", || json!(99)), json!(99));
}

#[tokio::test]
async fn workspace_watcher_emits_file_lifecycle_events() {
    use pipewright::context::WorkspaceWatcher;
    use pipewright::event_bus::FileChangeKind;

    let harness = TestHarness::new();
    let ctx = harness.ctx("p");
    let workspace = ctx.workspace().unwrap().current();
    let watcher = WorkspaceWatcher::new(Arc::clone(&workspace), harness.bus.emitter());

    // Baseline scan of the empty workspace.
    assert!(watcher.scan().is_empty());

    let path = workspace.resolve("artifact.txt").unwrap();
    std::fs::write(&path, "v1").unwrap();
    let created = watcher.scan();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].kind, FileChangeKind::Created);

    std::fs::write(&path, "version-two").unwrap();
    let modified = watcher.scan();
    assert_eq!(modified.len(), 1);
    assert_eq!(modified[0].kind, FileChangeKind::Modified);

    std::fs::remove_file(&path).unwrap();
    let deleted = watcher.scan();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].kind, FileChangeKind::Deleted);

    // The same changes were published on the bus.
    harness.settle().await;
    let file_events = harness
        .bus_sink
        .snapshot()
        .into_iter()
        .filter(|e| matches!(e, pipewright::event_bus::Event::File(_)))
        .count();
    assert_eq!(file_events, 3);
}

#[tokio::test]
async fn environment_mutations_stay_inside_the_execution() {
    let services = Arc::new(ServiceLocator::new());
    services.register(Arc::new(EnvironmentStore::new()));
    let ctx = Arc::new(pipewright::context::PipelineContext::new("p", services));
    ctx.env().unwrap().set("SCOPED", "yes");
    assert!(std::env::var("SCOPED").is_err());
    assert_eq!(ctx.env().unwrap().get("SCOPED").as_deref(), Some("yes"));
}
