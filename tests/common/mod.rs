//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pipewright::context::{
    EnvironmentStore, ParameterStore, PipelineContext, ServiceLocator, WorkspaceManager,
};
use pipewright::event_bus::{Event, MemorySink, PipelineEventBus, StageEvent};
use pipewright::logging::{LogConfig, LoggingCore, MemoryConsumer};
use pipewright::secrets::SecretStore;
use pipewright::steps::StepRegistry;

/// Fully-wired engine environment backed by in-memory observers.
pub struct TestHarness {
    pub services: Arc<ServiceLocator>,
    pub env: Arc<EnvironmentStore>,
    pub secrets: Arc<SecretStore>,
    pub logging: Arc<LoggingCore>,
    pub log_sink: MemoryConsumer,
    pub bus: Arc<PipelineEventBus>,
    pub bus_sink: MemorySink,
    pub registry: Arc<StepRegistry>,
    // Held so the workspace directory outlives the harness.
    _workspace: tempfile::TempDir,
}

impl TestHarness {
    /// Requires a running Tokio runtime (the logging core and bus spawn
    /// tasks).
    pub fn new() -> Self {
        let services = Arc::new(ServiceLocator::new());

        let env = Arc::new(EnvironmentStore::new());
        services.register(Arc::clone(&env));
        services.register(Arc::new(ParameterStore::new()));

        let secrets = Arc::new(SecretStore::new(Arc::clone(&env)));
        services.register(Arc::clone(&secrets));

        let logging = Arc::new(LoggingCore::new(LogConfig::default()));
        let log_sink = MemoryConsumer::new();
        logging.add_consumer(Arc::new(log_sink.clone()));
        services.register(Arc::clone(&logging));

        let bus_sink = MemorySink::new();
        let bus = Arc::new(PipelineEventBus::with_sink(bus_sink.clone()));
        bus.listen_for_events();
        services.register(Arc::clone(&bus));

        let workspace = tempfile::tempdir().expect("tempdir");
        services.register(Arc::new(
            WorkspaceManager::local(workspace.path()).expect("workspace"),
        ));

        Self {
            services,
            env,
            secrets,
            logging,
            log_sink,
            bus,
            bus_sink,
            registry: Arc::new(StepRegistry::with_builtins()),
            _workspace: workspace,
        }
    }

    pub fn ctx(&self, pipeline_name: &str) -> Arc<PipelineContext> {
        Arc::new(PipelineContext::new(
            pipeline_name,
            Arc::clone(&self.services),
        ))
    }

    /// Give the delivery tasks a moment to drain.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    /// Stage lifecycle events captured so far, as `(scope, stage)` pairs in
    /// delivery order.
    pub fn stage_events(&self) -> Vec<(String, String)> {
        self.bus_sink
            .snapshot()
            .into_iter()
            .filter_map(|event| match event {
                Event::Stage(StageEvent::Start { stage, .. }) => {
                    Some(("start".to_string(), stage))
                }
                Event::Stage(StageEvent::End { stage, .. }) => Some(("end".to_string(), stage)),
                _ => None,
            })
            .collect()
    }
}
