use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::locator::{LocatorError, ServiceLocator};
use super::managers::{EnvironmentStore, ParameterStore};
use super::state_holder::StateHolder;
use super::workspace::WorkspaceManager;
use crate::event_bus::PipelineEventBus;
use crate::logging::{LogContext, LoggingCore, current_log_context, with_log_context};
use crate::secrets::SecretStore;

/// Raised when a step observes cooperative cancellation.
#[derive(Debug, Error, Diagnostic)]
#[error("execution cancelled")]
#[diagnostic(code(pipewright::context::cancelled))]
pub struct CancelledError;

/// Cooperative cancellation flag shared by a job and its observers.
///
/// Cancellation is observed at suspension points: running steps call
/// [`Self::check`] (or await [`Self::cancelled`]) and convert the signal
/// into an aborted stage result. A timeout is cancellation with a deadline
/// ([`Self::cancel_after`]).
#[derive(Clone, Debug)]
pub struct CancelFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the flag. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Cancel once `deadline` elapses, unless the job finishes first.
    pub fn cancel_after(&self, deadline: Duration) {
        let flag = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            flag.cancel();
        });
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Error if the flag is set; called by steps between suspension points.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }

    /// Resolve once the flag is set.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if *rx.borrow_and_update() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        // Sender gone without cancelling; treat as never-cancelled.
        std::future::pending::<()>().await;
    }
}

/// Per-execution bundle passed (implicitly) to every step.
///
/// Carries the pipeline identity, a borrowed handle to the service locator
/// (which owns the managers), an ephemeral [`StateHolder`], and the job's
/// [`CancelFlag`]. One context is created per launch and exclusively owned
/// by that execution.
///
/// Steps normally reach the context through [`current_pipeline_context`];
/// the runtime establishes it with [`with_pipeline_context`] and
/// [`spawn_in_context`] keeps it flowing into spawned subtasks.
pub struct PipelineContext {
    pipeline_id: Uuid,
    pipeline_name: String,
    execution_id: String,
    services: Arc<ServiceLocator>,
    state: StateHolder,
    cancellation: CancelFlag,
}

impl PipelineContext {
    pub fn new(pipeline_name: impl Into<String>, services: Arc<ServiceLocator>) -> Self {
        let pipeline_id = Uuid::new_v4();
        Self {
            pipeline_id,
            pipeline_name: pipeline_name.into(),
            execution_id: format!("exec-{}", pipeline_id.simple()),
            services,
            state: StateHolder::new(),
            cancellation: CancelFlag::new(),
        }
    }

    #[must_use]
    pub fn pipeline_id(&self) -> Uuid {
        self.pipeline_id
    }

    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    #[must_use]
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    #[must_use]
    pub fn services(&self) -> &Arc<ServiceLocator> {
        &self.services
    }

    #[must_use]
    pub fn state(&self) -> &StateHolder {
        &self.state
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancelFlag {
        &self.cancellation
    }

    /// Logging context carrying this execution's correlation id.
    #[must_use]
    pub fn log_context(&self) -> LogContext {
        LogContext::new()
            .with_correlation_id(self.execution_id.clone())
            .with_entry("pipeline", self.pipeline_name.clone())
    }

    // Typed manager accessors. Each failure names the missing manager type.

    pub fn env(&self) -> Result<Arc<EnvironmentStore>, LocatorError> {
        self.services.get::<EnvironmentStore>()
    }

    pub fn params(&self) -> Result<Arc<ParameterStore>, LocatorError> {
        self.services.get::<ParameterStore>()
    }

    pub fn secrets(&self) -> Result<Arc<SecretStore>, LocatorError> {
        self.services.get::<SecretStore>()
    }

    pub fn workspace(&self) -> Result<Arc<WorkspaceManager>, LocatorError> {
        self.services.get::<WorkspaceManager>()
    }

    pub fn logging(&self) -> Result<Arc<LoggingCore>, LocatorError> {
        self.services.get::<LoggingCore>()
    }

    pub fn bus(&self) -> Result<Arc<PipelineEventBus>, LocatorError> {
        self.services.get::<PipelineEventBus>()
    }
}

tokio::task_local! {
    static PIPELINE_CONTEXT: Arc<PipelineContext>;
}

/// Run `fut` with `ctx` as the current pipeline context for its dynamic
/// extent. The matching logging context (correlation id) is installed
/// alongside it.
pub async fn with_pipeline_context<F>(ctx: Arc<PipelineContext>, fut: F) -> F::Output
where
    F: Future,
{
    let log_ctx = ctx.log_context();
    PIPELINE_CONTEXT
        .scope(ctx, with_log_context(log_ctx, fut))
        .await
}

/// The pipeline context of the currently executing task, if any.
///
/// Set for the duration of every dispatched step call and preserved across
/// suspension points.
#[must_use]
pub fn current_pipeline_context() -> Option<Arc<PipelineContext>> {
    PIPELINE_CONTEXT.try_with(Arc::clone).ok()
}

/// Spawn a subtask inheriting the current pipeline and logging contexts.
///
/// Plain `tokio::spawn` loses task-locals; this wrapper re-establishes them
/// in the child so `current_pipeline_context()` keeps resolving. Replace
/// the inherited context by nesting [`with_pipeline_context`] inside the
/// spawned future.
pub fn spawn_in_context<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let pipeline_ctx = current_pipeline_context();
    let log_ctx = current_log_context();
    tokio::spawn(async move {
        match (pipeline_ctx, log_ctx) {
            (Some(ctx), _) => with_pipeline_context(ctx, fut).await,
            (None, Some(log_ctx)) => with_log_context(log_ctx, fut).await,
            (None, None) => fut.await,
        }
    })
}
