use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use regex::Regex;

use super::runner::{JobResult, PipelineRunner, RunnerConfig};
use crate::context::PipelineContext;
use crate::event_bus::{Event, STREAM_END_SCOPE};
use crate::interfaces::{AgentManager, EvaluatorError, ScriptEvaluator};
use crate::pipeline::{Agent, Pipeline};
use crate::steps::StepRegistry;
use crate::telemetry::render_banner;
use crate::validate::ScriptValidator;

/// Hooks run around a whole job.
///
/// All `before_execute` hooks run concurrently and must complete before
/// stage execution begins; all `after_execute` hooks run concurrently once
/// the job result is known. The launcher awaits both sets.
#[async_trait]
pub trait JobListener: Send + Sync {
    async fn before_execute(&self, _ctx: &PipelineContext) {}
    async fn after_execute(&self, _ctx: &PipelineContext, _result: &JobResult) {}
}

/// Top-level orchestrator gluing an evaluated description to the runtime.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use pipewright::context::{PipelineContext, ServiceLocator};
/// use pipewright::pipeline::Pipeline;
/// use pipewright::runtime::JobLauncher;
/// use pipewright::steps::StepRegistry;
///
/// # async fn example(pipeline: Pipeline) {
/// let registry = Arc::new(StepRegistry::with_builtins());
/// let launcher = JobLauncher::new(Arc::clone(&registry));
/// let ctx = Arc::new(PipelineContext::new(
///     pipeline.name.clone(),
///     Arc::new(ServiceLocator::new()),
/// ));
/// let result = launcher.launch(Ok(pipeline), ctx).await;
/// assert!(result.is_success());
/// # }
/// ```
pub struct JobLauncher {
    registry: Arc<StepRegistry>,
    config: RunnerConfig,
    listeners: Vec<Arc<dyn JobListener>>,
    agents: Vec<Arc<dyn AgentManager>>,
    validator: Option<ScriptValidator>,
    timeout: Option<Duration>,
}

impl JobLauncher {
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self {
            registry,
            config: RunnerConfig::default(),
            listeners: Vec::new(),
            agents: Vec::new(),
            validator: Some(ScriptValidator::new()),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn JobListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    #[must_use]
    pub fn with_agent_manager(mut self, manager: Arc<dyn AgentManager>) -> Self {
        self.agents.push(manager);
        self
    }

    /// Disable the pre-execution validation gate.
    #[must_use]
    pub fn without_validation(mut self) -> Self {
        self.validator = None;
        self
    }

    /// Cancel the job when `timeout` elapses (cancellation with a
    /// deadline).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Gate, evaluate, and launch a script file.
    pub async fn launch_script(
        &self,
        evaluator: &dyn ScriptEvaluator,
        script: &Path,
        ctx: Arc<PipelineContext>,
    ) -> JobResult {
        if let Some(validator) = &self.validator {
            match tokio::fs::read_to_string(script).await {
                Ok(content) => {
                    let name = script
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| script.display().to_string());
                    let report = validator.validate(&content, &name);
                    if !report.ok() {
                        eprintln!("{}", report.render());
                        self.log_error(&ctx, &format!("script '{name}' failed validation"));
                        return JobResult::failed(ctx.execution_id());
                    }
                }
                Err(err) => {
                    let banner = render_banner(&format!(
                        "cannot read script '{}': {err}",
                        script.display()
                    ));
                    eprintln!("{banner}");
                    return JobResult::failed(ctx.execution_id());
                }
            }
        }
        let evaluated = evaluator.evaluate(script).await;
        self.launch(evaluated, ctx).await
    }

    /// Launch a pre-evaluated description.
    ///
    /// An evaluation error surfaces as a banner on stderr and a Failure
    /// job result with an empty stage list.
    pub async fn launch(
        &self,
        evaluated: Result<Pipeline, EvaluatorError>,
        ctx: Arc<PipelineContext>,
    ) -> JobResult {
        let pipeline = match evaluated {
            Ok(pipeline) => pipeline,
            Err(err) => {
                let banner = render_evaluation_banner(&err);
                eprintln!("{banner}");
                self.log_error(&ctx, &err.to_string());
                return JobResult::failed(ctx.execution_id());
            }
        };

        if let Some(deadline) = self.timeout {
            ctx.cancellation().cancel_after(deadline);
        }

        if !matches!(pipeline.agent, Agent::Any) {
            return self.launch_on_agent(&pipeline, ctx).await;
        }

        join_all(
            self.listeners
                .iter()
                .map(|listener| listener.before_execute(&ctx)),
        )
        .await;

        let runner = PipelineRunner::new(Arc::clone(&self.registry)).with_config(self.config);
        let result = runner.execute(&pipeline, Arc::clone(&ctx)).await;

        join_all(
            self.listeners
                .iter()
                .map(|listener| listener.after_execute(&ctx, &result)),
        )
        .await;

        self.finalize_event_stream(&ctx, &result);
        result
    }

    async fn launch_on_agent(&self, pipeline: &Pipeline, ctx: Arc<PipelineContext>) -> JobResult {
        let Some(manager) = self
            .agents
            .iter()
            .find(|manager| manager.can_handle(&pipeline.agent))
        else {
            let banner = render_banner(&format!(
                "no agent manager registered for agent kind '{}'",
                pipeline.agent.kind()
            ));
            eprintln!("{banner}");
            self.log_error(
                &ctx,
                &format!("unsupported agent kind '{}'", pipeline.agent.kind()),
            );
            return JobResult::failed(ctx.execution_id());
        };

        join_all(
            self.listeners
                .iter()
                .map(|listener| listener.before_execute(&ctx)),
        )
        .await;

        let result = match manager.execute(pipeline, Arc::clone(&ctx)).await {
            Ok(result) => result,
            Err(err) => {
                eprintln!("{}", render_banner(&err.to_string()));
                self.log_error(&ctx, &err.to_string());
                JobResult::failed(ctx.execution_id())
            }
        };

        join_all(
            self.listeners
                .iter()
                .map(|listener| listener.after_execute(&ctx, &result)),
        )
        .await;

        self.finalize_event_stream(&ctx, &result);
        result
    }

    /// Signal end-of-stream so subscribers tailing this job's events can
    /// terminate cleanly.
    fn finalize_event_stream(&self, ctx: &PipelineContext, result: &JobResult) {
        let Ok(bus) = ctx.bus() else {
            return;
        };
        let status = if result.is_success() {
            "completed"
        } else {
            "failed"
        };
        let message = format!("execution={} status={status}", ctx.execution_id());
        if let Err(err) = bus.emitter().emit(Event::diagnostic(STREAM_END_SCOPE, message)) {
            tracing::debug!(
                target: "pipewright::runtime",
                execution = %ctx.execution_id(),
                error = %err,
                "failed to emit stream termination event"
            );
        }
    }

    fn log_error(&self, ctx: &PipelineContext, message: &str) {
        if let Ok(logging) = ctx.logging() {
            logging.logger("launcher").error(message);
        }
    }
}

/// Render the evaluation-failure banner, extracting `error / line / column`
/// from the evaluator's message when it matches the canonical shape.
#[must_use]
pub fn render_evaluation_banner(err: &EvaluatorError) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"ERROR (.*) \(.*:(\d+):(\d+)\)").expect("valid pattern"));

    let text = err.to_string();
    let message = match pattern.captures(&text) {
        Some(captures) => format!(
            "evaluation failed: {} (line {}, column {})",
            &captures[1], &captures[2], &captures[3]
        ),
        None => format!("evaluation failed: {text}"),
    };
    render_banner(&message)
}
