use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::instrument;

use crate::context::{PipelineContext, with_pipeline_context};
use crate::event_bus::{Event, EventEmitter, NullEmitter};
use crate::logging::Logger;
use crate::monitor::{
    MonitorConfig, Monitored, ResourceEfficiency, ResourceLimits, ResourceMonitor, Violation,
};
use crate::pipeline::{Pipeline, PostActions, Stage, StepInvocation};
use crate::steps::{StepError, StepRegistry};
use crate::types::StageStatus;

/// Overall outcome of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Success,
    Failure,
}

impl JobStatus {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Success)
    }
}

/// Result of one stage that was actually started.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub name: String,
    pub status: StageStatus,
    pub duration_ms: u64,
    /// Value returned by the stage's last step.
    pub output: Option<Value>,
    pub error: Option<String>,
    /// Attached when the failure was a resource-limit violation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation: Option<Violation>,
}

/// Structured result handed back to the launcher's caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub status: JobStatus,
    /// Stage results in execution order; length equals the number of
    /// stages started, and only the last entry can be a failure.
    pub stages: Vec<StageResult>,
    pub env_snapshot: FxHashMap<String, String>,
    /// Correlation reference tying this result to its log stream.
    pub logs_ref: String,
    /// `actual/limit` ratios from monitored stages.
    #[serde(default)]
    pub resource_efficiency: Vec<ResourceEfficiency>,
}

impl JobResult {
    /// Failure result with no started stages (evaluation/launch errors).
    #[must_use]
    pub fn failed(logs_ref: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failure,
            stages: Vec::new(),
            env_snapshot: FxHashMap::default(),
            logs_ref: logs_ref.into(),
            resource_efficiency: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Tuning handed to the runner by the launcher.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunnerConfig {
    pub limits: ResourceLimits,
    pub monitor: MonitorConfig,
}

/// Stage scheduler: walks stages in declaration order, dispatching steps
/// through the registry under the execution's context.
///
/// Each stage is bracketed by `StageStart`/`StageEnd` events and time-boxed
/// under the resource monitor. Unexpected step errors are caught exactly
/// once — at the stage boundary — and become a Failure stage result; the
/// pipeline then stops iterating (fail-fast) but still runs post-execution
/// hooks. Cancellation converts to an Aborted stage result, and a resource
/// violation cancels the job.
pub struct PipelineRunner {
    registry: Arc<StepRegistry>,
    config: RunnerConfig,
}

impl PipelineRunner {
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self {
            registry,
            config: RunnerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Execute the pipeline to completion and assemble the job result.
    #[instrument(skip_all, fields(pipeline = %pipeline.name, execution = %ctx.execution_id()))]
    pub async fn execute(&self, pipeline: &Pipeline, ctx: Arc<PipelineContext>) -> JobResult {
        let emitter: Arc<dyn EventEmitter> = ctx
            .bus()
            .map(|bus| bus.emitter())
            .unwrap_or_else(|_| Arc::new(NullEmitter));
        let logger = ctx.logging().ok().map(|core| core.logger("runtime"));
        let monitor = match ctx.bus() {
            Ok(bus) => ResourceMonitor::new(bus.emitter()),
            Err(_) => ResourceMonitor::unobserved(),
        }
        .with_config(self.config.monitor);

        if let Ok(env) = ctx.env() {
            env.apply(pipeline.environment.iter().cloned());
        }

        let run = self.run_stages(pipeline, &ctx, &emitter, &logger, &monitor);
        let (stages, efficiency) = with_pipeline_context(Arc::clone(&ctx), run).await;

        let job_success = !stages.iter().any(|s| s.status.is_failure());
        let post = self.run_post_actions(
            &pipeline.post,
            job_success,
            &ctx,
            &logger,
            "pipeline post action",
        );
        with_pipeline_context(Arc::clone(&ctx), post).await;

        JobResult {
            status: if job_success {
                JobStatus::Success
            } else {
                JobStatus::Failure
            },
            stages,
            env_snapshot: ctx.env().map(|env| env.snapshot()).unwrap_or_default(),
            logs_ref: ctx.execution_id().to_string(),
            resource_efficiency: efficiency,
        }
    }

    async fn run_stages(
        &self,
        pipeline: &Pipeline,
        ctx: &Arc<PipelineContext>,
        emitter: &Arc<dyn EventEmitter>,
        logger: &Option<Logger>,
        monitor: &ResourceMonitor,
    ) -> (Vec<StageResult>, Vec<ResourceEfficiency>) {
        let mut results: Vec<StageResult> = Vec::new();
        let mut efficiency: Vec<ResourceEfficiency> = Vec::new();

        for stage in &pipeline.stages {
            let result = self
                .run_stage(stage, ctx, emitter, logger, monitor, &mut efficiency)
                .await;
            let stop = result.status != StageStatus::Success;
            results.push(result);
            if stop {
                break;
            }
        }
        (results, efficiency)
    }

    async fn run_stage(
        &self,
        stage: &Stage,
        ctx: &Arc<PipelineContext>,
        emitter: &Arc<dyn EventEmitter>,
        logger: &Option<Logger>,
        monitor: &ResourceMonitor,
        efficiency: &mut Vec<ResourceEfficiency>,
    ) -> StageResult {
        let _ = emitter.emit(Event::stage_start(&stage.name));
        if let Some(logger) = logger {
            logger.info(&format!("stage '{}' started", stage.name));
        }

        let started = Instant::now();
        let body = ctx.state().provide(
            "current_stage",
            json!(stage.name.clone()),
            self.run_steps(&stage.steps, ctx),
        );
        let outcome = monitor
            .run(ctx.execution_id(), self.config.limits, body)
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        let (status, output, error, violation) = match outcome {
            Monitored::Completed { value, stats } => {
                efficiency.extend(stats.efficiency);
                match value {
                    Ok(output) => (StageStatus::Success, output, None, None),
                    Err(err) if err.is_cancelled() => {
                        (StageStatus::Aborted, None, Some(err.to_string()), None)
                    }
                    Err(err) => (StageStatus::Failure, None, Some(err.to_string()), None),
                }
            }
            Monitored::Violated { violation, stats } => {
                efficiency.extend(stats.efficiency);
                // A violated execution cannot continue; cancel the job so
                // in-flight subtasks observe it at their next suspension.
                ctx.cancellation().cancel();
                (
                    StageStatus::Failure,
                    None,
                    Some(violation.to_string()),
                    Some(violation),
                )
            }
        };

        let _ = emitter.emit(Event::stage_end(&stage.name, duration_ms, status));
        if let Some(logger) = logger {
            match &error {
                Some(error) => {
                    logger.error(&format!("stage '{}' {}: {error}", stage.name, status))
                }
                None => logger.info(&format!(
                    "stage '{}' finished in {duration_ms} ms",
                    stage.name
                )),
            }
        }

        if let Some(post) = &stage.post {
            self.run_post_actions(
                post,
                status == StageStatus::Success,
                ctx,
                logger,
                "stage post action",
            )
            .await;
        }

        StageResult {
            name: stage.name.clone(),
            status,
            duration_ms,
            output,
            error,
            violation,
        }
    }

    /// Dispatch the stage's step sequence; the first error wins and is
    /// handled at the stage boundary.
    async fn run_steps(
        &self,
        steps: &[StepInvocation],
        ctx: &Arc<PipelineContext>,
    ) -> Result<Option<Value>, StepError> {
        let mut last_output = None;
        for invocation in steps {
            if ctx.cancellation().is_cancelled() {
                return Err(StepError::Failed {
                    step: invocation.step.clone(),
                    source: crate::context::CancelledError.into(),
                });
            }
            let value = self
                .registry
                .execute(&invocation.step, Arc::clone(ctx), invocation.args.clone())
                .await?;
            last_output = Some(value);
        }
        Ok(last_output)
    }

    /// Run hooks for the decided outcome: selected variant first, then
    /// `always`. Hook errors are logged and never override the status.
    async fn run_post_actions(
        &self,
        post: &PostActions,
        success: bool,
        ctx: &Arc<PipelineContext>,
        logger: &Option<Logger>,
        scope: &str,
    ) {
        for invocation in post.for_outcome(success) {
            let outcome = self
                .registry
                .execute(&invocation.step, Arc::clone(ctx), invocation.args.clone())
                .await;
            if let Err(err) = outcome {
                if let Some(logger) = logger {
                    logger.warn(&format!("{scope} '{}' failed: {err}", invocation.step));
                }
                tracing::warn!(
                    target: "pipewright::runtime",
                    step = %invocation.step,
                    %err,
                    "{scope} failed"
                );
            }
        }
    }
}
