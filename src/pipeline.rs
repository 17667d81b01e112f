//! Evaluated pipeline description.
//!
//! This is the immutable input to the runtime: the engine never parses the
//! textual DSL itself (a pluggable [`crate::interfaces::ScriptEvaluator`]
//! produces this form). Stages carry their step sequence as data —
//! [`StepInvocation`]s naming registered steps — which the runtime
//! dispatches lazily, in order.
//!
//! # Example
//!
//! ```rust
//! use pipewright::pipeline::{Pipeline, Stage, StepInvocation};
//! use serde_json::json;
//!
//! let pipeline = Pipeline::builder("build-and-test")
//!     .env("CI", "true")
//!     .stage(
//!         Stage::new("Build").with_step(StepInvocation::new("echo").with_arg(json!("compiling"))),
//!     )
//!     .stage(
//!         Stage::new("Test").with_step(StepInvocation::new("sh").with_arg(json!("cargo test"))),
//!     )
//!     .build()
//!     .unwrap();
//! assert_eq!(pipeline.stages.len(), 2);
//! ```

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Execution environment the pipeline requests.
///
/// `Any` runs in-process on the host; the container variants are handed to
/// a registered [`crate::interfaces::AgentManager`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Agent {
    #[default]
    Any,
    Docker {
        image: String,
        tag: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
    },
    Kubernetes {
        yaml: String,
        label: String,
    },
}

impl Agent {
    /// Telemetry-safe tag for this agent kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Agent::Any => "any",
            Agent::Docker { .. } => "docker",
            Agent::Kubernetes { .. } => "kubernetes",
        }
    }
}

/// One step call within a stage: the registered step name plus positional
/// arguments in evaluated (JSON) form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInvocation {
    pub step: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl StepInvocation {
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_arg(mut self, arg: Value) -> Self {
        self.args.push(arg);
        self
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }
}

/// Post-execution hooks, at stage or pipeline scope.
///
/// The outcome-specific list (`on_success` or `on_failure`) runs first,
/// then `always`. Hook failures are logged and never change an
/// already-decided status.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PostActions {
    #[serde(default)]
    pub always: Vec<StepInvocation>,
    #[serde(default)]
    pub on_success: Vec<StepInvocation>,
    #[serde(default)]
    pub on_failure: Vec<StepInvocation>,
}

impl PostActions {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.always.is_empty() && self.on_success.is_empty() && self.on_failure.is_empty()
    }

    /// Hooks applicable for `success`, selected variant first, then
    /// `always`.
    #[must_use]
    pub fn for_outcome(&self, success: bool) -> Vec<&StepInvocation> {
        let variant = if success {
            &self.on_success
        } else {
            &self.on_failure
        };
        variant.iter().chain(self.always.iter()).collect()
    }
}

/// An ordered execution unit: a named step sequence with an optional post
/// hook. Names are unique within a pipeline (enforced by the builder).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepInvocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<PostActions>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            post: None,
        }
    }

    #[must_use]
    pub fn with_step(mut self, step: StepInvocation) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn with_steps(mut self, steps: Vec<StepInvocation>) -> Self {
        self.steps = steps;
        self
    }

    #[must_use]
    pub fn with_post(mut self, post: PostActions) -> Self {
        self.post = Some(post);
        self
    }
}

/// The complete evaluated description handed to the launcher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    #[serde(default)]
    pub agent: Agent,
    #[serde(default)]
    pub stages: Vec<Stage>,
    /// Global environment, applied before the first stage. Entry order is
    /// irrelevant to semantics.
    #[serde(default)]
    pub environment: Vec<(String, String)>,
    #[serde(default)]
    pub post: PostActions,
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            agent: Agent::Any,
            stages: Vec::new(),
            environment: Vec::new(),
            post: PostActions::default(),
        }
    }

    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineBuildError {
    #[error("duplicate stage name '{name}'")]
    #[diagnostic(
        code(pipewright::pipeline::duplicate_stage),
        help("Stage names must be unique within a pipeline.")
    )]
    DuplicateStage { name: String },

    #[error("stage name must not be empty")]
    #[diagnostic(code(pipewright::pipeline::empty_stage_name))]
    EmptyStageName,
}

/// Builder validating the description as it is assembled.
pub struct PipelineBuilder {
    name: String,
    agent: Agent,
    stages: Vec<Stage>,
    environment: Vec<(String, String)>,
    post: PostActions,
}

impl PipelineBuilder {
    #[must_use]
    pub fn agent(mut self, agent: Agent) -> Self {
        self.agent = agent;
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    #[must_use]
    pub fn post(mut self, post: PostActions) -> Self {
        self.post = post;
        self
    }

    pub fn build(self) -> Result<Pipeline, PipelineBuildError> {
        let mut seen = std::collections::HashSet::new();
        for stage in &self.stages {
            if stage.name.is_empty() {
                return Err(PipelineBuildError::EmptyStageName);
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(PipelineBuildError::DuplicateStage {
                    name: stage.name.clone(),
                });
            }
        }
        Ok(Pipeline {
            name: self.name,
            agent: self.agent,
            stages: self.stages,
            environment: self.environment,
            post: self.post,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_rejects_duplicate_stage_names() {
        let err = Pipeline::builder("p")
            .stage(Stage::new("Build"))
            .stage(Stage::new("Build"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Build"));
    }

    #[test]
    fn post_actions_select_variant_then_always() {
        let post = PostActions {
            always: vec![StepInvocation::new("cleanup")],
            on_success: vec![StepInvocation::new("notify_ok")],
            on_failure: vec![StepInvocation::new("notify_fail")],
        };
        let on_failure: Vec<&str> = post
            .for_outcome(false)
            .iter()
            .map(|s| s.step.as_str())
            .collect();
        assert_eq!(on_failure, vec!["notify_fail", "cleanup"]);
    }

    #[test]
    fn description_round_trips_through_json() {
        let pipeline = Pipeline::builder("demo")
            .agent(Agent::Docker {
                image: "rust".into(),
                tag: "1.89".into(),
                host: None,
            })
            .env("CI", "true")
            .stage(Stage::new("A").with_step(StepInvocation::new("echo").with_arg(json!("hi"))))
            .build()
            .unwrap();
        let text = serde_json::to_string(&pipeline).unwrap();
        let back: Pipeline = serde_json::from_str(&text).unwrap();
        assert_eq!(back, pipeline);
    }
}
