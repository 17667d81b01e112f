//! Pluggable collaborator seams.
//!
//! The core consumes these traits and never supplies more than a reference
//! implementation: script evaluation (the engine does not parse the DSL),
//! configuration loading, shared-library source retrieval, and concrete
//! agent runtimes (containers, remote workers). Everything here is
//! replaceable without touching the runtime.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::PipelineContext;
use crate::logging::LogConfig;
use crate::monitor::{MonitorConfig, ResourceLimits};
use crate::pipeline::{Agent, Pipeline};
use crate::runtime::JobResult;

/// Evaluation failure surfaced as a Failure job result with a banner.
///
/// The `Script` variant renders in the canonical evaluator shape
/// `ERROR <message> (<script>:<line>:<column>)`, which the launcher's
/// banner extraction understands.
#[derive(Debug, Error, Diagnostic)]
pub enum EvaluatorError {
    #[error("ERROR {message} ({script}:{line}:{column})")]
    #[diagnostic(code(pipewright::evaluator::script))]
    Script {
        message: String,
        script: String,
        line: usize,
        column: usize,
    },

    #[error("failed to read script '{path}': {message}")]
    #[diagnostic(code(pipewright::evaluator::io))]
    Io { path: String, message: String },

    #[error("script did not produce a pipeline: {message}")]
    #[diagnostic(code(pipewright::evaluator::not_a_pipeline))]
    NotAPipeline { message: String },
}

/// Evaluates a script path to a pipeline description. The core never
/// parses scripts itself.
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
    async fn evaluate(&self, path: &Path) -> Result<Pipeline, EvaluatorError>;
}

/// Reference evaluator for descriptions already in evaluated (JSON) form.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonEvaluator;

#[async_trait]
impl ScriptEvaluator for JsonEvaluator {
    async fn evaluate(&self, path: &Path) -> Result<Pipeline, EvaluatorError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EvaluatorError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        serde_json::from_str(&text).map_err(|e| EvaluatorError::Script {
            message: e.to_string(),
            script: path.display().to_string(),
            line: e.line().max(1),
            column: e.column().max(1),
        })
    }
}

/// Engine configuration in serde-friendly form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub limits: ResourceLimits,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    pub sample_interval_ms: u64,
    pub warn_threshold: f64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        let defaults = MonitorConfig::default();
        Self {
            sample_interval_ms: defaults.sample_interval.as_millis() as u64,
            warn_threshold: defaults.warn_threshold,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub queue_capacity: usize,
    pub pool_capacity: usize,
    pub batch_size: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        let defaults = LogConfig::default();
        Self {
            queue_capacity: defaults.queue_capacity,
            pool_capacity: defaults.pool_capacity,
            batch_size: defaults.batch_size,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            sample_interval: std::time::Duration::from_millis(self.monitor.sample_interval_ms),
            warn_threshold: self.monitor.warn_threshold,
        }
    }

    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            queue_capacity: self.logging.queue_capacity,
            pool_capacity: self.logging.pool_capacity,
            batch_size: self.logging.batch_size,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("failed to load configuration from '{path}': {message}")]
#[diagnostic(code(pipewright::config::load))]
pub struct ConfigError {
    pub path: String,
    pub message: String,
}

/// Loads a structured configuration from a path.
pub trait ConfigurationLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<EngineConfig, ConfigError>;
}

/// Reference loader for JSON configuration files.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonConfigLoader;

impl ConfigurationLoader for JsonConfigLoader {
    fn load(&self, path: &Path) -> Result<EngineConfig, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

/// A shared library requested by a pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

/// Retrieval failures are fatal to the affected stage only.
#[derive(Debug, Error, Diagnostic)]
pub enum RetrieverError {
    #[error("library '{name}' not found")]
    #[diagnostic(code(pipewright::retriever::library_not_found))]
    LibraryNotFound { name: String },

    #[error("source for library '{name}' not found")]
    #[diagnostic(code(pipewright::retriever::source_not_found))]
    SourceNotFound { name: String },

    #[error("jar file for library '{name}' not found at '{path}'")]
    #[diagnostic(code(pipewright::retriever::jar_not_found))]
    JarFileNotFound { name: String, path: String },
}

/// Fetches a library's artifact for use by the execution.
#[async_trait]
pub trait SourceRetriever: Send + Sync {
    async fn retrieve(&self, library: &LibraryConfig) -> Result<PathBuf, RetrieverError>;
}

#[derive(Debug, Error, Diagnostic)]
pub enum AgentError {
    #[error("no agent manager can handle agent kind '{kind}'")]
    #[diagnostic(
        code(pipewright::agent::unsupported),
        help("Register an agent manager for this agent kind on the launcher.")
    )]
    Unsupported { kind: &'static str },

    #[error("agent execution failed: {message}")]
    #[diagnostic(code(pipewright::agent::failed))]
    Failed { message: String },
}

/// Concrete execution environment for non-`Any` agents.
#[async_trait]
pub trait AgentManager: Send + Sync {
    /// Whether this manager can run the given agent description.
    fn can_handle(&self, agent: &Agent) -> bool;

    /// Run the whole pipeline inside the agent's environment.
    async fn execute(
        &self,
        pipeline: &Pipeline,
        ctx: Arc<PipelineContext>,
    ) -> Result<JobResult, AgentError>;
}
