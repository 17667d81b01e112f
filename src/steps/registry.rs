use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use miette::Diagnostic;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

use super::metadata::StepMetadata;
use super::sandbox::{PermissiveSandbox, SandboxError, SandboxPolicy};
use super::stats::{RegistryStats, StepStats};
use crate::context::{CancelledError, LocatorError, PipelineContext, WorkspaceError,
    with_pipeline_context};
use crate::types::{SecurityLevel, StepCategory};

/// Failure produced by a step body.
#[derive(Debug, Error, Diagnostic)]
pub enum StepFailure {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cancelled(#[from] CancelledError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Locator(#[from] LocatorError),
}

impl StepFailure {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StepFailure::Cancelled(_))
    }
}

/// Dispatch-time errors.
#[derive(Debug, Error, Diagnostic)]
pub enum StepError {
    #[error("unknown step '{step}'")]
    #[diagnostic(
        code(pipewright::steps::unknown),
        help("Check the step name against the registry; registration happens before launch.")
    )]
    Unknown { step: String },

    #[error("duplicate step '{step}'")]
    #[diagnostic(code(pipewright::steps::duplicate))]
    Duplicate { step: String },

    #[error("bad args for step '{step}': {reason}")]
    #[diagnostic(code(pipewright::steps::bad_args))]
    BadArgs { step: String, reason: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("step '{step}' failed: {source}")]
    #[diagnostic(code(pipewright::steps::failed))]
    Failed {
        step: String,
        #[source]
        source: StepFailure,
    },
}

impl StepError {
    /// Whether the underlying cause was cooperative cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            StepError::Failed { source, .. } if source.is_cancelled()
        )
    }
}

/// Arguments handed to a step handler.
pub struct StepCall {
    pub ctx: Arc<PipelineContext>,
    pub args: Vec<Value>,
}

impl StepCall {
    /// Positional argument, or `Null` past the end (defaulted parameters).
    #[must_use]
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or(Value::Null)
    }

    /// Positional string argument; dispatch has already validated the type,
    /// so absence means a defaulted parameter.
    #[must_use]
    pub fn str_arg(&self, index: usize) -> Option<String> {
        self.args
            .get(index)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    #[must_use]
    pub fn int_arg(&self, index: usize) -> Option<i64> {
        self.args.get(index).and_then(Value::as_i64)
    }
}

pub type StepHandler = Arc<dyn Fn(StepCall) -> BoxFuture<'static, Result<Value, StepFailure>> + Send + Sync>;

/// Bulk registration of related steps (the package-scan analogue).
pub trait StepSet {
    fn register_into(&self, registry: &StepRegistry) -> Result<(), StepError>;
}

struct Registered {
    metadata: StepMetadata,
    handler: StepHandler,
    stats: Mutex<StepStats>,
}

/// Typed registry of callable steps with argument validation,
/// implicit-context injection, and per-step execution statistics.
///
/// Registration is read-mostly and may run concurrently with dispatch.
/// Stats are mutated under a per-step lock, coarse but rarely contended.
///
/// A process-wide registry is available through [`StepRegistry::global`]
/// for ergonomic setups, but every entry point accepts an explicit registry
/// so tests can stay isolated.
pub struct StepRegistry {
    steps: RwLock<FxHashMap<String, Arc<Registered>>>,
    sandbox: RwLock<Arc<dyn SandboxPolicy>>,
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StepRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: RwLock::new(FxHashMap::default()),
            sandbox: RwLock::new(Arc::new(PermissiveSandbox)),
        }
    }

    /// Registry pre-loaded with the built-in step set.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        if let Err(err) = super::builtin::register_builtins(&registry) {
            tracing::error!(target: "pipewright::steps", %err, "builtin registration failed");
        }
        registry
    }

    /// Process-wide shared registry with builtins registered.
    pub fn global() -> &'static StepRegistry {
        static GLOBAL: OnceLock<StepRegistry> = OnceLock::new();
        GLOBAL.get_or_init(StepRegistry::with_builtins)
    }

    /// Swap the sandbox policy consulted before every dispatch.
    pub fn set_sandbox(&self, sandbox: Arc<dyn SandboxPolicy>) {
        *self.sandbox.write() = sandbox;
    }

    /// Register a step. Fails with "duplicate step" when the name is taken.
    pub fn register<F, Fut>(&self, mut metadata: StepMetadata, handler: F) -> Result<(), StepError>
    where
        F: Fn(StepCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, StepFailure>> + Send + 'static,
    {
        let mut steps = self.steps.write();
        if steps.contains_key(&metadata.name) {
            return Err(StepError::Duplicate {
                step: metadata.name.clone(),
            });
        }
        metadata.registered_at = Utc::now();
        let name = metadata.name.clone();
        let handler: StepHandler = Arc::new(move |call| handler(call).boxed());
        steps.insert(
            name,
            Arc::new(Registered {
                metadata,
                handler,
                stats: Mutex::new(StepStats::default()),
            }),
        );
        Ok(())
    }

    /// Register every step of a [`StepSet`].
    pub fn register_set(&self, set: &dyn StepSet) -> Result<(), StepError> {
        set.register_into(self)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.steps.read().contains_key(name)
    }

    #[must_use]
    pub fn metadata(&self, name: &str) -> Option<StepMetadata> {
        self.steps.read().get(name).map(|r| r.metadata.clone())
    }

    /// Sorted step names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.steps.read().keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn stats(&self, name: &str) -> Option<StepStats> {
        self.steps.read().get(name).map(|r| r.stats.lock().clone())
    }

    /// Registry-wide aggregate counters.
    #[must_use]
    pub fn registry_stats(&self) -> RegistryStats {
        let steps = self.steps.read();
        let mut by_category: FxHashMap<StepCategory, usize> = FxHashMap::default();
        let mut by_security: FxHashMap<SecurityLevel, usize> = FxHashMap::default();
        let mut executions = 0u64;
        let mut failures = 0u64;
        for registered in steps.values() {
            *by_category.entry(registered.metadata.category).or_default() += 1;
            *by_security
                .entry(registered.metadata.security_level)
                .or_default() += 1;
            let stats = registered.stats.lock();
            executions += stats.total;
            failures += stats.failures;
        }
        RegistryStats {
            total_steps: steps.len(),
            by_category: StepCategory::ALL
                .iter()
                .filter_map(|c| by_category.get(c).map(|&n| (*c, n)))
                .collect(),
            by_security_level: SecurityLevel::ALL
                .iter()
                .filter_map(|l| by_security.get(l).map(|&n| (*l, n)))
                .collect(),
            total_executions: executions,
            total_failures: failures,
            success_rate: if executions == 0 {
                1.0
            } else {
                (executions - failures) as f64 / executions as f64
            },
        }
    }

    /// Dispatch `name` with `args` under `ctx`.
    ///
    /// Validates arity and argument types against the schema, consults the
    /// sandbox policy, bridges the pipeline context so
    /// [`crate::context::current_pipeline_context`] resolves inside the
    /// handler, and records timing and outcome into the step's stats.
    /// Failures are recorded, then re-raised.
    pub async fn execute(
        &self,
        name: &str,
        ctx: Arc<PipelineContext>,
        args: Vec<Value>,
    ) -> Result<Value, StepError> {
        let registered = self
            .steps
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StepError::Unknown {
                step: name.to_string(),
            })?;

        Self::validate_args(&registered.metadata, &args)?;
        self.sandbox.read().check_step(&registered.metadata, &ctx)?;

        let call = StepCall {
            ctx: Arc::clone(&ctx),
            args,
        };
        let started = Instant::now();
        let outcome = with_pipeline_context(ctx, (registered.handler)(call)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(value) => {
                registered.stats.lock().record_success(elapsed_ms);
                Ok(value)
            }
            Err(failure) => {
                registered
                    .stats
                    .lock()
                    .record_failure(elapsed_ms, &failure.to_string());
                Err(StepError::Failed {
                    step: name.to_string(),
                    source: failure,
                })
            }
        }
    }

    fn validate_args(metadata: &StepMetadata, args: &[Value]) -> Result<(), StepError> {
        if args.len() > metadata.arity() {
            return Err(StepError::BadArgs {
                step: metadata.name.clone(),
                reason: format!(
                    "expected at most {} argument(s), got {}",
                    metadata.arity(),
                    args.len()
                ),
            });
        }
        if args.len() < metadata.required_arity() {
            let missing = &metadata.params[args.len()];
            return Err(StepError::BadArgs {
                step: metadata.name.clone(),
                reason: format!("missing required parameter '{}'", missing.name),
            });
        }
        for (arg, param) in args.iter().zip(&metadata.params) {
            if !param.ty.accepts(arg) {
                return Err(StepError::BadArgs {
                    step: metadata.name.clone(),
                    reason: format!(
                        "parameter '{}' expects {}, got {}",
                        param.name,
                        param.ty,
                        json_kind(arg)
                    ),
                });
            }
        }
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
