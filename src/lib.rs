//! # Pipewright: CI/CD Pipeline Execution Engine
//!
//! Pipewright loads a user-authored pipeline description (stages, steps,
//! agents, environment, credentials), validates it, and executes it to
//! completion while enforcing resource limits, propagating a structured
//! context, and emitting a stream of observable events.
//!
//! ## Core Concepts
//!
//! - **Stages**: ordered execution units, each owning a step sequence and
//!   an optional post hook
//! - **Steps**: registered callable units with a category, security level,
//!   parameter schema, and execution statistics
//! - **Context**: per-execution bundle (identity, managers, state holder)
//!   carried as a task-local and available to every step
//! - **Events**: typed pub/sub records for stage lifecycle, file changes,
//!   and resource alerts
//! - **Monitor**: periodic usage sampling with early warnings and
//!   fail-fast limit violations
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use pipewright::context::{PipelineContext, ServiceLocator};
//! use pipewright::pipeline::{Pipeline, Stage, StepInvocation};
//! use pipewright::runtime::JobLauncher;
//! use pipewright::steps::StepRegistry;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pipeline = Pipeline::builder("hello")
//!     .stage(Stage::new("Greet").with_step(
//!         StepInvocation::new("echo").with_arg(json!("hello, pipewright")),
//!     ))
//!     .build()
//!     .unwrap();
//!
//! let registry = Arc::new(StepRegistry::with_builtins());
//! let ctx = Arc::new(PipelineContext::new("hello", Arc::new(ServiceLocator::new())));
//!
//! let result = JobLauncher::new(registry).launch(Ok(pipeline), ctx).await;
//! assert!(result.is_success());
//! # }
//! ```
//!
//! ## Observability
//!
//! Attach sinks to a [`event_bus::PipelineEventBus`] and register it (plus
//! a [`logging::LoggingCore`] and the managers) on a
//! [`context::ServiceLocator`]; the runtime resolves whatever is present
//! and degrades gracefully when a manager is absent.
//!
//! ## Module Guide
//!
//! - [`pipeline`] - evaluated pipeline description and builder
//! - [`runtime`] - stage scheduler and job launcher
//! - [`steps`] - step registry, dispatch, sandbox policy, builtins
//! - [`context`] - service locator, managers, task-local context
//! - [`secrets`] - typed secret storage bound to the environment scope
//! - [`monitor`] - resource limits, sampling, violations
//! - [`logging`] - pooled, queue-decoupled log pipeline
//! - [`event_bus`] - typed pub/sub with pluggable sinks
//! - [`validate`] - static script checks with quick fixes
//! - [`interfaces`] - pluggable collaborator seams

pub mod context;
pub mod event_bus;
pub mod interfaces;
pub mod logging;
pub mod monitor;
pub mod pipeline;
pub mod runtime;
pub mod secrets;
pub mod steps;
pub mod telemetry;
pub mod types;
pub mod validate;
