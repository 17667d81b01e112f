//! Step registry and dispatch.
//!
//! Steps are the callable units a pipeline invokes: each registration
//! carries a [`StepMetadata`] (category, security level, parameter schema,
//! suspending flag) and an async handler. Dispatch validates arguments
//! against the schema, consults the [`SandboxPolicy`], bridges the pipeline
//! context into the handler's task, and records execution statistics.

pub mod builtin;
pub mod metadata;
pub mod registry;
pub mod sandbox;
pub mod stats;

pub use builtin::{BuiltinSteps, register_builtins};
pub use metadata::{ParamSpec, StepMetadata};
pub use registry::{StepCall, StepError, StepFailure, StepHandler, StepRegistry, StepSet};
pub use sandbox::{PermissiveSandbox, SandboxError, SandboxPolicy, WorkspaceSandbox};
pub use stats::{RegistryStats, StepStats};
