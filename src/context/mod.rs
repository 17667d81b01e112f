//! Execution context: service locator, managers, and task-local discovery.
//!
//! A [`PipelineContext`] is created per launch and carries the pipeline
//! identity, a handle to the [`ServiceLocator`] (which owns the managers),
//! an ephemeral [`StateHolder`], and the job's [`CancelFlag`]. The runtime
//! installs it as a task-local so steps reach it through
//! [`current_pipeline_context`] without threading it through every
//! signature; [`spawn_in_context`] propagates it into spawned subtasks.

pub mod locator;
pub mod managers;
pub mod pipeline_context;
pub mod state_holder;
pub mod workspace;

pub use locator::{LocatorError, ServiceLocator};
pub use managers::{EnvironmentStore, ParameterError, ParameterStore};
pub use pipeline_context::{
    CancelFlag, CancelledError, PipelineContext, current_pipeline_context, spawn_in_context,
    with_pipeline_context,
};
pub use state_holder::StateHolder;
pub use workspace::{
    LocalWorkspace, Workspace, WorkspaceError, WorkspaceManager, WorkspaceWatcher,
};
