use std::collections::HashSet;

use miette::Diagnostic;
use thiserror::Error;

use super::metadata::StepMetadata;
use crate::context::PipelineContext;
use crate::types::SecurityLevel;

#[derive(Debug, Error, Diagnostic)]
#[error("step '{step}' denied at security level {level}: {reason}")]
#[diagnostic(code(pipewright::sandbox::denied))]
pub struct SandboxError {
    pub step: String,
    pub level: SecurityLevel,
    pub reason: String,
}

/// Enforcement hook consulted by the dispatcher before every invocation.
///
/// The policy decides; the dispatcher carries out the refusal. Deeper
/// enforcement (syscall filtering, network namespaces) belongs to an
/// external sandbox runtime plugged in through this trait.
pub trait SandboxPolicy: Send + Sync {
    fn check_step(
        &self,
        metadata: &StepMetadata,
        ctx: &PipelineContext,
    ) -> Result<(), SandboxError>;
}

/// Allows every step regardless of level. The registry default.
#[derive(Clone, Copy, Debug, Default)]
pub struct PermissiveSandbox;

impl SandboxPolicy for PermissiveSandbox {
    fn check_step(
        &self,
        _metadata: &StepMetadata,
        _ctx: &PipelineContext,
    ) -> Result<(), SandboxError> {
        Ok(())
    }
}

/// Workspace-rooted policy.
///
/// - `Trusted` steps pass unconditionally.
/// - `Restricted` steps require a registered workspace manager, since
///   their file access is constrained to the workspace root.
/// - `Isolated` steps are additionally refused when they appear on the
///   process/network deny list (subprocesses and network access are
///   forbidden at that level).
pub struct WorkspaceSandbox {
    isolated_denied: HashSet<String>,
}

impl Default for WorkspaceSandbox {
    fn default() -> Self {
        Self {
            isolated_denied: ["sh"].into_iter().map(str::to_string).collect(),
        }
    }
}

impl WorkspaceSandbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the set of step names refused under `Isolated`.
    #[must_use]
    pub fn deny_isolated(mut self, step: impl Into<String>) -> Self {
        self.isolated_denied.insert(step.into());
        self
    }
}

impl SandboxPolicy for WorkspaceSandbox {
    fn check_step(
        &self,
        metadata: &StepMetadata,
        ctx: &PipelineContext,
    ) -> Result<(), SandboxError> {
        match metadata.security_level {
            SecurityLevel::Trusted => Ok(()),
            SecurityLevel::Restricted => {
                if ctx.workspace().is_err() {
                    return Err(SandboxError {
                        step: metadata.name.clone(),
                        level: SecurityLevel::Restricted,
                        reason: "no workspace registered to constrain file access".to_string(),
                    });
                }
                Ok(())
            }
            SecurityLevel::Isolated => {
                if self.isolated_denied.contains(&metadata.name) {
                    return Err(SandboxError {
                        step: metadata.name.clone(),
                        level: SecurityLevel::Isolated,
                        reason: "subprocess and network access are forbidden".to_string(),
                    });
                }
                if ctx.workspace().is_err() {
                    return Err(SandboxError {
                        step: metadata.name.clone(),
                        level: SecurityLevel::Isolated,
                        reason: "no workspace registered to constrain file access".to_string(),
                    });
                }
                Ok(())
            }
        }
    }
}
