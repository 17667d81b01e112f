//! Built-in step set: the small vocabulary every pipeline can assume.
//!
//! All steps read their arguments positionally (dispatch has already
//! validated types against the schema) and reach managers through the
//! implicit pipeline context. `delay` and `sh` observe cooperative
//! cancellation at their suspension points.

use std::process::Stdio;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::metadata::{ParamSpec, StepMetadata};
use super::registry::{StepCall, StepError, StepFailure, StepRegistry, StepSet};
use crate::context::CancelledError;
use crate::types::{LogSource, ParamType, SecurityLevel, StepCategory};

/// The built-in steps as a [`StepSet`].
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinSteps;

impl StepSet for BuiltinSteps {
    fn register_into(&self, registry: &StepRegistry) -> Result<(), StepError> {
        register_builtins(registry)
    }
}

/// Register every built-in step into `registry`.
pub fn register_builtins(registry: &StepRegistry) -> Result<(), StepError> {
    registry.register(
        StepMetadata::new("echo", "Log a message at INFO level")
            .category(StepCategory::General)
            .security_level(SecurityLevel::Trusted)
            .param(ParamSpec::required("message", ParamType::String))
            .returns(ParamType::String),
        echo,
    )?;

    registry.register(
        StepMetadata::new("error", "Fail the current stage with a message")
            .category(StepCategory::General)
            .security_level(SecurityLevel::Trusted)
            .param(ParamSpec::required("message", ParamType::String)),
        error_step,
    )?;

    registry.register(
        StepMetadata::new("delay", "Suspend cooperatively for the given milliseconds")
            .category(StepCategory::Util)
            .security_level(SecurityLevel::Trusted)
            .param(ParamSpec::required("ms", ParamType::Int))
            .suspending(true),
        delay,
    )?;

    registry.register(
        StepMetadata::new("sh", "Run a shell command in the workspace")
            .category(StepCategory::Build)
            .security_level(SecurityLevel::Restricted)
            .param(ParamSpec::required("script", ParamType::String))
            .returns(ParamType::Int)
            .suspending(true),
        sh,
    )?;

    registry.register(
        StepMetadata::new("read_file", "Read a workspace-relative text file")
            .category(StepCategory::Util)
            .security_level(SecurityLevel::Restricted)
            .param(ParamSpec::required("path", ParamType::String))
            .returns(ParamType::String)
            .suspending(true),
        read_file,
    )?;

    registry.register(
        StepMetadata::new("write_file", "Write a workspace-relative text file")
            .category(StepCategory::Util)
            .security_level(SecurityLevel::Restricted)
            .param(ParamSpec::required("path", ParamType::String))
            .param(ParamSpec::required("content", ParamType::String))
            .suspending(true),
        write_file,
    )?;

    registry.register(
        StepMetadata::new("file_exists", "Whether a workspace-relative path exists")
            .category(StepCategory::Util)
            .security_level(SecurityLevel::Restricted)
            .param(ParamSpec::required("path", ParamType::String))
            .returns(ParamType::Bool),
        file_exists,
    )?;

    registry.register(
        StepMetadata::new("with_env", "Set an environment entry for this execution")
            .category(StepCategory::Util)
            .security_level(SecurityLevel::Trusted)
            .param(ParamSpec::required("name", ParamType::String))
            .param(ParamSpec::required("value", ParamType::String)),
        with_env,
    )?;

    Ok(())
}

async fn echo(call: StepCall) -> Result<Value, StepFailure> {
    let message = call.str_arg(0).unwrap_or_default();
    if let Ok(logging) = call.ctx.logging() {
        logging.logger("echo").info(&message);
    }
    Ok(json!(message))
}

async fn error_step(call: StepCall) -> Result<Value, StepFailure> {
    let message = call.str_arg(0).unwrap_or_else(|| "error step".to_string());
    Err(StepFailure::msg(message))
}

async fn delay(call: StepCall) -> Result<Value, StepFailure> {
    let ms = call.int_arg(0).unwrap_or(0).max(0) as u64;
    tokio::select! {
        () = tokio::time::sleep(Duration::from_millis(ms)) => Ok(Value::Null),
        () = call.ctx.cancellation().cancelled() => Err(CancelledError.into()),
    }
}

async fn sh(call: StepCall) -> Result<Value, StepFailure> {
    let script = call.str_arg(0).unwrap_or_default();

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(&script);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    if let Ok(manager) = call.ctx.workspace() {
        cmd.current_dir(manager.current().root());
    }

    let mut child = cmd.spawn()?;
    let logger = call.ctx.logging().ok().map(|core| core.logger("sh"));

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        let logger = logger.clone();
        readers.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(logger) = &logger {
                    logger.output_line(LogSource::Stdout, &line);
                }
            }
        }));
    }
    if let Some(stderr) = child.stderr.take() {
        let logger = logger.clone();
        readers.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(logger) = &logger {
                    logger.output_line(LogSource::Stderr, &line);
                }
            }
        }));
    }

    let status = tokio::select! {
        status = child.wait() => status?,
        () = call.ctx.cancellation().cancelled() => {
            let _ = child.kill().await;
            return Err(CancelledError.into());
        }
    };
    for reader in readers {
        let _ = reader.await;
    }

    if status.success() {
        Ok(json!(status.code().unwrap_or(0)))
    } else {
        Err(StepFailure::msg(format!(
            "sh exited with status {}",
            status.code().map_or_else(|| "signal".to_string(), |c| c.to_string())
        )))
    }
}

async fn read_file(call: StepCall) -> Result<Value, StepFailure> {
    let path = call.str_arg(0).unwrap_or_default();
    let workspace = call.ctx.workspace()?.current();
    let absolute = workspace.resolve(&path)?;
    let content = tokio::fs::read_to_string(absolute).await?;
    Ok(json!(content))
}

async fn write_file(call: StepCall) -> Result<Value, StepFailure> {
    let path = call.str_arg(0).unwrap_or_default();
    let content = call.str_arg(1).unwrap_or_default();
    let workspace = call.ctx.workspace()?.current();
    let absolute = workspace.resolve(&path)?;
    if let Some(parent) = absolute.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(absolute, content).await?;
    Ok(Value::Null)
}

async fn file_exists(call: StepCall) -> Result<Value, StepFailure> {
    let path = call.str_arg(0).unwrap_or_default();
    let workspace = call.ctx.workspace()?.current();
    Ok(json!(workspace.exists(&path)))
}

async fn with_env(call: StepCall) -> Result<Value, StepFailure> {
    let name = call.str_arg(0).unwrap_or_default();
    let value = call.str_arg(1).unwrap_or_default();
    call.ctx.env()?.set(name, value);
    Ok(Value::Null)
}
