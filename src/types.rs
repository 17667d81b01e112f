//! Core types for the pipewright execution engine.
//!
//! This module defines the fundamental vocabulary used throughout the engine:
//! stage outcomes, step classification, security levels, and the handful of
//! small enums shared by more than one area. Area-specific types live with
//! their area (`crate::monitor`, `crate::secrets`, `crate::validate`).
//!
//! # Examples
//!
//! ```rust
//! use pipewright::types::{StageStatus, StepCategory, SecurityLevel};
//!
//! let status = StageStatus::Success;
//! assert!(status.is_terminal());
//!
//! // Persistence round-trip
//! let encoded = StageStatus::Failure.encode();
//! assert_eq!(StageStatus::decode(encoded), StageStatus::Failure);
//!
//! assert_eq!(SecurityLevel::default(), SecurityLevel::Restricted);
//! assert_eq!(StepCategory::Build.to_string(), "build");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single stage within a pipeline run.
///
/// A stage that was never reached stays `NotStarted`; one skipped by an
/// earlier failure is `NotBuilt`. `Unstable` marks a stage that completed
/// with tolerated failures (e.g. test steps configured as non-fatal).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageStatus {
    NotStarted,
    Running,
    Success,
    Failure,
    Unstable,
    Aborted,
    NotBuilt,
}

impl StageStatus {
    /// True once the stage can no longer change state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StageStatus::NotStarted | StageStatus::Running)
    }

    /// True for outcomes that stop the pipeline from advancing.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, StageStatus::Failure | StageStatus::Aborted)
    }

    /// Encode into the persisted string form.
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            StageStatus::NotStarted => "NotStarted",
            StageStatus::Running => "Running",
            StageStatus::Success => "Success",
            StageStatus::Failure => "Failure",
            StageStatus::Unstable => "Unstable",
            StageStatus::Aborted => "Aborted",
            StageStatus::NotBuilt => "NotBuilt",
        }
    }

    /// Decode the persisted string form; unknown input maps to `NotStarted`
    /// for forward compatibility.
    #[must_use]
    pub fn decode(s: &str) -> Self {
        match s {
            "Running" => StageStatus::Running,
            "Success" => StageStatus::Success,
            "Failure" => StageStatus::Failure,
            "Unstable" => StageStatus::Unstable,
            "Aborted" => StageStatus::Aborted,
            "NotBuilt" => StageStatus::NotBuilt,
            _ => StageStatus::NotStarted,
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

/// Functional classification of a registered step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCategory {
    General,
    Scm,
    Build,
    Test,
    Deploy,
    Security,
    Util,
    Notification,
}

impl StepCategory {
    /// All categories, in display order. Used for registry aggregates.
    pub const ALL: [StepCategory; 8] = [
        StepCategory::General,
        StepCategory::Scm,
        StepCategory::Build,
        StepCategory::Test,
        StepCategory::Deploy,
        StepCategory::Security,
        StepCategory::Util,
        StepCategory::Notification,
    ];

    /// Short telemetry-safe tag for this category.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StepCategory::General => "general",
            StepCategory::Scm => "scm",
            StepCategory::Build => "build",
            StepCategory::Test => "test",
            StepCategory::Deploy => "deploy",
            StepCategory::Security => "security",
            StepCategory::Util => "util",
            StepCategory::Notification => "notification",
        }
    }
}

impl fmt::Display for StepCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sandbox posture a step executes under.
///
/// The dispatcher consults this before invocation; the concrete enforcement
/// lives behind [`crate::steps::SandboxPolicy`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// No restrictions.
    Trusted,
    /// Resource-monitored, file access constrained to the workspace root.
    #[default]
    Restricted,
    /// Maximum sandbox: additionally no subprocesses and no network.
    Isolated,
}

impl SecurityLevel {
    pub const ALL: [SecurityLevel; 3] = [
        SecurityLevel::Trusted,
        SecurityLevel::Restricted,
        SecurityLevel::Isolated,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Trusted => "trusted",
            SecurityLevel::Restricted => "restricted",
            SecurityLevel::Isolated => "isolated",
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a step parameter.
///
/// Arguments arrive as [`serde_json::Value`]; assignability is structural.
/// `Float` accepts integer literals, `Any` accepts everything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Int,
    Float,
    Bool,
    List,
    Map,
    Any,
}

impl ParamType {
    /// Whether `value` is assignable to a parameter of this type.
    #[must_use]
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match self {
            ParamType::Any => true,
            ParamType::String => value.is_string(),
            ParamType::Int => value.is_i64() || value.is_u64(),
            ParamType::Float => value.is_number(),
            ParamType::Bool => value.is_boolean(),
            ParamType::List => matches!(value, Value::Array(_)),
            ParamType::Map => matches!(value, Value::Object(_)),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
            ParamType::List => "list",
            ParamType::Map => "map",
            ParamType::Any => "any",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Initialization ordering for service-locator configuration.
///
/// Only consulted during the configure phase; resolution itself is
/// priority-agnostic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigPriority {
    Highest,
    High,
    #[default]
    Normal,
    Low,
    Lowest,
}

/// Origin of a log record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    /// Emitted through a [`crate::logging::Logger`] handle.
    #[default]
    Logger,
    /// Captured stdout line of a subprocess.
    Stdout,
    /// Captured stderr line of a subprocess.
    Stderr,
}

impl LogSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSource::Logger => "logger",
            LogSource::Stdout => "stdout",
            LogSource::Stderr => "stderr",
        }
    }
}

/// Severity of a log record.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
