use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::monitor::{ResourceKind, ResourceUsage, Violation};
use crate::types::StageStatus;

/// Scope label carried by the synthetic event that terminates a job's stream.
pub const STREAM_END_SCOPE: &str = "__pipewright_stream_end__";

/// A typed record on the pub/sub bus.
///
/// Events cover stage lifecycle, workspace file-system changes, resource
/// alerts from the monitor, and free-form diagnostics. Publishes never
/// block; subscribers consume on their own task.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Event {
    Stage(StageEvent),
    File(FileEvent),
    Resource(ResourceEvent),
    Diagnostic(DiagnosticEvent),
}

impl Event {
    pub fn stage_start(stage: impl Into<String>) -> Self {
        Event::Stage(StageEvent::Start {
            stage: stage.into(),
            at: Utc::now(),
        })
    }

    pub fn stage_end(stage: impl Into<String>, duration_ms: u64, status: StageStatus) -> Self {
        Event::Stage(StageEvent::End {
            stage: stage.into(),
            at: Utc::now(),
            duration_ms,
            status,
        })
    }

    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
        })
    }

    pub fn resource_usage(usage: ResourceUsage) -> Self {
        Event::Resource(ResourceEvent::Usage(usage))
    }

    pub fn resource_warning(
        kind: ResourceKind,
        current: u64,
        limit: u64,
        threshold_pct: f64,
    ) -> Self {
        Event::Resource(ResourceEvent::Warning {
            kind,
            current,
            limit,
            threshold_pct,
        })
    }

    pub fn resource_violation(violation: Violation) -> Self {
        Event::Resource(ResourceEvent::Violation(violation))
    }

    /// Scope label used by formatters and filtering subscribers.
    #[must_use]
    pub fn scope_label(&self) -> &str {
        match self {
            Event::Stage(StageEvent::Start { .. }) => "stage:start",
            Event::Stage(StageEvent::End { .. }) => "stage:end",
            Event::File(f) => f.kind.scope_label(),
            Event::Resource(ResourceEvent::Usage(_)) => "resource:usage",
            Event::Resource(ResourceEvent::Warning { .. }) => "resource:warning",
            Event::Resource(ResourceEvent::Violation(_)) => "resource:violation",
            Event::Diagnostic(diag) => &diag.scope,
        }
    }

    /// Human-readable one-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Event::Stage(StageEvent::Start { stage, .. }) => format!("stage '{stage}' started"),
            Event::Stage(StageEvent::End {
                stage,
                duration_ms,
                status,
                ..
            }) => format!("stage '{stage}' finished: {status} in {duration_ms} ms"),
            Event::File(f) => format!("{} {}", f.kind.scope_label(), f.path.display()),
            Event::Resource(ResourceEvent::Usage(u)) => format!(
                "usage exec={} wall={}ms cpu={}ms mem={}MB",
                u.execution_id, u.wall_ms, u.cpu_ms, u.peak_memory_mb
            ),
            Event::Resource(ResourceEvent::Warning {
                kind,
                current,
                limit,
                threshold_pct,
            }) => format!(
                "{kind} usage {current} at {:.0}% of limit {limit}",
                threshold_pct * 100.0
            ),
            Event::Resource(ResourceEvent::Violation(v)) => v.to_string(),
            Event::Diagnostic(diag) => diag.message.clone(),
        }
    }

    /// Convert the event to a JSON value with the normalized schema:
    ///
    /// ```json
    /// {
    ///   "type": "stage" | "file" | "resource" | "diagnostic",
    ///   "scope": "scope_label",
    ///   "message": "one-line summary",
    ///   "timestamp": "2026-01-12T12:34:56.789Z",
    ///   "metadata": { /* variant-specific fields */ }
    /// }
    /// ```
    #[must_use]
    pub fn to_json_value(&self) -> Value {
        let (event_type, metadata, timestamp) = match self {
            Event::Stage(StageEvent::Start { stage, at }) => {
                ("stage", json!({ "stage": stage }), *at)
            }
            Event::Stage(StageEvent::End {
                stage,
                at,
                duration_ms,
                status,
            }) => (
                "stage",
                json!({
                    "stage": stage,
                    "duration_ms": duration_ms,
                    "status": status.encode(),
                }),
                *at,
            ),
            Event::File(f) => (
                "file",
                json!({
                    "path": f.path,
                    "size": f.size,
                    "created": f.created,
                    "modified": f.modified,
                }),
                Utc::now(),
            ),
            Event::Resource(ResourceEvent::Usage(u)) => (
                "resource",
                serde_json::to_value(u).unwrap_or(Value::Null),
                u.at,
            ),
            Event::Resource(ResourceEvent::Warning {
                kind,
                current,
                limit,
                threshold_pct,
            }) => (
                "resource",
                json!({
                    "kind": kind,
                    "current": current,
                    "limit": limit,
                    "threshold_pct": threshold_pct,
                }),
                Utc::now(),
            ),
            Event::Resource(ResourceEvent::Violation(v)) => (
                "resource",
                serde_json::to_value(v).unwrap_or(Value::Null),
                Utc::now(),
            ),
            Event::Diagnostic(_) => ("diagnostic", json!({}), Utc::now()),
        };

        json!({
            "type": event_type,
            "scope": self.scope_label(),
            "message": self.summary(),
            "timestamp": timestamp.to_rfc3339(),
            "metadata": metadata,
        })
    }

    /// Compact JSON string form of [`Self::to_json_value`].
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_json_value())
    }

    /// Pretty-printed JSON form, for debugging and human-readable logs.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_json_value())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.scope_label(), self.summary())
    }
}

/// Stage lifecycle events.
///
/// `Start` and the matching `End` bracket everything a stage emits: all
/// events published by a stage body happen-before its `End`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum StageEvent {
    Start {
        stage: String,
        at: DateTime<Utc>,
    },
    End {
        stage: String,
        at: DateTime<Utc>,
        duration_ms: u64,
        status: StageStatus,
    },
}

impl StageEvent {
    #[must_use]
    pub fn stage(&self) -> &str {
        match self {
            StageEvent::Start { stage, .. } | StageEvent::End { stage, .. } => stage,
        }
    }
}

/// Kind of workspace file-system change.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
}

impl FileChangeKind {
    #[must_use]
    pub fn scope_label(&self) -> &'static str {
        match self {
            FileChangeKind::Created => "file:created",
            FileChangeKind::Modified => "file:modified",
            FileChangeKind::Deleted => "file:deleted",
        }
    }
}

/// A file-system change observed under the workspace root.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FileEvent {
    pub kind: FileChangeKind,
    pub path: PathBuf,
    pub size: Option<u64>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

impl FileEvent {
    pub fn created(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            kind: FileChangeKind::Created,
            path: path.into(),
            size: Some(size),
            created: Some(Utc::now()),
            modified: Some(Utc::now()),
        }
    }

    pub fn modified(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            kind: FileChangeKind::Modified,
            path: path.into(),
            size: Some(size),
            created: None,
            modified: Some(Utc::now()),
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FileChangeKind::Deleted,
            path: path.into(),
            size: None,
            created: None,
            modified: None,
        }
    }
}

/// Resource alerts emitted by the monitor.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum ResourceEvent {
    /// Periodic usage snapshot.
    Usage(ResourceUsage),
    /// Usage crossed the configured warning fraction of a limit.
    Warning {
        kind: ResourceKind,
        current: u64,
        limit: u64,
        threshold_pct: f64,
    },
    /// A limit was exceeded; the execution is being cancelled.
    Violation(Violation),
}

/// Free-form diagnostic event for engine telemetry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub message: String,
}

impl DiagnosticEvent {
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
