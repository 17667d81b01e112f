use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resource dimension tracked by the monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Memory,
    CpuTime,
    WallTime,
    Threads,
    FileHandles,
    /// The monitored execution itself failed for a non-resource reason.
    ExecutionError,
}

impl ResourceKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Memory => "memory",
            ResourceKind::CpuTime => "cpu-time",
            ResourceKind::WallTime => "wall-time",
            ResourceKind::Threads => "threads",
            ResourceKind::FileHandles => "file-handles",
            ResourceKind::ExecutionError => "execution-error",
        }
    }

    /// Unit suffix used when rendering usage figures for this kind.
    #[must_use]
    pub fn unit(&self) -> &'static str {
        match self {
            ResourceKind::Memory => "MB",
            ResourceKind::CpuTime | ResourceKind::WallTime => "ms",
            _ => "",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-execution resource ceilings. A `None` dimension is unlimited and
/// never produces warnings or violations regardless of usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_memory_mb: Option<u64>,
    pub max_cpu_time_ms: Option<u64>,
    pub max_wall_time_ms: Option<u64>,
    pub max_threads: Option<u64>,
    pub max_file_handles: Option<u64>,
}

impl ResourceLimits {
    /// All dimensions unlimited.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_memory_mb(mut self, mb: u64) -> Self {
        self.max_memory_mb = Some(mb);
        self
    }

    #[must_use]
    pub fn with_max_cpu_time_ms(mut self, ms: u64) -> Self {
        self.max_cpu_time_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn with_max_wall_time_ms(mut self, ms: u64) -> Self {
        self.max_wall_time_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn with_max_threads(mut self, n: u64) -> Self {
        self.max_threads = Some(n);
        self
    }

    #[must_use]
    pub fn with_max_file_handles(mut self, n: u64) -> Self {
        self.max_file_handles = Some(n);
        self
    }

    /// True when no dimension is limited, i.e. monitoring is observe-only.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.max_memory_mb.is_none()
            && self.max_cpu_time_ms.is_none()
            && self.max_wall_time_ms.is_none()
            && self.max_threads.is_none()
            && self.max_file_handles.is_none()
    }

    /// The configured limit for `kind`, if any.
    #[must_use]
    pub fn limit_for(&self, kind: ResourceKind) -> Option<u64> {
        match kind {
            ResourceKind::Memory => self.max_memory_mb,
            ResourceKind::CpuTime => self.max_cpu_time_ms,
            ResourceKind::WallTime => self.max_wall_time_ms,
            ResourceKind::Threads => self.max_threads,
            ResourceKind::FileHandles => self.max_file_handles,
            ResourceKind::ExecutionError => None,
        }
    }
}

/// A measured usage exceeding its configured limit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ResourceKind,
    pub actual: u64,
    pub limit: u64,
    /// Extra detail for `ExecutionError` violations.
    pub detail: Option<String>,
}

impl Violation {
    #[must_use]
    pub fn new(kind: ResourceKind, actual: u64, limit: u64) -> Self {
        Self {
            kind,
            actual,
            limit,
            detail: None,
        }
    }

    /// Wrap a non-resource failure observed under the monitor.
    pub fn execution_error(detail: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::ExecutionError,
            actual: 0,
            limit: 0,
            detail: Some(detail.into()),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ResourceKind::ExecutionError => write!(
                f,
                "execution error under resource monitor: {}",
                self.detail.as_deref().unwrap_or("unknown")
            ),
            kind => write!(
                f,
                "{kind} limit exceeded: {}{unit} > {}{unit}",
                self.actual,
                self.limit,
                unit = kind.unit()
            ),
        }
    }
}

/// Point-in-time usage snapshot published on the event bus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub execution_id: String,
    pub wall_ms: u64,
    pub cpu_ms: u64,
    pub peak_memory_mb: u64,
    pub threads: u64,
    pub file_handles: u64,
    pub limits: ResourceLimits,
    pub at: DateTime<Utc>,
}

impl ResourceUsage {
    /// Current value for a kind, for limit comparison.
    #[must_use]
    pub fn value_for(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Memory => self.peak_memory_mb,
            ResourceKind::CpuTime => self.cpu_ms,
            ResourceKind::WallTime => self.wall_ms,
            ResourceKind::Threads => self.threads,
            ResourceKind::FileHandles => self.file_handles,
            ResourceKind::ExecutionError => 0,
        }
    }
}

/// `actual / limit` ratio for one limited dimension, recorded into the job
/// result after completion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceEfficiency {
    pub kind: ResourceKind,
    pub actual: u64,
    pub limit: u64,
    pub ratio: f64,
}

/// Final usage plus efficiency ratios for a monitored execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub usage: ResourceUsage,
    pub efficiency: Vec<ResourceEfficiency>,
}

impl UsageStats {
    pub(crate) fn from_usage(usage: ResourceUsage) -> Self {
        const TRACKED: [ResourceKind; 5] = [
            ResourceKind::Memory,
            ResourceKind::CpuTime,
            ResourceKind::WallTime,
            ResourceKind::Threads,
            ResourceKind::FileHandles,
        ];
        let efficiency = TRACKED
            .iter()
            .filter_map(|&kind| {
                usage.limits.limit_for(kind).map(|limit| {
                    let actual = usage.value_for(kind);
                    ResourceEfficiency {
                        kind,
                        actual,
                        limit,
                        ratio: if limit == 0 {
                            0.0
                        } else {
                            actual as f64 / limit as f64
                        },
                    }
                })
            })
            .collect();
        Self { usage, efficiency }
    }
}
