use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ParamType, SecurityLevel, StepCategory};

/// One positional parameter in a step's schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub has_default: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            has_default: false,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            has_default: true,
        }
    }
}

/// Registration-time description of a callable step.
///
/// `name` is unique across a registry. `suspending` marks steps that may
/// yield the scheduler (I/O, delays, subprocess waits); it is metadata for
/// tooling — every handler is invoked through the async dispatcher either
/// way.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepMetadata {
    pub name: String,
    pub description: String,
    pub category: StepCategory,
    pub security_level: SecurityLevel,
    pub params: Vec<ParamSpec>,
    pub return_type: ParamType,
    pub suspending: bool,
    pub registered_at: DateTime<Utc>,
}

impl StepMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: StepCategory::General,
            security_level: SecurityLevel::default(),
            params: Vec::new(),
            return_type: ParamType::Any,
            suspending: false,
            registered_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn category(mut self, category: StepCategory) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub fn security_level(mut self, level: SecurityLevel) -> Self {
        self.security_level = level;
        self
    }

    #[must_use]
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn returns(mut self, ty: ParamType) -> Self {
        self.return_type = ty;
        self
    }

    #[must_use]
    pub fn suspending(mut self, suspending: bool) -> Self {
        self.suspending = suspending;
        self
    }

    /// Total declared arity.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Number of leading arguments that must be provided: everything up to
    /// the last non-defaulted parameter.
    #[must_use]
    pub fn required_arity(&self) -> usize {
        self.params
            .iter()
            .rposition(|p| !p.has_default)
            .map_or(0, |idx| idx + 1)
    }
}
