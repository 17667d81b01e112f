//! Static validation of pipeline scripts.
//!
//! The validator runs ahead of execution as a gate: bracket balance,
//! forbidden host-escape APIs, blocking calls, and structural checks, each
//! with precise locations and machine-applicable quick fixes. It never
//! parses the DSL grammar — checks are lexical by design so the gate stays
//! cheap and deterministic.

pub mod issue;
pub mod report;
pub mod validator;

pub use issue::{
    FixKind, IssueCode, Location, QuickFix, Severity, TextEdit, ValidationIssue,
};
pub use report::{ValidationReport, ValidationResult};
pub use validator::ScriptValidator;
