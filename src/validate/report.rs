use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::issue::{IssueCode, Location, Severity, ValidationIssue};
use crate::telemetry::render_banner;

/// Standardized gate outcome consumed by the launcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationResult {
    Valid,
    Invalid {
        errors: Vec<ValidationIssue>,
        warnings: Vec<ValidationIssue>,
    },
}

impl ValidationResult {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

/// Display-oriented result of one validation run.
///
/// Issues are stably ordered by (line, column, code); the same script bytes
/// always produce an identical report, so downstream diffs stay stable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub script: String,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    #[must_use]
    pub fn new(script: impl Into<String>, issues: Vec<ValidationIssue>) -> Self {
        Self {
            script: script.into(),
            issues,
        }
    }

    /// True when no error-severity issue was found.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    /// Collapse into the standardized gate form.
    #[must_use]
    pub fn to_result(&self) -> ValidationResult {
        if self.ok() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid {
                errors: self.errors().cloned().collect(),
                warnings: self.warnings().cloned().collect(),
            }
        }
    }

    /// Render the banner-framed human-readable form.
    ///
    /// Per-issue lines use the fixed shape
    /// `SEVERITY CODE at line:column - message`, which [`Self::parse`]
    /// recovers exactly.
    #[must_use]
    pub fn render(&self) -> String {
        let error_count = self.errors().count();
        let warning_count = self.warnings().count();
        let headline = if self.ok() {
            format!("script '{}' passed validation", self.script)
        } else {
            format!(
                "script '{}' failed validation: {error_count} error(s), {warning_count} warning(s)",
                self.script
            )
        };
        let mut text = render_banner(&headline);
        for issue in &self.issues {
            text.push_str(&format!(
                "{} {} at {} - {}\n",
                issue.severity, issue.code, issue.location, issue.message
            ));
            if let Some(suggestion) = &issue.suggestion {
                text.push_str(&format!("  suggestion: {suggestion}\n"));
            }
        }
        text
    }

    /// Recover `(code, line, column)` triples from rendered text.
    ///
    /// Round-trip property: `parse(render())` yields the report's own codes
    /// and locations, in order.
    #[must_use]
    pub fn parse(text: &str) -> Vec<(IssueCode, Location)> {
        let mut found = Vec::new();
        for line in text.lines() {
            let mut parts = line.split_whitespace();
            let Some(_severity) = parts.next() else {
                continue;
            };
            let Some(code) = parts.next().and_then(|c| IssueCode::from_str(c).ok()) else {
                continue;
            };
            if parts.next() != Some("at") {
                continue;
            }
            let Some(position) = parts.next() else {
                continue;
            };
            let Some((line_no, column)) = position.split_once(':') else {
                continue;
            };
            let (Ok(line_no), Ok(column)) = (line_no.parse(), column.parse()) else {
                continue;
            };
            found.push((code, Location::new(line_no, column)));
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_parse_round_trips() {
        let issues = vec![
            ValidationIssue::new(
                IssueCode::DangerousApiUsage,
                Severity::Error,
                Location::new(3, 5),
                "dangerous API usage: 'System.exit('",
            ),
            ValidationIssue::new(
                IssueCode::BlockingSleepDetected,
                Severity::Warning,
                Location::new(7, 9),
                "blocking Thread.sleep call",
            ),
        ];
        let report = ValidationReport::new("demo.pipeline", issues);
        let parsed = ValidationReport::parse(&report.render());
        assert_eq!(
            parsed,
            vec![
                (IssueCode::DangerousApiUsage, Location::new(3, 5)),
                (IssueCode::BlockingSleepDetected, Location::new(7, 9)),
            ]
        );
    }

    #[test]
    fn warnings_alone_keep_the_report_ok() {
        let report = ValidationReport::new(
            "demo",
            vec![ValidationIssue::new(
                IssueCode::BlockingSleepDetected,
                Severity::Warning,
                Location::new(1, 1),
                "blocking",
            )],
        );
        assert!(report.ok());
        assert_eq!(report.to_result(), ValidationResult::Valid);
    }
}
