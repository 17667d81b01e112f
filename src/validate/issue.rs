use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Severity of a validation issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable issue codes. The rendered form is the SCREAMING_SNAKE name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    UnmatchedBraces,
    UnmatchedParentheses,
    UnmatchedBrackets,
    DangerousApiUsage,
    BlockingSleepDetected,
    MissingPipelineBlock,
}

impl IssueCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::UnmatchedBraces => "UNMATCHED_BRACES",
            IssueCode::UnmatchedParentheses => "UNMATCHED_PARENTHESES",
            IssueCode::UnmatchedBrackets => "UNMATCHED_BRACKETS",
            IssueCode::DangerousApiUsage => "DANGEROUS_API_USAGE",
            IssueCode::BlockingSleepDetected => "BLOCKING_SLEEP_DETECTED",
            IssueCode::MissingPipelineBlock => "MISSING_PIPELINE_BLOCK",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueCode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNMATCHED_BRACES" => Ok(IssueCode::UnmatchedBraces),
            "UNMATCHED_PARENTHESES" => Ok(IssueCode::UnmatchedParentheses),
            "UNMATCHED_BRACKETS" => Ok(IssueCode::UnmatchedBrackets),
            "DANGEROUS_API_USAGE" => Ok(IssueCode::DangerousApiUsage),
            "BLOCKING_SLEEP_DETECTED" => Ok(IssueCode::BlockingSleepDetected),
            "MISSING_PIPELINE_BLOCK" => Ok(IssueCode::MissingPipelineBlock),
            _ => Err(()),
        }
    }
}

/// 1-based position within the validated script.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub line: usize,
    pub column: usize,
}

impl Location {
    #[must_use]
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            file: None,
            line,
            column,
        }
    }

    #[must_use]
    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Kind of machine-applicable edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixKind {
    AddText,
    RemoveText,
    ReplaceText,
    MoveText,
    Reformat,
}

/// Supplementary edit carried by a quick fix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub kind: FixKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub replacement: String,
}

/// Machine-applicable edit proposal attached to an issue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickFix {
    pub title: String,
    pub description: String,
    pub kind: FixKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub replacement: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_changes: Vec<TextEdit>,
}

impl QuickFix {
    pub fn new(title: impl Into<String>, kind: FixKind, replacement: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            kind,
            location: None,
            replacement: replacement.into(),
            additional_changes: Vec::new(),
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

/// One finding of the static validator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub message: String,
    pub severity: Severity,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<QuickFix>,
}

impl ValidationIssue {
    pub fn new(
        code: IssueCode,
        severity: Severity,
        location: Location,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            severity,
            location,
            suggestion: None,
            fix: None,
        }
    }

    #[must_use]
    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    #[must_use]
    pub fn with_fix(mut self, fix: QuickFix) -> Self {
        self.fix = Some(fix);
        self
    }
}
