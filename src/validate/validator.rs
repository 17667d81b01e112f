use super::issue::{FixKind, IssueCode, Location, QuickFix, Severity, ValidationIssue};
use super::report::ValidationReport;

/// A forbidden host-escape API and the comment that replaces it.
struct ForbiddenApi {
    pattern: &'static str,
    replacement: &'static str,
}

const FORBIDDEN_APIS: &[ForbiddenApi] = &[
    ForbiddenApi {
        pattern: "System.exit(",
        replacement: "/* System.exit is not allowed in pipeline scripts */",
    },
    ForbiddenApi {
        pattern: "Runtime.getRuntime()",
        replacement: "/* Runtime access is not allowed in pipeline scripts */",
    },
    ForbiddenApi {
        pattern: "ProcessBuilder(",
        replacement: "/* ProcessBuilder is not allowed in pipeline scripts; use the sh step */",
    },
    ForbiddenApi {
        pattern: ".exec(",
        replacement: "/* direct exec is not allowed in pipeline scripts; use the sh step */",
    },
];

const BLOCKING_SLEEP: &str = "Thread.sleep(";

const PIPELINE_SKELETON: &str = "pipeline {\n    stages {\n    }\n}\n";

/// Static checks over the textual pipeline description.
///
/// The validator never parses the DSL grammar; every check is a lexical
/// scan with precise 1-based locations. The same script bytes always
/// produce the same report, with issues ordered by (line, column, code).
///
/// # Example
///
/// ```rust
/// use pipewright::validate::{IssueCode, ScriptValidator};
///
/// let report = ScriptValidator::new().validate("pipeline {\n}\n", "ok.pipeline");
/// assert!(report.ok());
///
/// let report = ScriptValidator::new().validate("", "empty.pipeline");
/// assert_eq!(report.issues[0].code, IssueCode::MissingPipelineBlock);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct ScriptValidator;

impl ScriptValidator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Run every check and assemble a stably-ordered report.
    #[must_use]
    pub fn validate(&self, content: &str, script_name: &str) -> ValidationReport {
        let mut issues = Vec::new();
        self.check_brackets(content, script_name, &mut issues);
        self.check_forbidden_apis(content, script_name, &mut issues);
        self.check_blocking_calls(content, script_name, &mut issues);
        self.check_pipeline_block(content, script_name, &mut issues);

        issues.sort_by(|a, b| {
            (a.location.line, a.location.column, a.code.as_str()).cmp(&(
                b.location.line,
                b.location.column,
                b.code.as_str(),
            ))
        });

        ValidationReport::new(script_name, issues)
    }

    /// Track `{`, `(`, `[` with positions; report leftover openers (fix:
    /// insert the closer at end of file) and stray closers (fix: remove).
    fn check_brackets(&self, content: &str, script: &str, issues: &mut Vec<ValidationIssue>) {
        let mut stack: Vec<(char, Location)> = Vec::new();
        let mut in_string = false;
        let mut in_line_comment = false;
        let mut line = 1usize;
        let mut column = 0usize;
        let mut prev = '\0';
        let mut last = Location::new(1, 1);

        for ch in content.chars() {
            if ch == '\n' {
                line += 1;
                column = 0;
                in_line_comment = false;
                prev = ch;
                continue;
            }
            column += 1;
            last = Location::new(line, column);

            if in_line_comment {
                prev = ch;
                continue;
            }
            if in_string {
                if ch == '"' && prev != '\\' {
                    in_string = false;
                }
                prev = ch;
                continue;
            }
            match ch {
                '"' => in_string = true,
                '/' if prev == '/' => in_line_comment = true,
                '{' | '(' | '[' => stack.push((ch, Location::new(line, column))),
                '}' | ')' | ']' => {
                    let expected_opener = match ch {
                        '}' => '{',
                        ')' => '(',
                        _ => '[',
                    };
                    match stack.last() {
                        Some((opener, _)) if *opener == expected_opener => {
                            stack.pop();
                        }
                        _ => {
                            let location =
                                Location::new(line, column).in_file(script.to_string());
                            issues.push(
                                ValidationIssue::new(
                                    code_for_bracket(ch),
                                    Severity::Error,
                                    location.clone(),
                                    format!("unmatched '{ch}'"),
                                )
                                .suggest(format!("remove the stray '{ch}'"))
                                .with_fix(
                                    QuickFix::new(
                                        format!("Remove '{ch}'"),
                                        FixKind::RemoveText,
                                        String::new(),
                                    )
                                    .describe("Delete the unmatched closer")
                                    .at(location),
                                ),
                            );
                        }
                    }
                }
                _ => {}
            }
            prev = ch;
        }

        // End-of-file position for closer insertion.
        let eof = Location::new(last.line, last.column + 1);
        for (opener, location) in stack {
            let closer = match opener {
                '{' => '}',
                '(' => ')',
                _ => ']',
            };
            issues.push(
                ValidationIssue::new(
                    code_for_bracket(opener),
                    Severity::Error,
                    location.clone().in_file(script.to_string()),
                    format!("unmatched '{opener}' opened at {location}"),
                )
                .suggest(format!("insert '{closer}' before end of file"))
                .with_fix(
                    QuickFix::new(
                        format!("Insert '{closer}'"),
                        FixKind::AddText,
                        closer.to_string(),
                    )
                    .describe("Close the bracket at the last known position")
                    .at(eof.clone()),
                ),
            );
        }
    }

    fn check_forbidden_apis(&self, content: &str, script: &str, issues: &mut Vec<ValidationIssue>) {
        for api in FORBIDDEN_APIS {
            for location in find_occurrences(content, api.pattern) {
                issues.push(
                    ValidationIssue::new(
                        IssueCode::DangerousApiUsage,
                        Severity::Error,
                        location.clone().in_file(script.to_string()),
                        format!("dangerous API usage: '{}'", api.pattern),
                    )
                    .suggest("pipeline scripts cannot escape the engine sandbox")
                    .with_fix(
                        QuickFix::new(
                            format!("Replace '{}'", api.pattern),
                            FixKind::ReplaceText,
                            api.replacement,
                        )
                        .describe("Replace the call with an explanatory comment")
                        .at(location),
                    ),
                );
            }
        }
    }

    fn check_blocking_calls(&self, content: &str, script: &str, issues: &mut Vec<ValidationIssue>) {
        for location in find_occurrences(content, BLOCKING_SLEEP) {
            issues.push(
                ValidationIssue::new(
                    IssueCode::BlockingSleepDetected,
                    Severity::Warning,
                    location.clone().in_file(script.to_string()),
                    "blocking Thread.sleep call",
                )
                .suggest("use the cooperative delay(ms) step instead")
                .with_fix(
                    QuickFix::new("Replace with delay(", FixKind::ReplaceText, "delay(")
                        .describe("Swap the blocking sleep for the cooperative primitive")
                        .at(location),
                ),
            );
        }
    }

    fn check_pipeline_block(&self, content: &str, script: &str, issues: &mut Vec<ValidationIssue>) {
        if has_pipeline_block(content) {
            return;
        }
        let location = Location::new(1, 1).in_file(script.to_string());
        issues.push(
            ValidationIssue::new(
                IssueCode::MissingPipelineBlock,
                Severity::Error,
                location.clone(),
                "missing top-level pipeline { ... } block",
            )
            .suggest("wrap the script in a pipeline block")
            .with_fix(
                QuickFix::new("Insert pipeline skeleton", FixKind::AddText, PIPELINE_SKELETON)
                    .describe("Add an empty pipeline block at the top of the script")
                    .at(location),
            ),
        );
    }
}

fn code_for_bracket(bracket: char) -> IssueCode {
    match bracket {
        '{' | '}' => IssueCode::UnmatchedBraces,
        '(' | ')' => IssueCode::UnmatchedParentheses,
        _ => IssueCode::UnmatchedBrackets,
    }
}

/// All occurrences of `pattern` with 1-based locations.
fn find_occurrences(content: &str, pattern: &str) -> Vec<Location> {
    let mut found = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let mut offset = 0;
        while let Some(pos) = line[offset..].find(pattern) {
            found.push(Location::new(idx + 1, offset + pos + 1));
            offset += pos + pattern.len();
        }
    }
    found
}

/// `pipeline` token followed by `{`, ignoring whitespace.
fn has_pipeline_block(content: &str) -> bool {
    let mut rest = content;
    while let Some(pos) = rest.find("pipeline") {
        let after = &rest[pos + "pipeline".len()..];
        let trimmed = after.trim_start();
        if trimmed.starts_with('{') {
            // Must be a standalone token, not a suffix of an identifier.
            let standalone = pos == 0
                || !rest[..pos]
                    .chars()
                    .next_back()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_');
            if standalone {
                return true;
            }
        }
        rest = &rest[pos + "pipeline".len()..];
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occurrences_are_one_based() {
        let found = find_occurrences("ab\ncdab", "ab");
        assert_eq!(found, vec![Location::new(1, 1), Location::new(2, 3)]);
    }

    #[test]
    fn pipeline_block_detection() {
        assert!(has_pipeline_block("pipeline {\n}"));
        assert!(has_pipeline_block("  pipeline   {"));
        assert!(!has_pipeline_block("mypipeline {"));
        assert!(!has_pipeline_block("pipeline"));
        assert!(!has_pipeline_block(""));
    }

    #[test]
    fn strings_and_comments_do_not_confuse_brackets() {
        let validator = ScriptValidator::new();
        let script = "pipeline {\n    echo \"un{matched\"\n    // stray ) here\n}\n";
        let report = validator.validate(script, "s");
        assert!(report.ok(), "issues: {:?}", report.issues);
    }
}
