//! Rendering helpers shared by sinks, the validator, and the CLI.

use crate::event_bus::Event;

pub const CONTEXT_COLOR: &str = "\x1b[32m"; // green
pub const LINE_COLOR: &str = "\x1b[35m"; // magenta / dark pink
pub const RESET_COLOR: &str = "\x1b[0m";

const BANNER_RULE: &str = "============================================================";

/// Rendered output for a telemetry item that can be consumed by sinks.
#[derive(Clone, Debug, Default)]
pub struct EventRender {
    pub context: Option<String>,
    pub lines: Vec<String>,
}

impl EventRender {
    pub fn join_lines(&self) -> String {
        self.lines.join("")
    }
}

/// Formats bus events for human-facing sinks.
pub trait TelemetryFormatter: Send + Sync {
    fn render_event(&self, event: &Event) -> EventRender;
}

pub struct PlainFormatter;

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &Event) -> EventRender {
        let line = format!("{LINE_COLOR}{event}{RESET_COLOR}\n");
        EventRender {
            context: Some(event.scope_label().to_string()),
            lines: vec![line],
        }
    }
}

/// Formatter without ANSI escapes, for files and dumb terminals.
pub struct MonochromeFormatter;

impl TelemetryFormatter for MonochromeFormatter {
    fn render_event(&self, event: &Event) -> EventRender {
        EventRender {
            context: Some(event.scope_label().to_string()),
            lines: vec![format!("{event}\n")],
        }
    }
}

/// Render a three-line ASCII banner for high-severity output.
///
/// ```text
/// ============================================================
/// evaluation failed: unresolved reference 'sh' (line 4, column 9)
/// ============================================================
/// ```
#[must_use]
pub fn render_banner(message: &str) -> String {
    format!("{BANNER_RULE}\n{message}\n{BANNER_RULE}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_has_three_lines_with_rules() {
        let banner = render_banner("boom");
        let lines: Vec<&str> = banner.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("==="));
        assert_eq!(lines[1], "boom");
        assert!(lines[2].starts_with("==="));
    }

    #[test]
    fn plain_formatter_wraps_display_form() {
        let rendered = PlainFormatter.render_event(&Event::diagnostic("scope", "hello"));
        assert_eq!(rendered.context.as_deref(), Some("scope"));
        assert!(rendered.join_lines().contains("hello"));
    }
}
