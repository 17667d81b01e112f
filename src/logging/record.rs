use chrono::Utc;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use super::context::LogContext;
use crate::types::{LogLevel, LogSource};

/// Exception payload attached to a log record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogException {
    pub message: String,
    pub stack: Option<String>,
}

impl LogException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// A pooled log record.
///
/// Records are mutable only while on loan to an emitter; once enqueued they
/// are conceptually immutable until released back to the pool. Consumers
/// receive a shared reference during dispatch and must not retain it —
/// clone if the data needs to outlive the callback.
///
/// All buffers keep their capacity across [`Self::reset`], which is what
/// makes the steady-state emit path allocation-free once the pool is warm.
#[derive(Clone, Debug, Default)]
pub struct LogRecord {
    pub timestamp_ms: i64,
    pub level: LogLevel,
    pub logger: String,
    pub message: String,
    pub correlation_id: Option<String>,
    pub context: FxHashMap<String, String>,
    pub exception: Option<LogException>,
    pub source: LogSource,
}

impl LogRecord {
    /// Populate the record in place for emission.
    pub(crate) fn fill(
        &mut self,
        level: LogLevel,
        logger: &str,
        message: &str,
        context: Option<&LogContext>,
        source: LogSource,
        exception: Option<LogException>,
    ) {
        self.timestamp_ms = Utc::now().timestamp_millis();
        self.level = level;
        self.logger.push_str(logger);
        self.message.push_str(message);
        self.source = source;
        self.exception = exception;
        if let Some(ctx) = context {
            self.correlation_id = ctx.correlation_id.clone();
            if let Some(user) = &ctx.user {
                self.context.insert("user".to_string(), user.clone());
            }
            if let Some(session) = &ctx.session {
                self.context.insert("session".to_string(), session.clone());
            }
            for (k, v) in &ctx.extra {
                self.context.insert(k.clone(), v.clone());
            }
        }
    }

    /// Clear all fields, retaining buffer capacity.
    pub fn reset(&mut self) {
        self.timestamp_ms = 0;
        self.level = LogLevel::default();
        self.logger.clear();
        self.message.clear();
        self.correlation_id = None;
        self.context.clear();
        self.exception = None;
        self.source = LogSource::default();
    }

    /// Serialize with the stable record schema used by structured consumers.
    #[must_use]
    pub fn to_json_value(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("timestamp".into(), json!(self.timestamp_ms));
        obj.insert("level".into(), json!(self.level.as_str()));
        obj.insert("logger".into(), json!(self.logger));
        obj.insert("message".into(), json!(self.message));
        if let Some(correlation_id) = &self.correlation_id {
            obj.insert("correlation_id".into(), json!(correlation_id));
        }
        obj.insert("context".into(), json!(self.context));
        if let Some(exception) = &self.exception {
            obj.insert(
                "exception".into(),
                json!({
                    "message": exception.message,
                    "stack": exception.stack,
                }),
            );
        }
        obj.insert("source".into(), json!(self.source.as_str()));
        Value::Object(obj)
    }

    /// Render a single plain-text line.
    #[must_use]
    pub fn render_line(&self) -> String {
        match &self.correlation_id {
            Some(cid) => format!(
                "{} {} [{}] ({}) {}",
                self.timestamp_ms, self.level, self.logger, cid, self.message
            ),
            None => format!(
                "{} {} [{}] {}",
                self.timestamp_ms, self.level, self.logger, self.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_fields_and_keeps_capacity() {
        let mut rec = LogRecord::default();
        rec.fill(
            LogLevel::Warn,
            "engine",
            "something happened",
            None,
            LogSource::Logger,
            Some(LogException::new("boom")),
        );
        let message_capacity = rec.message.capacity();
        rec.reset();
        assert!(rec.message.is_empty());
        assert!(rec.logger.is_empty());
        assert!(rec.exception.is_none());
        assert_eq!(rec.message.capacity(), message_capacity);
    }

    #[test]
    fn json_schema_includes_correlation_when_present() {
        let mut rec = LogRecord::default();
        let ctx = LogContext::new().with_correlation_id("abc-123");
        rec.fill(
            LogLevel::Info,
            "engine",
            "hello",
            Some(&ctx),
            LogSource::Logger,
            None,
        );
        let value = rec.to_json_value();
        assert_eq!(value["correlation_id"], "abc-123");
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["source"], "logger");
    }
}
