use std::future::Future;

use rustc_hash::FxHashMap;

/// Ambient logging metadata carried as a task-local.
///
/// The context is captured into every record at emit time, which is how all
/// log records of one logical operation share a correlation id across
/// suspension points and spawned subtasks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogContext {
    pub correlation_id: Option<String>,
    pub user: Option<String>,
    pub session: Option<String>,
    pub extra: FxHashMap<String, String>,
}

impl LogContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    #[must_use]
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

tokio::task_local! {
    static LOG_CONTEXT: LogContext;
}

/// Run `fut` with `ctx` as the ambient logging context for its dynamic
/// extent. Nested calls shadow the outer context.
pub async fn with_log_context<F>(ctx: LogContext, fut: F) -> F::Output
where
    F: Future,
{
    LOG_CONTEXT.scope(ctx, fut).await
}

/// The logging context of the current task, if one is set.
#[must_use]
pub fn current_log_context() -> Option<LogContext> {
    LOG_CONTEXT.try_with(Clone::clone).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn context_is_scoped_to_the_block() {
        assert!(current_log_context().is_none());
        let ctx = LogContext::new().with_correlation_id("run-7");
        with_log_context(ctx, async {
            let current = current_log_context().expect("context set");
            assert_eq!(current.correlation_id.as_deref(), Some("run-7"));
        })
        .await;
        assert!(current_log_context().is_none());
    }

    #[tokio::test]
    async fn nested_contexts_shadow() {
        let outer = LogContext::new().with_correlation_id("outer");
        let inner = LogContext::new().with_correlation_id("inner");
        with_log_context(outer, async move {
            with_log_context(inner, async {
                assert_eq!(
                    current_log_context().unwrap().correlation_id.as_deref(),
                    Some("inner")
                );
            })
            .await;
            assert_eq!(
                current_log_context().unwrap().correlation_id.as_deref(),
                Some("outer")
            );
        })
        .await;
    }
}
