use std::future::Future;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

/// Ephemeral per-execution state with memoization and scoped provisioning.
///
/// Two facilities, both keyed by string:
///
/// - **Memoization**: [`Self::remember`] computes a value once per holder
///   and returns the cached copy thereafter; [`Self::invalidate`] clears
///   the cache.
/// - **Scoped provisioning**: [`Self::provide`] pushes a value onto a
///   per-key dynamic stack for the extent of a future; [`Self::consume`]
///   reads the topmost value. The stack is popped even when the future
///   errors or is cancelled.
#[derive(Default)]
pub struct StateHolder {
    memo: Mutex<FxHashMap<String, Value>>,
    provided: Mutex<FxHashMap<String, Vec<Value>>>,
}

impl StateHolder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute once per holder; cached thereafter.
    pub fn remember(&self, key: &str, compute: impl FnOnce() -> Value) -> Value {
        let mut memo = self.memo.lock();
        memo.entry(key.to_string()).or_insert_with(compute).clone()
    }

    /// The memoized value for `key`, without computing.
    #[must_use]
    pub fn recall(&self, key: &str) -> Option<Value> {
        self.memo.lock().get(key).cloned()
    }

    /// Drop every memoized value.
    pub fn invalidate(&self) {
        self.memo.lock().clear();
    }

    /// Push `value` for `key` for the dynamic extent of `fut`.
    pub async fn provide<F>(&self, key: &str, value: Value, fut: F) -> F::Output
    where
        F: Future,
    {
        self.provided
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(value);
        let _guard = ProvideGuard { holder: self, key };
        fut.await
    }

    /// Topmost provided value for `key`, or `None`.
    #[must_use]
    pub fn consume(&self, key: &str) -> Option<Value> {
        self.provided
            .lock()
            .get(key)
            .and_then(|stack| stack.last().cloned())
    }

    fn pop(&self, key: &str) {
        let mut provided = self.provided.lock();
        if let Some(stack) = provided.get_mut(key) {
            stack.pop();
            if stack.is_empty() {
                provided.remove(key);
            }
        }
    }
}

struct ProvideGuard<'a> {
    holder: &'a StateHolder,
    key: &'a str,
}

impl Drop for ProvideGuard<'_> {
    fn drop(&mut self) {
        self.holder.pop(self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn remember_computes_once() {
        let holder = StateHolder::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v = holder.remember("answer", || {
                calls.fetch_add(1, Ordering::SeqCst);
                json!(42)
            });
            assert_eq!(v, json!(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        holder.invalidate();
        holder.remember("answer", || {
            calls.fetch_add(1, Ordering::SeqCst);
            json!(42)
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn provide_is_scoped_and_nested() {
        let holder = StateHolder::new();
        assert_eq!(holder.consume("branch"), None);
        holder
            .provide("branch", json!("main"), async {
                assert_eq!(holder.consume("branch"), Some(json!("main")));
                holder
                    .provide("branch", json!("feature"), async {
                        assert_eq!(holder.consume("branch"), Some(json!("feature")));
                    })
                    .await;
                assert_eq!(holder.consume("branch"), Some(json!("main")));
            })
            .await;
        assert_eq!(holder.consume("branch"), None);
    }

    #[tokio::test]
    async fn provide_pops_when_future_panics_are_avoided_by_drop() {
        // Cancel the provided future mid-flight; the guard must still pop.
        let holder = StateHolder::new();
        let fut = holder.provide("k", json!(1), std::future::pending::<()>());
        tokio::select! {
            biased;
            () = tokio::task::yield_now() => {}
            () = fut => unreachable!(),
        }
        assert_eq!(holder.consume("k"), None);
    }
}
