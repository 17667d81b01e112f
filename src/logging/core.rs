use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::consumer::LogConsumer;
use super::context::current_log_context;
use super::pool::RecordPool;
use super::record::{LogException, LogRecord};
use crate::types::{LogLevel, LogSource};

/// Tuning for the log pipeline.
#[derive(Clone, Copy, Debug)]
pub struct LogConfig {
    /// Bounded queue depth between emitters and the dispatch task.
    pub queue_capacity: usize,
    /// Number of pre-allocated records in the pool.
    pub pool_capacity: usize,
    /// Maximum records drained per dispatch batch.
    pub batch_size: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 8192,
            pool_capacity: 1024,
            batch_size: 64,
        }
    }
}

/// Counters exposed for health checks and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogMetrics {
    pub emitted: u64,
    pub dropped: u64,
    pub pool_misses: u64,
    pub queued: usize,
}

enum QueueItem {
    Record(Box<LogRecord>),
    Flush(oneshot::Sender<()>),
}

struct CoreInner {
    tx: flume::Sender<QueueItem>,
    pool: Arc<RecordPool>,
    consumers: RwLock<Vec<Arc<dyn LogConsumer>>>,
    loggers: RwLock<FxHashMap<String, Logger>>,
    accepting: AtomicBool,
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl CoreInner {
    fn dispatch(&self, item: QueueItem) {
        match item {
            QueueItem::Record(rec) => {
                // Clone the consumer list out of the lock so a consumer that
                // mutates registrations from its callback cannot deadlock.
                let consumers: Vec<Arc<dyn LogConsumer>> = self.consumers.read().clone();
                for consumer in &consumers {
                    let outcome = catch_unwind(AssertUnwindSafe(|| consumer.on_event(&rec)));
                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => consumer.on_error(&rec, &err),
                        Err(_) => {
                            let err = io::Error::other("log consumer panicked");
                            consumer.on_error(&rec, &err);
                        }
                    }
                }
                self.pool.release(rec);
            }
            QueueItem::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

/// Lock-free, pool-backed log pipeline decoupling emitters from consumers.
///
/// Emitters borrow a record from a bounded pool, fill it in place, and
/// enqueue it on a bounded MPSC queue; a single dispatch task drains the
/// queue in batches and fans each record out to every registered
/// [`LogConsumer`] synchronously. A full queue drops the record rather than
/// blocking the emitter. Records emitted by one task reach every consumer
/// in emission order; no ordering is promised across emitters.
///
/// Construction spawns the dispatch task and therefore requires a running
/// Tokio runtime.
///
/// # Example
///
/// ```rust
/// use pipewright::logging::{LoggingCore, MemoryConsumer};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let core = LoggingCore::default();
/// let sink = MemoryConsumer::new();
/// core.add_consumer(Arc::new(sink.clone()));
///
/// core.logger("build").info("compiling 12 crates");
/// core.shutdown(Duration::from_secs(1)).await;
/// assert_eq!(sink.messages(), vec!["compiling 12 crates".to_string()]);
/// # }
/// ```
pub struct LoggingCore {
    inner: Arc<CoreInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for LoggingCore {
    fn default() -> Self {
        Self::new(LogConfig::default())
    }
}

impl LoggingCore {
    pub fn new(config: LogConfig) -> Self {
        let (tx, rx) = flume::bounded(config.queue_capacity.max(1));
        let inner = Arc::new(CoreInner {
            tx,
            pool: Arc::new(RecordPool::new(config.pool_capacity)),
            consumers: RwLock::new(Vec::new()),
            loggers: RwLock::new(FxHashMap::default()),
            accepting: AtomicBool::new(true),
            emitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });

        let worker_inner = Arc::clone(&inner);
        let batch_size = config.batch_size.max(1);
        let handle = tokio::spawn(async move {
            loop {
                let first = match rx.recv_async().await {
                    Ok(item) => item,
                    Err(_) => break,
                };
                worker_inner.dispatch(first);
                for _ in 1..batch_size {
                    match rx.try_recv() {
                        Ok(item) => worker_inner.dispatch(item),
                        Err(_) => break,
                    }
                }
                // Let emitters and other tasks run between batches.
                tokio::task::yield_now().await;
            }
        });

        Self {
            inner,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Obtain (or reuse) the logger handle for `name`.
    pub fn logger(&self, name: &str) -> Logger {
        if let Some(existing) = self.inner.loggers.read().get(name) {
            return existing.clone();
        }
        let mut loggers = self.inner.loggers.write();
        loggers
            .entry(name.to_string())
            .or_insert_with(|| Logger {
                name: Arc::from(name),
                core: Arc::downgrade(&self.inner),
            })
            .clone()
    }

    pub fn add_consumer(&self, consumer: Arc<dyn LogConsumer>) {
        consumer.on_registered();
        self.inner.consumers.write().push(consumer);
    }

    /// Remove the first consumer whose id matches. Returns whether one was
    /// found; `on_removed` fires for the removed consumer.
    pub fn remove_consumer(&self, id: &str) -> bool {
        let removed = {
            let mut consumers = self.inner.consumers.write();
            consumers
                .iter()
                .position(|c| c.id() == id)
                .map(|idx| consumers.remove(idx))
        };
        match removed {
            Some(consumer) => {
                consumer.on_removed();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.inner.consumers.read().len()
    }

    /// Whether the pipeline is accepting records and the dispatch task is
    /// alive.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        if !self.inner.accepting.load(Ordering::Acquire) {
            return false;
        }
        match self.worker.lock().as_ref() {
            Some(handle) => !handle.is_finished(),
            None => false,
        }
    }

    #[must_use]
    pub fn metrics(&self) -> LogMetrics {
        LogMetrics {
            emitted: self.inner.emitted.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            pool_misses: self.inner.pool.misses(),
            queued: self.inner.tx.len(),
        }
    }

    /// Block new records, drain outstanding ones bounded by `timeout`,
    /// notify every consumer via `on_removed`, and stop the dispatch task.
    /// Records still queued past the deadline are dropped.
    pub async fn shutdown(&self, timeout: Duration) {
        self.inner.accepting.store(false, Ordering::Release);

        let (done_tx, done_rx) = oneshot::channel();
        let flush = async {
            if self
                .inner
                .tx
                .send_async(QueueItem::Flush(done_tx))
                .await
                .is_ok()
            {
                let _ = done_rx.await;
            }
        };
        let _ = tokio::time::timeout(timeout, flush).await;

        let consumers = std::mem::take(&mut *self.inner.consumers.write());
        for consumer in &consumers {
            consumer.on_removed();
        }

        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for LoggingCore {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
    }
}

/// Cheap, cloneable handle bound to a logger name.
///
/// Holds a weak reference to its core: emitting after the core is gone is a
/// silent no-op, which keeps handles safe to stash anywhere.
#[derive(Clone, Debug)]
pub struct Logger {
    name: Arc<str>,
    core: Weak<CoreInner>,
}

impl Logger {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        self.emit(level, message, LogSource::Logger, None);
    }

    pub fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Error record with a structured exception payload.
    pub fn error_with(&self, message: &str, exception: LogException) {
        self.emit(LogLevel::Error, message, LogSource::Logger, Some(exception));
    }

    /// Captured subprocess output line; stderr maps to `Error` level.
    pub fn output_line(&self, source: LogSource, line: &str) {
        let level = match source {
            LogSource::Stderr => LogLevel::Error,
            _ => LogLevel::Info,
        };
        self.emit(level, line, source, None);
    }

    fn emit(
        &self,
        level: LogLevel,
        message: &str,
        source: LogSource,
        exception: Option<LogException>,
    ) {
        let Some(inner) = self.core.upgrade() else {
            return;
        };
        if !inner.accepting.load(Ordering::Acquire) {
            return;
        }
        let mut rec = inner.pool.acquire();
        let ctx = current_log_context();
        rec.fill(level, &self.name, message, ctx.as_ref(), source, exception);
        match inner.tx.try_send(QueueItem::Record(rec)) {
            Ok(()) => {
                inner.emitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                // Queue full or core shut down: never block the emitter.
                inner.dropped.fetch_add(1, Ordering::Relaxed);
                if let QueueItem::Record(rec) = err.into_inner() {
                    inner.pool.release(rec);
                }
            }
        }
    }
}
