use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pipewright::logging::{
    LogConfig, LogConsumer, LogContext, LogRecord, LoggingCore, MemoryConsumer, with_log_context,
};
use pipewright::types::{LogLevel, LogSource};

#[tokio::test]
async fn records_arrive_in_emission_order_per_emitter() {
    let core = LoggingCore::default();
    let sink = MemoryConsumer::new();
    core.add_consumer(Arc::new(sink.clone()));

    let logger = core.logger("ordered");
    for i in 0..100 {
        logger.info(&format!("message-{i}"));
    }
    core.shutdown(Duration::from_secs(1)).await;

    let expected: Vec<String> = (0..100).map(|i| format!("message-{i}")).collect();
    assert_eq!(sink.messages(), expected);
}

#[tokio::test]
async fn logger_handles_are_cached_by_name() {
    let core = LoggingCore::default();
    let a = core.logger("build");
    let b = core.logger("build");
    assert_eq!(a.name(), b.name());
    core.shutdown(Duration::from_millis(100)).await;
}

struct FailingConsumer {
    errors: Arc<AtomicUsize>,
}

impl LogConsumer for FailingConsumer {
    fn id(&self) -> String {
        "failing".to_string()
    }

    fn on_event(&self, _record: &LogRecord) -> io::Result<()> {
        Err(io::Error::other("sink unavailable"))
    }

    fn on_error(&self, _record: &LogRecord, _error: &io::Error) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

struct PanickingConsumer;

impl LogConsumer for PanickingConsumer {
    fn id(&self) -> String {
        "panicking".to_string()
    }

    fn on_event(&self, _record: &LogRecord) -> io::Result<()> {
        panic!("consumer bug");
    }
}

#[tokio::test]
async fn failing_consumer_never_affects_its_peers() {
    let core = LoggingCore::default();
    let errors = Arc::new(AtomicUsize::new(0));
    let healthy = MemoryConsumer::new();
    core.add_consumer(Arc::new(FailingConsumer {
        errors: Arc::clone(&errors),
    }));
    core.add_consumer(Arc::new(PanickingConsumer));
    core.add_consumer(Arc::new(healthy.clone()));

    let logger = core.logger("app");
    logger.info("one");
    logger.info("two");
    core.shutdown(Duration::from_secs(1)).await;

    assert_eq!(healthy.messages(), vec!["one".to_string(), "two".to_string()]);
    assert_eq!(errors.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn log_context_is_captured_into_records() {
    let core = LoggingCore::default();
    let sink = MemoryConsumer::new();
    core.add_consumer(Arc::new(sink.clone()));
    let logger = core.logger("scoped");

    let ctx = LogContext::new()
        .with_correlation_id("corr-9")
        .with_user("dev")
        .with_entry("stage", "Build");
    with_log_context(ctx, async {
        logger.info("inside");
    })
    .await;
    logger.info("outside");
    core.shutdown(Duration::from_secs(1)).await;

    let records = sink.snapshot();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].correlation_id.as_deref(), Some("corr-9"));
    assert_eq!(records[0].context.get("user").map(String::as_str), Some("dev"));
    assert_eq!(
        records[0].context.get("stage").map(String::as_str),
        Some("Build")
    );
    assert_eq!(records[1].correlation_id, None);
}

#[tokio::test]
async fn shutdown_drains_then_blocks_new_records() {
    let core = LoggingCore::default();
    let sink = MemoryConsumer::new();
    core.add_consumer(Arc::new(sink.clone()));
    let logger = core.logger("drain");

    for i in 0..50 {
        logger.info(&format!("r{i}"));
    }
    core.shutdown(Duration::from_secs(1)).await;
    assert_eq!(sink.snapshot().len(), 50);
    assert!(!core.is_healthy());

    // Late emits are silent no-ops.
    logger.info("late");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(sink.snapshot().len(), 50);
}

struct LifecycleConsumer {
    removed: Arc<AtomicUsize>,
}

impl LogConsumer for LifecycleConsumer {
    fn id(&self) -> String {
        "lifecycle".to_string()
    }

    fn on_event(&self, _record: &LogRecord) -> io::Result<()> {
        Ok(())
    }

    fn on_removed(&self) {
        self.removed.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn shutdown_notifies_every_consumer() {
    let core = LoggingCore::default();
    let removed = Arc::new(AtomicUsize::new(0));
    core.add_consumer(Arc::new(LifecycleConsumer {
        removed: Arc::clone(&removed),
    }));
    core.add_consumer(Arc::new(MemoryConsumer::new()));
    assert_eq!(core.consumer_count(), 2);

    core.shutdown(Duration::from_secs(1)).await;
    assert_eq!(removed.load(Ordering::SeqCst), 1);
    assert_eq!(core.consumer_count(), 0);
}

#[tokio::test]
async fn remove_consumer_by_id() {
    let core = LoggingCore::default();
    core.add_consumer(Arc::new(MemoryConsumer::new()));
    assert_eq!(core.consumer_count(), 1);
    assert!(core.remove_consumer("memory"));
    assert!(!core.remove_consumer("memory"));
    assert_eq!(core.consumer_count(), 0);
    core.shutdown(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn steady_state_reuses_pooled_records() {
    let core = LoggingCore::new(LogConfig {
        queue_capacity: 64,
        pool_capacity: 8,
        batch_size: 8,
    });
    let sink = MemoryConsumer::new();
    core.add_consumer(Arc::new(sink.clone()));
    let logger = core.logger("pooled");

    // Emit in small waves so the dispatch task drains between them; the
    // pool then satisfies every acquisition without allocating.
    for wave in 0..20 {
        for i in 0..4 {
            logger.info(&format!("w{wave}-{i}"));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    core.shutdown(Duration::from_secs(1)).await;

    assert_eq!(sink.snapshot().len(), 80);
    let metrics = core.metrics();
    assert_eq!(metrics.emitted, 80);
    assert_eq!(metrics.dropped, 0);
    assert_eq!(metrics.pool_misses, 0);
}

#[tokio::test]
async fn full_queue_drops_instead_of_blocking() {
    // Tiny queue with no consumers: the dispatch task still drains, so pile
    // emits in one synchronous burst to overrun the buffer.
    let core = LoggingCore::new(LogConfig {
        queue_capacity: 4,
        pool_capacity: 4,
        batch_size: 1,
    });
    let logger = core.logger("burst");
    for i in 0..10_000 {
        logger.info(&format!("b{i}"));
    }
    let metrics = core.metrics();
    assert_eq!(metrics.emitted + metrics.dropped, 10_000);
    assert!(metrics.dropped > 0, "metrics: {metrics:?}");
    core.shutdown(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn subprocess_lines_carry_their_source() {
    let core = LoggingCore::default();
    let sink = MemoryConsumer::new();
    core.add_consumer(Arc::new(sink.clone()));
    let logger = core.logger("sh");

    logger.output_line(LogSource::Stdout, "compiled ok");
    logger.output_line(LogSource::Stderr, "warning: deprecated");
    core.shutdown(Duration::from_secs(1)).await;

    let records = sink.snapshot();
    assert_eq!(records[0].source, LogSource::Stdout);
    assert_eq!(records[0].level, LogLevel::Info);
    assert_eq!(records[1].source, LogSource::Stderr);
    assert_eq!(records[1].level, LogLevel::Error);
}
