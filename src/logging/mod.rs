//! High-throughput logging core.
//!
//! A bounded pool of reusable records feeds a bounded MPSC queue drained by
//! one dispatch task, which fans records out to registered consumers. The
//! design goals, in order:
//!
//! 1. **Emitters never block.** A full queue drops the record (counted).
//! 2. **No steady-state allocation.** Records and their buffers are pooled
//!    and reset on release.
//! 3. **Consumer isolation.** A failing or panicking consumer is reported
//!    through `on_error` and cannot affect its peers or the queue.
//! 4. **Per-emitter ordering.** Records from one task reach each consumer
//!    in emission order.
//!
//! Correlation ids and user/session metadata travel as a task-local
//! [`LogContext`] captured into each record at emit time.

pub mod consumer;
pub mod context;
pub mod core;
pub mod pool;
pub mod record;

pub use consumer::{ConsoleConsumer, JsonLinesConsumer, LogConsumer, MemoryConsumer};
pub use context::{LogContext, current_log_context, with_log_context};
pub use core::{LogConfig, LogMetrics, Logger, LoggingCore};
pub use pool::RecordPool;
pub use record::{LogException, LogRecord};
