use std::any::type_name;
use std::io::{self, Result as IoResult, Write};
use std::sync::Arc;

use parking_lot::Mutex as ParkingMutex;

use super::record::LogRecord;

/// A registered sink for log records.
///
/// `on_event` is called synchronously on the delivery task; implementations
/// must not retain the record reference past the callback — clone what needs
/// to outlive it. A failing or panicking consumer never affects its peers
/// and never blocks the queue: errors are routed to [`Self::on_error`].
pub trait LogConsumer: Send + Sync {
    /// Stable identifier used for removal and diagnostics. Defaults to the
    /// concrete type name.
    fn id(&self) -> String {
        type_name::<Self>().to_string()
    }

    /// Handle one record.
    fn on_event(&self, record: &LogRecord) -> IoResult<()>;

    /// Called when `on_event` returned an error (or panicked).
    fn on_error(&self, _record: &LogRecord, _error: &io::Error) {}

    /// Called once when the consumer is added to a core.
    fn on_registered(&self) {}

    /// Called once when the consumer is removed or the core shuts down.
    fn on_removed(&self) {}
}

/// Writes plain-text lines to stdout.
#[derive(Default)]
pub struct ConsoleConsumer;

impl LogConsumer for ConsoleConsumer {
    fn id(&self) -> String {
        "console".to_string()
    }

    fn on_event(&self, record: &LogRecord) -> IoResult<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", record.render_line())
    }
}

/// Captures owned record clones for tests and snapshots.
#[derive(Clone, Default)]
pub struct MemoryConsumer {
    entries: Arc<ParkingMutex<Vec<LogRecord>>>,
    errors: Arc<ParkingMutex<Vec<String>>>,
}

impl MemoryConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured records.
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.entries.lock().clone()
    }

    /// Messages in capture order.
    pub fn messages(&self) -> Vec<String> {
        self.entries.lock().iter().map(|r| r.message.clone()).collect()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        self.errors.lock().clear();
    }
}

impl LogConsumer for MemoryConsumer {
    fn id(&self) -> String {
        "memory".to_string()
    }

    fn on_event(&self, record: &LogRecord) -> IoResult<()> {
        self.entries.lock().push(record.clone());
        Ok(())
    }

    fn on_error(&self, _record: &LogRecord, error: &io::Error) {
        self.errors.lock().push(error.to_string());
    }
}

/// Serializes records as JSON Lines into any writer.
pub struct JsonLinesConsumer {
    handle: ParkingMutex<Box<dyn Write + Send + Sync>>,
}

impl JsonLinesConsumer {
    pub fn new(handle: Box<dyn Write + Send + Sync>) -> Self {
        Self {
            handle: ParkingMutex::new(handle),
        }
    }
}

impl LogConsumer for JsonLinesConsumer {
    fn id(&self) -> String {
        "json-lines".to_string()
    }

    fn on_event(&self, record: &LogRecord) -> IoResult<()> {
        let json = serde_json::to_string(&record.to_json_value())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut handle = self.handle.lock();
        writeln!(handle, "{json}")?;
        handle.flush()
    }
}
