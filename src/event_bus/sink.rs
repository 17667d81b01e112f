use std::any::type_name;
use std::fs::File;
use std::io::{self, Result as IoResult, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex as ParkingMutex;

use super::event::{Event, ResourceEvent, StageEvent};
use crate::telemetry::{PlainFormatter, TelemetryFormatter};
use crate::types::StageStatus;

/// Output target for bus events.
///
/// Sinks run on their own worker task; blocking I/O in `handle` stalls only
/// that sink, never publishers or other sinks.
pub trait EventSink: Send + Sync {
    /// Handle one event. The sink decides how to render or route it.
    fn handle(&mut self, event: &Event) -> IoResult<()>;

    /// Stable identifier used in sink diagnostics. Defaults to the concrete
    /// type name.
    fn name(&self) -> String {
        type_name::<Self>().to_string()
    }
}

/// Human-facing sink for interactive runs.
///
/// Renders events through a [`TelemetryFormatter`] onto stdout. At the
/// monitor's default 100 ms sampling a job emits ten usage snapshots per
/// second, so those are suppressed unless [`Self::verbose`] is enabled;
/// warnings, violations, and stage lifecycle always print.
pub struct ConsoleSink<F: TelemetryFormatter = PlainFormatter> {
    formatter: F,
    verbose: bool,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self {
            formatter: PlainFormatter,
            verbose: false,
        }
    }
}

impl<F: TelemetryFormatter> ConsoleSink<F> {
    pub fn with_formatter(formatter: F) -> Self {
        Self {
            formatter,
            verbose: false,
        }
    }

    /// Also print periodic usage snapshots.
    #[must_use]
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    fn wants(&self, event: &Event) -> bool {
        self.verbose || !matches!(event, Event::Resource(ResourceEvent::Usage(_)))
    }
}

impl<F: TelemetryFormatter> EventSink for ConsoleSink<F> {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        if !self.wants(event) {
            return Ok(());
        }
        let rendered = self.formatter.render_event(event).join_lines();
        let mut out = io::stdout().lock();
        out.write_all(rendered.as_bytes())?;
        out.flush()
    }

    fn name(&self) -> String {
        "console".to_string()
    }
}

/// In-memory sink for tests and snapshots, with stage-aware accessors.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<ParkingMutex<Vec<Event>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything captured so far, in delivery order. Clones the buffer so
    /// callers can inspect state without holding the mutex.
    pub fn snapshot(&self) -> Vec<Event> {
        self.entries.lock().clone()
    }

    /// Stage lifecycle events only, in delivery order.
    pub fn stage_events(&self) -> Vec<StageEvent> {
        self.entries
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Stage(stage) => Some(stage.clone()),
                _ => None,
            })
            .collect()
    }

    /// Terminal status of `stage`, if its end event was captured.
    pub fn stage_status(&self, stage: &str) -> Option<StageStatus> {
        self.entries.lock().iter().rev().find_map(|event| match event {
            Event::Stage(StageEvent::End { stage: name, status, .. }) if name == stage => {
                Some(*status)
            }
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.entries.lock().push(event.clone());
        Ok(())
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}

/// Machine-readable event log: one normalized JSON object per line, in the
/// schema of [`Event::to_json_value`].
///
/// [`Self::for_execution`] names the file after the execution id
/// (`<execution-id>.events.jsonl`) so a job's event log lands next to its
/// other artifacts and the correlation back to the job result is the
/// filename itself.
pub struct EventLogSink {
    writer: Box<dyn Write + Send + Sync>,
    path: Option<PathBuf>,
}

impl EventLogSink {
    pub fn new(writer: Box<dyn Write + Send + Sync>) -> Self {
        Self { writer, path: None }
    }

    /// Write to `path`, created or truncated.
    pub fn create(path: impl AsRef<Path>) -> IoResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            writer: Box::new(file),
            path: Some(path),
        })
    }

    /// Write to `<dir>/<execution_id>.events.jsonl`, creating `dir` as
    /// needed.
    pub fn for_execution(dir: impl AsRef<Path>, execution_id: &str) -> IoResult<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        Self::create(dir.as_ref().join(format!("{execution_id}.events.jsonl")))
    }
}

impl EventSink for EventLogSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        let json = event
            .to_json_string()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()
    }

    fn name(&self) -> String {
        match &self.path {
            Some(path) => format!("event-log({})", path.display()),
            None => "event-log".to_string(),
        }
    }
}

/// Forwards events into a flume channel for live followers: SSE handlers,
/// progress UIs, anything consuming on its own task.
///
/// [`Self::stage_events_only`] drops everything but stage lifecycle, so a
/// progress follower is not flooded by usage snapshots and file events. A
/// dropped receiver errors the sink; the bus reports it as a diagnostic
/// without affecting other sinks.
pub struct ChannelSink {
    tx: flume::Sender<Event>,
    stages_only: bool,
}

impl ChannelSink {
    pub fn new(tx: flume::Sender<Event>) -> Self {
        Self {
            tx,
            stages_only: false,
        }
    }

    /// Forward only `StageStart`/`StageEnd` events.
    pub fn stage_events_only(tx: flume::Sender<Event>) -> Self {
        Self {
            tx,
            stages_only: true,
        }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        if self.stages_only && !matches!(event, Event::Stage(_)) {
            return Ok(());
        }
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "event follower went away"))
    }

    fn name(&self) -> String {
        if self.stages_only {
            "channel(stages)".to_string()
        } else {
            "channel".to_string()
        }
    }
}
