use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::{sync::oneshot, task};

use super::emitter::EventEmitter;
use super::hub::{EventHub, EventHubMetrics, EventStream};
use super::sink::{ConsoleSink, EventSink};

const DEFAULT_BUFFER_CAPACITY: usize = 1024;
const DIAGNOSTICS_CAPACITY: usize = 256;

/// A sink failure observed by the bus.
///
/// Delivery carries on regardless; these records are the only trace a
/// misbehaving sink leaves. Subscribe via
/// [`PipelineEventBus::diagnostics`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SinkDiagnostic {
    /// The failing sink's [`EventSink::name`].
    pub sink: String,
    /// Human-readable error message produced by the sink.
    pub error: String,
    /// When the error was observed.
    pub when: DateTime<Utc>,
    /// Monotonic occurrence counter for this sink's errors.
    pub occurrence: u64,
}

/// Central event broadcasting system for pipeline execution events.
///
/// The bus receives events from the runtime, steps, and the resource
/// monitor, and broadcasts them to registered sinks. Each sink drains on
/// its own worker task, so a slow sink never stalls publishers or its
/// peers.
///
/// ```text
/// Runtime / Steps / Monitor
///     │ emitter.emit()
///     ▼
/// EventHub (broadcast)
///     ├──────┬──────┬─────────┐
///     ▼      ▼      ▼         ▼
/// Console Channel EventLog Custom
///  Sink    Sink    Sink      Sink
/// ```
///
/// Direct followers obtain an [`EventStream`] via [`Self::subscribe`];
/// sink errors are surfaced as [`SinkDiagnostic`]s rather than
/// interrupting delivery.
pub struct PipelineEventBus {
    sinks: Arc<parking_lot::Mutex<Vec<SinkEntry>>>,
    hub: Arc<EventHub>,
    diagnostics: broadcast::Sender<SinkDiagnostic>,
    started: AtomicBool,
}

impl Default for PipelineEventBus {
    fn default() -> Self {
        Self::with_sink(ConsoleSink::default())
    }
}

impl PipelineEventBus {
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self::with_capacity(sinks, DEFAULT_BUFFER_CAPACITY)
    }

    pub(crate) fn with_capacity(sinks: Vec<Box<dyn EventSink>>, buffer_capacity: usize) -> Self {
        let hub = EventHub::new(buffer_capacity);
        let (diagnostics, _) = broadcast::channel(DIAGNOSTICS_CAPACITY);
        let entries = sinks.into_iter().map(SinkEntry::new).collect();
        Self {
            sinks: Arc::new(parking_lot::Mutex::new(entries)),
            hub,
            diagnostics,
            started: AtomicBool::new(false),
        }
    }

    /// A bus with no sinks at all; useful when callers only subscribe.
    #[must_use]
    pub fn without_sinks() -> Self {
        Self::with_sinks(Vec::new())
    }

    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.add_boxed_sink(Box::new(sink));
    }

    pub fn add_boxed_sink(&self, sink: Box<dyn EventSink>) {
        let mut sinks = self.sinks.lock();
        let mut entry = SinkEntry::new(sink);
        if self.started.load(Ordering::SeqCst) {
            entry.spawn_worker(self.hub.clone(), self.diagnostics.clone());
        }
        sinks.push(entry);
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.lock().len()
    }

    /// Handle publishers use to emit events.
    pub fn emitter(&self) -> Arc<dyn EventEmitter> {
        Arc::new(self.hub.emitter())
    }

    /// Follow the underlying event stream directly.
    pub fn subscribe(&self) -> EventStream {
        self.hub.subscribe()
    }

    /// Subscribe to sink error diagnostics.
    pub fn diagnostics(&self) -> broadcast::Receiver<SinkDiagnostic> {
        self.diagnostics.subscribe()
    }

    /// Hub health counters.
    #[must_use]
    pub fn metrics(&self) -> EventHubMetrics {
        self.hub.metrics()
    }

    /// Start one worker task per sink. Idempotent.
    pub fn listen_for_events(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut sinks = self.sinks.lock();
        for entry in sinks.iter_mut() {
            entry.spawn_worker(self.hub.clone(), self.diagnostics.clone());
        }
    }

    /// Stop sink workers after letting them drain.
    pub async fn stop_listener(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        let entries: Vec<_> = {
            let mut sinks = self.sinks.lock();
            sinks.iter_mut().filter_map(|e| e.take_worker()).collect()
        };
        for worker in entries {
            let _ = worker.shutdown.send(());
            let _ = worker.handle.await;
        }
    }

    /// Close the hub so followers observe end-of-stream.
    pub fn close_channel(&self) {
        self.hub.close();
    }
}

impl Drop for PipelineEventBus {
    fn drop(&mut self) {
        if self.started.load(Ordering::SeqCst) {
            let mut sinks = self.sinks.lock();
            for entry in sinks.iter_mut() {
                entry.abort_worker();
            }
        }
    }
}

struct SinkEntry {
    sink: Arc<parking_lot::Mutex<Box<dyn EventSink>>>,
    error_count: Arc<AtomicU64>,
    worker: Option<SinkWorker>,
}

impl SinkEntry {
    fn new(sink: Box<dyn EventSink>) -> Self {
        Self {
            sink: Arc::new(parking_lot::Mutex::new(sink)),
            error_count: Arc::new(AtomicU64::new(0)),
            worker: None,
        }
    }

    fn spawn_worker(
        &mut self,
        hub: Arc<EventHub>,
        diagnostics: broadcast::Sender<SinkDiagnostic>,
    ) {
        if self.worker.is_some() {
            return;
        }
        let sink = Arc::clone(&self.sink);
        let error_count = Arc::clone(&self.error_count);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let mut stream = hub.subscribe();
        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = stream.recv() => {
                        let Some(event) = event else { break };
                        let outcome = {
                            let mut guard = sink.lock();
                            guard.handle(&event).map_err(|e| (guard.name(), e))
                        };
                        if let Err((name, err)) = outcome {
                            let occurrence = error_count.fetch_add(1, Ordering::Relaxed) + 1;
                            let _ = diagnostics.send(SinkDiagnostic {
                                sink: name,
                                error: err.to_string(),
                                when: Utc::now(),
                                occurrence,
                            });
                        }
                    }
                }
            }
        });
        self.worker = Some(SinkWorker {
            shutdown: shutdown_tx,
            handle,
        });
    }

    fn take_worker(&mut self) -> Option<SinkWorker> {
        self.worker.take()
    }

    fn abort_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown.send(());
            worker.handle.abort();
        }
    }
}

struct SinkWorker {
    shutdown: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}
