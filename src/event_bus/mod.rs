//! Typed pub/sub for pipeline domain events.
//!
//! The module is organised around a broadcast-based [`EventHub`] and helpers
//! for configuring sinks ([`PipelineEventBus`]) and following the resulting
//! [`EventStream`]. Events cover stage lifecycle, workspace file changes,
//! resource alerts, and diagnostics; sink failures surface as
//! [`SinkDiagnostic`]s without interrupting delivery.

pub mod bus;
pub mod emitter;
pub mod event;
pub mod hub;
pub mod sink;

pub use bus::{PipelineEventBus, SinkDiagnostic};
pub use emitter::{EmitterError, EventEmitter, NullEmitter};
pub use event::{
    DiagnosticEvent, Event, FileChangeKind, FileEvent, ResourceEvent, STREAM_END_SCOPE, StageEvent,
};
pub use hub::{EventHub, EventHubMetrics, EventStream, HubEmitter};
pub use sink::{ChannelSink, ConsoleSink, EventLogSink, EventSink, MemorySink};
