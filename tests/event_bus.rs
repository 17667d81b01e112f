use std::io;
use std::time::Duration;

use pipewright::event_bus::{
    ChannelSink, Event, EventLogSink, EventSink, MemorySink, PipelineEventBus, STREAM_END_SCOPE,
    StageEvent,
};
use pipewright::types::StageStatus;

#[tokio::test]
async fn stop_listener_flushes_pending_events() {
    let sink = MemorySink::new();
    let snapshot = sink.clone();
    let bus = PipelineEventBus::with_sink(sink);
    bus.listen_for_events();

    bus.emitter().emit(Event::stage_start("Build")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    bus.stop_listener().await;

    let entries = snapshot.snapshot();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].scope_label(), "stage:start");
}

#[tokio::test]
async fn stopping_without_events_is_noop() {
    let bus = PipelineEventBus::with_sink(MemorySink::new());
    bus.listen_for_events();
    bus.stop_listener().await;
}

#[tokio::test]
async fn subscribers_see_events_in_publish_order() {
    let bus = PipelineEventBus::without_sinks();
    let mut stream = bus.subscribe();
    let emitter = bus.emitter();

    emitter.emit(Event::stage_start("A")).unwrap();
    emitter
        .emit(Event::stage_end("A", 12, StageStatus::Success))
        .unwrap();
    emitter.emit(Event::diagnostic("engine", "done")).unwrap();

    assert_eq!(stream.recv().await.unwrap().scope_label(), "stage:start");
    assert_eq!(stream.recv().await.unwrap().scope_label(), "stage:end");
    assert_eq!(stream.recv().await.unwrap().scope_label(), "engine");
}

#[tokio::test]
async fn job_event_collection_stops_at_the_stream_end_marker() {
    let bus = PipelineEventBus::without_sinks();
    let mut stream = bus.subscribe();
    let emitter = bus.emitter();

    emitter.emit(Event::stage_start("A")).unwrap();
    emitter
        .emit(Event::stage_end("A", 3, StageStatus::Success))
        .unwrap();
    emitter
        .emit(Event::diagnostic(
            STREAM_END_SCOPE,
            "execution=exec-1 status=completed",
        ))
        .unwrap();
    emitter.emit(Event::diagnostic("late", "after the end")).unwrap();

    let events = stream.collect_job_events().await;
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], Event::Stage(StageEvent::Start { .. })));
    assert!(matches!(events[1], Event::Stage(StageEvent::End { .. })));
}

#[tokio::test]
async fn stage_event_follower_skips_non_stage_noise() {
    let bus = PipelineEventBus::without_sinks();
    let mut stream = bus.subscribe();
    let emitter = bus.emitter();

    emitter.emit(Event::diagnostic("noise", "ignore")).unwrap();
    emitter.emit(Event::stage_start("Deploy")).unwrap();

    let stage = stream.next_stage_event().await.expect("stage event");
    assert_eq!(stage.stage(), "Deploy");
}

#[tokio::test]
async fn channel_sink_streams_to_flume() {
    let (tx, rx) = flume::unbounded();
    let bus = PipelineEventBus::with_sink(ChannelSink::new(tx));
    bus.listen_for_events();

    bus.emitter().emit(Event::diagnostic("s", "payload")).unwrap();
    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv_async())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.summary(), "payload");
    bus.stop_listener().await;
}

#[tokio::test]
async fn stage_only_channel_sink_filters_through_the_bus() {
    let (tx, rx) = flume::unbounded();
    let bus = PipelineEventBus::with_sink(ChannelSink::stage_events_only(tx));
    bus.listen_for_events();

    bus.emitter().emit(Event::diagnostic("noise", "skip")).unwrap();
    bus.emitter().emit(Event::stage_start("Build")).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    bus.stop_listener().await;

    let received: Vec<Event> = rx.drain().collect();
    assert_eq!(received.len(), 1);
    assert!(matches!(received[0], Event::Stage(_)));
}

#[tokio::test]
async fn event_log_sink_writes_one_json_line_per_event() {
    let dir = tempfile::tempdir().unwrap();
    let sink = EventLogSink::for_execution(dir.path(), "exec-42").unwrap();
    let bus = PipelineEventBus::with_sink(sink);
    bus.listen_for_events();

    bus.emitter().emit(Event::stage_start("Build")).unwrap();
    bus.emitter()
        .emit(Event::stage_end("Build", 8, StageStatus::Success))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    bus.stop_listener().await;

    let content =
        std::fs::read_to_string(dir.path().join("exec-42.events.jsonl")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["type"], "stage");
    assert_eq!(first["metadata"]["stage"], "Build");
    let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(second["metadata"]["status"], "Success");
}

struct BrokenSink;

impl EventSink for BrokenSink {
    fn handle(&mut self, _event: &Event) -> io::Result<()> {
        Err(io::Error::other("disk full"))
    }

    fn name(&self) -> String {
        "broken".to_string()
    }
}

#[tokio::test]
async fn sink_errors_surface_as_diagnostics_without_stopping_delivery() {
    let healthy = MemorySink::new();
    let snapshot = healthy.clone();
    let bus = PipelineEventBus::with_sinks(vec![Box::new(BrokenSink), Box::new(healthy)]);
    let mut diagnostics = bus.diagnostics();
    bus.listen_for_events();

    bus.emitter().emit(Event::diagnostic("s", "one")).unwrap();
    bus.emitter().emit(Event::diagnostic("s", "two")).unwrap();

    let diag = tokio::time::timeout(Duration::from_secs(1), diagnostics.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(diag.sink, "broken");
    assert!(diag.error.contains("disk full"));

    tokio::time::sleep(Duration::from_millis(20)).await;
    bus.stop_listener().await;
    assert_eq!(snapshot.snapshot().len(), 2);
}

#[tokio::test]
async fn emitting_after_close_reports_closed() {
    let bus = PipelineEventBus::without_sinks();
    let emitter = bus.emitter();
    bus.close_channel();
    assert!(emitter.emit(Event::diagnostic("s", "late")).is_err());
}

#[tokio::test]
async fn next_timeout_returns_none_when_quiet() {
    let bus = PipelineEventBus::without_sinks();
    let mut stream = bus.subscribe();
    assert!(stream.next_timeout(Duration::from_millis(30)).await.is_none());
}

#[test]
fn normalized_json_schema_for_stage_events() {
    let event = Event::stage_end("Deploy", 840, StageStatus::Failure);
    let json = event.to_json_value();
    assert_eq!(json["type"], "stage");
    assert_eq!(json["scope"], "stage:end");
    assert_eq!(json["metadata"]["stage"], "Deploy");
    assert_eq!(json["metadata"]["duration_ms"], 840);
    assert_eq!(json["metadata"]["status"], "Failure");
}
