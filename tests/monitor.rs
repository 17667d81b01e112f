mod common;

use std::time::Duration;

use common::TestHarness;
use pipewright::event_bus::{Event, ResourceEvent};
use pipewright::monitor::{
    Monitored, MonitorConfig, ResourceKind, ResourceLimits, ResourceMonitor,
};

fn fast_config() -> MonitorConfig {
    MonitorConfig {
        sample_interval: Duration::from_millis(10),
        warn_threshold: 0.8,
    }
}

#[tokio::test]
async fn null_limits_never_warn_or_violate() {
    let harness = TestHarness::new();
    let monitor = ResourceMonitor::new(harness.bus.emitter())
        .wall_clock_only()
        .with_config(fast_config());

    let outcome = monitor
        .run("exec-free", ResourceLimits::unlimited(), async {
            tokio::time::sleep(Duration::from_millis(80)).await;
            "done"
        })
        .await;
    harness.settle().await;

    assert!(matches!(outcome, Monitored::Completed { value: "done", .. }));
    let alerts: Vec<_> = harness
        .bus_sink
        .snapshot()
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                Event::Resource(ResourceEvent::Warning { .. })
                    | Event::Resource(ResourceEvent::Violation(_))
            )
        })
        .collect();
    assert!(alerts.is_empty(), "unexpected alerts: {alerts:?}");
}

#[tokio::test]
async fn usage_snapshots_are_published_periodically() {
    let harness = TestHarness::new();
    let monitor = ResourceMonitor::new(harness.bus.emitter())
        .wall_clock_only()
        .with_config(fast_config());

    monitor
        .run("exec-usage", ResourceLimits::unlimited(), async {
            tokio::time::sleep(Duration::from_millis(60)).await;
        })
        .await;
    harness.settle().await;

    let usage_count = harness
        .bus_sink
        .snapshot()
        .into_iter()
        .filter(|e| matches!(e, Event::Resource(ResourceEvent::Usage(_))))
        .count();
    assert!(usage_count >= 2, "got {usage_count} usage events");
}

#[tokio::test]
async fn warning_fires_once_before_violation() {
    let harness = TestHarness::new();
    let monitor = ResourceMonitor::new(harness.bus.emitter())
        .wall_clock_only()
        .with_config(fast_config());
    let limits = ResourceLimits::unlimited().with_max_wall_time_ms(200);

    let outcome = monitor
        .run("exec-warn", limits, async {
            tokio::time::sleep(Duration::from_secs(2)).await;
        })
        .await;
    harness.settle().await;

    let violation = outcome.violation().expect("violation");
    assert_eq!(violation.kind, ResourceKind::WallTime);
    assert!(violation.actual > 200);
    assert_eq!(violation.limit, 200);

    let events = harness.bus_sink.snapshot();
    let warnings: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::Resource(ResourceEvent::Warning { kind, threshold_pct, .. }) => {
                Some((*kind, *threshold_pct))
            }
            _ => None,
        })
        .collect();
    assert_eq!(warnings, vec![(ResourceKind::WallTime, 0.8)]);

    let violation_events = events
        .iter()
        .filter(|e| matches!(e, Event::Resource(ResourceEvent::Violation(_))))
        .count();
    assert_eq!(violation_events, 1);
}

#[tokio::test]
async fn completed_stats_include_efficiency_ratios() {
    let monitor = ResourceMonitor::unobserved()
        .wall_clock_only()
        .with_config(fast_config());
    let limits = ResourceLimits::unlimited().with_max_wall_time_ms(1_000);

    let outcome = monitor
        .run("exec-eff", limits, async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            7u32
        })
        .await;

    let Monitored::Completed { value, stats } = outcome else {
        panic!("expected completion");
    };
    assert_eq!(value, 7);
    assert_eq!(stats.efficiency.len(), 1);
    let wall = &stats.efficiency[0];
    assert_eq!(wall.kind, ResourceKind::WallTime);
    assert_eq!(wall.limit, 1_000);
    assert!(wall.ratio > 0.0 && wall.ratio < 1.0, "ratio {}", wall.ratio);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn proc_sampler_feeds_real_usage() {
    let monitor = ResourceMonitor::unobserved().with_config(fast_config());
    let outcome = monitor
        .run("exec-proc", ResourceLimits::unlimited(), async {
            tokio::time::sleep(Duration::from_millis(60)).await;
        })
        .await;
    let stats = outcome.stats();
    assert!(stats.usage.threads >= 1);
    assert!(stats.usage.file_handles >= 1);
}
