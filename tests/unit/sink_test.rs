//! Tests for alert sinks

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dynamic_worker_pool::core::{
    AlertEvent, AlertEventKind, AlertMonitor, AlertOutcome, AlertSink, InMemoryAlertSink,
    UtilizationReading,
};
use dynamic_worker_pool::util::ManualClock;

fn hot_reading() -> UtilizationReading {
    UtilizationReading {
        active_workers: 9,
        max_pool_size: 10,
        queued_tasks: 4,
        rejected_count: 2,
    }
}

#[test]
fn test_closure_sink_receives_both_event_kinds() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let sink = move |event: &AlertEvent| {
        assert_eq!(event.queued_tasks, 4);
        counter.fetch_add(1, Ordering::SeqCst);
    };
    let monitor =
        AlertMonitor::new(0.8, 1_000, Arc::new(ManualClock::new(5)), Some(Arc::new(sink))).unwrap();
    assert_eq!(monitor.evaluate(&hot_reading()), AlertOutcome::Fired);
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[test]
fn test_in_memory_sink_filters_by_kind() {
    let sink = Arc::new(InMemoryAlertSink::new(16));
    let clock = Arc::new(ManualClock::new(100));
    let monitor = AlertMonitor::new(0.5, 1_000, clock.clone(), Some(sink.clone())).unwrap();

    assert_eq!(monitor.evaluate(&hot_reading()), AlertOutcome::Fired);
    clock.advance(10);
    assert_eq!(monitor.evaluate(&hot_reading()), AlertOutcome::CoolingDown);

    assert_eq!(sink.events_of(AlertEventKind::ConditionMet).len(), 2);
    assert_eq!(sink.fired_count(), 1);

    let fired = &sink.events_of(AlertEventKind::Fired)[0];
    assert_eq!(fired.rejected_count, 2);
    assert_eq!(fired.monotonic_ms, 100);
    assert!((fired.utilization - 0.9).abs() < 1e-9);

    sink.clear();
    assert!(sink.events().is_empty());
}

#[test]
fn test_alert_event_serializes_kind_in_snake_case() {
    let sink = Arc::new(InMemoryAlertSink::new(4));
    let monitor =
        AlertMonitor::new(0.5, 0, Arc::new(ManualClock::new(1)), Some(sink.clone())).unwrap();
    monitor.evaluate(&hot_reading());
    let json = serde_json::to_string(&sink.events()[0]).unwrap();
    assert!(json.contains("\"kind\":\"condition_met\""), "{json}");
}
