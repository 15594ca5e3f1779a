//! Tests for utility functions

use dynamic_worker_pool::util::{init_tracing, wall_clock_ms, Clock, ManualClock, MonotonicClock};

#[test]
fn test_manual_clock_moves_only_when_told() {
    let clock = ManualClock::new(100);
    assert_eq!(clock.now_ms(), 100);
    clock.advance(50);
    assert_eq!(clock.now_ms(), 150);
    clock.set(1_000);
    assert_eq!(clock.now_ms(), 1_000);
}

#[test]
fn test_monotonic_clock_never_decreases() {
    let clock = MonotonicClock::new();
    let mut last = clock.now_ms();
    for _ in 0..1_000 {
        let now = clock.now_ms();
        assert!(now >= last);
        last = now;
    }
}

#[test]
fn test_wall_clock_is_after_2020() {
    assert!(wall_clock_ms() > 1_577_836_800_000);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    assert!(tracing::dispatcher::has_been_set());
}
