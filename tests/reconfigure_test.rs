//! Integration tests for live reconfiguration.
//!
//! These tests validate:
//! - Valid bounds are applied and visible in snapshots
//! - Invalid bounds leave every reading unchanged
//! - The rejection counter survives policy swaps and can be reset
//! - Shrinking drains surplus workers; growing serves the backlog
//! - Concurrent readers never observe a torn pair of bounds
//! - Snapshots always pair bounds with the policy installed alongside them

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use dynamic_worker_pool::config::{DynamicPoolConfig, ReconfigureRequest, RejectionPolicyKind};
use dynamic_worker_pool::core::{
    AbortPolicy, Admission, CallerRunsPolicy, DiscardPolicy, DynamicPool, PoolBounds, PoolError,
    Task,
};
use rand::Rng;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

fn pool(core: usize, max: usize, queue: usize) -> DynamicPool {
    DynamicPool::new(
        DynamicPoolConfig::new()
            .with_core_pool_size(core)
            .with_max_pool_size(max)
            .with_queue_capacity(queue)
            .with_rejection_policy(RejectionPolicyKind::Abort),
    )
    .unwrap()
}

fn occupy(pool: &DynamicPool, busy: usize) -> Sender<()> {
    let (release, wait): (Sender<()>, Receiver<()>) = crossbeam_channel::unbounded();
    for _ in 0..busy {
        let wait = wait.clone();
        pool.submit(move || {
            let _ = wait.recv();
        })
        .unwrap();
    }
    assert!(wait_until(|| pool.active_count() == busy));
    release
}

// ============================================================================
// VALIDATION
// ============================================================================

#[test]
fn test_random_valid_bounds_are_applied() {
    let pool = pool(2, 4, 8);
    let mut rng = rand::rng();
    for _ in 0..200 {
        let max = rng.random_range(1..=64_usize);
        let core = rng.random_range(0..=max);
        pool.reconfigure(core, max, CallerRunsPolicy).unwrap();
        let snap = pool.snapshot();
        assert_eq!((snap.core_pool_size, snap.max_pool_size), (core, max));
        assert_eq!(snap.rejection_policy, "caller_runs");
    }
    pool.shutdown();
}

#[test]
fn test_random_invalid_bounds_change_nothing() {
    let pool = pool(2, 4, 8);
    let mut rng = rand::rng();
    let before = pool.snapshot();
    for _ in 0..200 {
        let (core, max) = if rng.random_bool(0.5) {
            let max = rng.random_range(1..=64_usize);
            (rng.random_range(max + 1..=max + 64), max)
        } else {
            (rng.random_range(0..=64_usize), 0)
        };
        let err = pool.reconfigure(core, max, DiscardPolicy).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfiguration(_)));
    }
    for (core, max) in [(-1_i64, 4_i64), (2, -4), (-3, -3)] {
        let request = ReconfigureRequest {
            core_pool_size: core,
            max_pool_size: max,
            rejection_policy: Some(RejectionPolicyKind::Discard),
        };
        assert!(matches!(pool.apply(&request), Err(PoolError::InvalidConfiguration(_))));
    }
    let after = pool.snapshot();
    assert!(before.same_readings(&after), "{before:?} != {after:?}");
    pool.shutdown();
}

#[test]
fn test_request_without_policy_is_refused() {
    let pool = pool(2, 4, 8);
    let request: ReconfigureRequest = serde_json::from_str(
        r#"{"core_pool_size": 1, "max_pool_size": 2, "rejection_policy": null}"#,
    )
    .unwrap();
    assert!(pool.apply(&request).is_err());
    assert_eq!(pool.bounds(), PoolBounds { core: 2, max: 4 });
    pool.shutdown();
}

#[test]
fn test_snapshot_is_stable_without_mutation() {
    let pool = pool(2, 4, 8);
    pool.submit(|| {}).unwrap();
    assert!(wait_until(|| pool.completed_tasks() == 1));
    let first = pool.snapshot();
    let second = pool.snapshot();
    assert!(first.same_readings(&second));
    pool.shutdown();
}

// ============================================================================
// REJECTION COUNTER
// ============================================================================

#[test]
fn test_counter_survives_policy_swap() {
    let pool = pool(1, 1, 0);
    let release = occupy(&pool, 1);

    assert!(pool.submit(|| {}).is_err());
    assert!(pool.submit(|| {}).is_err());
    pool.reconfigure(1, 1, DiscardPolicy).unwrap();
    assert_eq!(pool.submit(|| {}).unwrap(), Admission::Rejected);
    assert_eq!(pool.rejected_count(), 3);

    let custom_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&custom_calls);
    pool.reconfigure(1, 1, move |_task: Task, _pool: &DynamicPool| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<(), PoolError>(())
    })
    .unwrap();
    assert_eq!(pool.rejection_policy_name(), "custom");
    pool.submit(|| {}).unwrap();
    assert_eq!(custom_calls.load(Ordering::SeqCst), 1);
    assert_eq!(pool.rejected_count(), 4);

    drop(release);
    pool.shutdown();
}

#[test]
fn test_reset_counter_then_count_again() {
    let pool = pool(1, 1, 0);
    let release = occupy(&pool, 1);
    for _ in 0..5 {
        let _ = pool.submit(|| {});
    }
    assert_eq!(pool.rejected_count(), 5);

    pool.reset_rejection_counter();
    assert_eq!(pool.rejected_count(), 0);
    assert_eq!(pool.snapshot().rejected_count, 0);

    let _ = pool.submit(|| {});
    assert_eq!(pool.rejected_count(), 1);

    drop(release);
    pool.shutdown();
}

// ============================================================================
// CAPACITY CHANGES
// ============================================================================

#[test]
fn test_shrink_lets_surplus_workers_drain() {
    let pool = pool(4, 4, 0);
    let release = occupy(&pool, 4);

    pool.reconfigure(1, 2, AbortPolicy).unwrap();
    assert_eq!(pool.max_pool_size(), 2);
    assert_eq!(pool.pool_size(), 4);
    assert_eq!(pool.active_count(), 4);

    drop(release);
    assert!(wait_until(|| pool.pool_size() <= 2));
    assert!(wait_until(|| pool.completed_tasks() == 4));
    pool.shutdown();
    assert!(pool.await_termination(Duration::from_secs(5)));
}

#[test]
fn test_grow_serves_queued_backlog() {
    let pool = pool(1, 1, 10);
    let release = occupy(&pool, 1);

    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let ran = Arc::clone(&ran);
        assert_eq!(
            pool.submit(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap(),
            Admission::Queued
        );
    }
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    pool.reconfigure(4, 4, AbortPolicy).unwrap();
    assert!(wait_until(|| ran.load(Ordering::SeqCst) == 3));
    assert!(wait_until(|| pool.active_count() == 1));

    drop(release);
    pool.shutdown();
}

#[test]
fn test_concurrent_readers_never_see_torn_bounds() {
    let pool = Arc::new(pool(1, 2, 8));
    let stop = Arc::new(AtomicBool::new(false));
    let allowed = [PoolBounds { core: 1, max: 2 }, PoolBounds { core: 8, max: 16 }];

    let writer = {
        let pool = Arc::clone(&pool);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut flip = false;
            while !stop.load(Ordering::Relaxed) {
                let (core, max) = if flip { (1, 2) } else { (8, 16) };
                pool.reconfigure(core, max, CallerRunsPolicy).unwrap();
                flip = !flip;
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for _ in 0..10_000 {
                    let bounds = pool.bounds();
                    assert!(allowed.contains(&bounds), "torn bounds {bounds:?}");
                }
            })
        })
        .collect();
    for reader in readers {
        reader.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
    pool.shutdown();
}

#[test]
fn test_snapshots_pair_bounds_with_their_policy() {
    let pool = Arc::new(pool(1, 2, 8));
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let pool = Arc::clone(&pool);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut flip = false;
            while !stop.load(Ordering::Relaxed) {
                if flip {
                    pool.reconfigure(1, 2, AbortPolicy).unwrap();
                } else {
                    pool.reconfigure(8, 16, DiscardPolicy).unwrap();
                }
                flip = !flip;
            }
        })
    };

    for _ in 0..50_000 {
        let snap = pool.snapshot();
        let pair = (snap.core_pool_size, snap.max_pool_size, snap.rejection_policy.as_str());
        assert!(
            matches!(pair, (1, 2, "abort") | (8, 16, "discard")),
            "mismatched settings {pair:?}"
        );
    }
    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
    pool.shutdown();
}

#[test]
fn test_rejection_uses_policy_paired_with_bounds() {
    let pool = Arc::new(pool(1, 1, 0));
    let release = occupy(&pool, 1);
    let stop = Arc::new(AtomicBool::new(false));

    // Both settings keep the pool saturated; only the policy differs.
    let writer = {
        let pool = Arc::clone(&pool);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut flip = false;
            while !stop.load(Ordering::Relaxed) {
                if flip {
                    pool.reconfigure(1, 1, AbortPolicy).unwrap();
                } else {
                    pool.reconfigure(0, 1, DiscardPolicy).unwrap();
                }
                flip = !flip;
            }
        })
    };

    for _ in 0..5_000 {
        match pool.submit(|| {}) {
            Ok(Admission::Rejected) | Err(PoolError::Rejected { .. }) => {}
            other => panic!("saturated pool admitted work: {other:?}"),
        }
    }
    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
    assert_eq!(pool.rejected_count(), 5_000);

    drop(release);
    pool.shutdown();
}

#[test]
fn test_reconfigure_after_shutdown_is_refused() {
    let pool = pool(1, 2, 4);
    pool.shutdown();
    assert!(pool.reconfigure(2, 4, AbortPolicy).is_err());
    assert!(pool.set_alert_threshold(0.5).is_ok());
}
