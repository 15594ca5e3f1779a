//! Tests for pool builders

use std::sync::Arc;
use std::time::Duration;

use dynamic_worker_pool::builders::{build_pool, PoolBuilder};
use dynamic_worker_pool::config::{DynamicPoolConfig, RejectionPolicyKind};
use dynamic_worker_pool::core::{DiscardPolicy, PoolError};
use dynamic_worker_pool::util::ManualClock;

#[test]
fn test_build_pool_from_config() {
    let cfg = DynamicPoolConfig::new()
        .with_core_pool_size(1)
        .with_max_pool_size(3)
        .with_rejection_policy(RejectionPolicyKind::Abort);
    let pool = build_pool(&cfg).unwrap();
    assert_eq!(pool.core_pool_size(), 1);
    assert_eq!(pool.max_pool_size(), 3);
    assert_eq!(pool.rejection_policy_name(), "abort");
    assert_eq!(pool.pool_size(), 0);
    pool.shutdown();
    assert!(pool.await_termination(Duration::from_secs(1)));
}

#[test]
fn test_build_pool_rejects_invalid_config() {
    let cfg = DynamicPoolConfig::new().with_core_pool_size(4).with_max_pool_size(2);
    assert!(matches!(build_pool(&cfg), Err(PoolError::InvalidConfiguration(_))));
}

#[test]
fn test_builder_policy_overrides_config() {
    let config = DynamicPoolConfig::new().with_rejection_policy(RejectionPolicyKind::Abort);
    let pool = PoolBuilder::new(config)
        .with_rejection_policy(DiscardPolicy)
        .build()
        .unwrap();
    assert_eq!(pool.rejection_policy_name(), "discard");
    pool.shutdown();
}

#[test]
fn test_builder_clock_drives_snapshot_time() {
    let clock = Arc::new(ManualClock::new(42));
    let pool = PoolBuilder::new(DynamicPoolConfig::new())
        .with_clock(clock.clone())
        .build()
        .unwrap();
    assert_eq!(pool.snapshot().monotonic_ms, 42);
    clock.advance(8);
    assert_eq!(pool.snapshot().monotonic_ms, 50);
    pool.shutdown();
}

#[test]
fn test_builder_debug_lists_collaborators() {
    let builder = PoolBuilder::new(DynamicPoolConfig::new()).with_rejection_policy(DiscardPolicy);
    let rendered = format!("{builder:?}");
    assert!(rendered.contains("discard"));
    assert!(rendered.contains("custom_clock: false"));
}
