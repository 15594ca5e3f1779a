//! Tests for error types

use dynamic_worker_pool::core::{PoolError, RejectReason};

#[test]
fn test_invalid_configuration_error() {
    let err = PoolError::invalid("core_pool_size (5) must not exceed max_pool_size (4)");
    assert_eq!(
        format!("{}", err),
        "invalid configuration: core_pool_size (5) must not exceed max_pool_size (4)"
    );
    assert!(!err.is_rejection());
}

#[test]
fn test_saturated_rejection_error() {
    let err = PoolError::Rejected {
        reason: RejectReason::Saturated,
    };
    assert_eq!(format!("{}", err), "task rejected: pool and queue are saturated");
    assert!(err.is_rejection());
}

#[test]
fn test_shutdown_rejection_error() {
    let err = PoolError::Rejected {
        reason: RejectReason::Shutdown,
    };
    assert_eq!(format!("{}", err), "task rejected: pool has been shut down");
}

#[test]
fn test_worker_spawn_error() {
    let err = PoolError::WorkerSpawn("resource temporarily unavailable".to_string());
    assert_eq!(
        format!("{}", err),
        "failed to spawn worker thread: resource temporarily unavailable"
    );
}

#[test]
fn test_pool_error_converts_into_anyhow() {
    fn fails() -> dynamic_worker_pool::core::AppResult<()> {
        Err::<(), _>(PoolError::invalid("bad"))?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert!(err.downcast_ref::<PoolError>().is_some());
}
