//! Tests for configuration validation

use dynamic_worker_pool::config::{
    AlertConfig, AlertSettingsRequest, DynamicPoolConfig, ReconfigureRequest, RejectionPolicyKind,
};
use dynamic_worker_pool::core::{PoolBounds, PoolError};

#[test]
fn test_pool_config_validation() {
    let valid = DynamicPoolConfig::new()
        .with_core_pool_size(2)
        .with_max_pool_size(8)
        .with_queue_capacity(0);
    assert!(valid.validate().is_ok());
}

#[test]
fn test_pool_config_core_above_max() {
    let invalid = DynamicPoolConfig::new().with_core_pool_size(9).with_max_pool_size(8);
    let err = invalid.validate().unwrap_err();
    assert!(err.contains("core_pool_size"), "{err}");
}

#[test]
fn test_pool_config_zero_max() {
    let invalid = DynamicPoolConfig::new().with_core_pool_size(0).with_max_pool_size(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_alert_config_defaults() {
    let alert = AlertConfig::default();
    assert!((alert.threshold - 0.7).abs() < f64::EPSILON);
    assert_eq!(alert.cooldown_ms, 60_000);
    assert_eq!(alert.check_interval_ms, 60_000);
    assert!(alert.validate().is_ok());
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "core_pool_size": 4,
        "max_pool_size": 16,
        "queue_capacity": 64,
        "keep_alive_ms": 30000,
        "thread_name_prefix": "ingest",
        "rejection_policy": "abort",
        "alert": { "threshold": 0.8, "cooldown_ms": 5000, "check_interval_ms": 1000 }
    }"#;
    let cfg = DynamicPoolConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.core_pool_size, 4);
    assert_eq!(cfg.max_pool_size, 16);
    assert_eq!(cfg.thread_name_prefix, "ingest");
    assert_eq!(cfg.rejection_policy, RejectionPolicyKind::Abort);
    assert_eq!(cfg.alert.check_interval_ms, 1_000);
}

#[test]
fn test_config_from_json_rejects_invalid_values() {
    assert!(DynamicPoolConfig::from_json_str(r#"{"core_pool_size": 50}"#).is_err());
    assert!(DynamicPoolConfig::from_json_str(r#"{"alert": {"threshold": -0.1}}"#).is_err());
    assert!(DynamicPoolConfig::from_json_str(r#"{"rejection_policy": "retry"}"#).is_err());
    assert!(DynamicPoolConfig::from_json_str("not json").is_err());
}

#[test]
fn test_config_round_trips_through_json() {
    let cfg = DynamicPoolConfig::new()
        .with_core_pool_size(3)
        .with_rejection_policy(RejectionPolicyKind::DiscardOldest);
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(DynamicPoolConfig::from_json_str(&json).unwrap(), cfg);
}

#[test]
fn test_reconfigure_request_validation() {
    let request = ReconfigureRequest {
        core_pool_size: 2,
        max_pool_size: 10,
        rejection_policy: Some(RejectionPolicyKind::Discard),
    };
    assert_eq!(
        request.validate().unwrap(),
        (PoolBounds { core: 2, max: 10 }, RejectionPolicyKind::Discard)
    );

    let negative = ReconfigureRequest {
        core_pool_size: -2,
        ..request.clone()
    };
    assert!(matches!(negative.validate(), Err(PoolError::InvalidConfiguration(_))));

    let no_policy = ReconfigureRequest {
        rejection_policy: None,
        ..request
    };
    assert!(no_policy.validate().is_err());
}

#[test]
fn test_alert_settings_request_from_json() {
    let request: AlertSettingsRequest = serde_json::from_str(r#"{"cooldown_ms": 250}"#).unwrap();
    assert_eq!(request.validate().unwrap(), (None, Some(250)));
}
