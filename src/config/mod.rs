//! Configuration models for the pool, its alerting, and runtime changes.

pub mod pool;

pub use pool::{
    AlertConfig, AlertSettingsRequest, DynamicPoolConfig, ReconfigureRequest, RejectionPolicyKind,
    ENV_PREFIX,
};
