//! Worker pool, rejection accounting, alerting and metrics.

pub mod alert;
pub mod error;
pub mod rejection;
pub mod snapshot;
pub mod task;
mod ticker;
pub mod worker_pool;

pub use alert::{
    AlertEvent, AlertEventKind, AlertMonitor, AlertOutcome, AlertSink, InMemoryAlertSink,
    UtilizationReading,
};
pub use error::{AppResult, PoolError, RejectReason};
pub use rejection::{
    AbortPolicy, CallerRunsPolicy, DiscardOldestPolicy, DiscardPolicy, RejectionAccounting,
    RejectionCounter, RejectionPolicy,
};
pub use snapshot::{AlertSnapshot, MetricsSnapshot};
pub use task::{FailureHook, InterruptToken, Task, TaskFailure};
pub use worker_pool::{Admission, DynamicPool, PoolBounds, PoolState, MAX_POOL_SIZE};
