//! Point-in-time metrics for a [`DynamicPool`].
//!
//! Counters are read with independent atomic loads and may come from slightly
//! different instants. Bounds and the rejection policy come from a single
//! load of the active settings, so they always belong to the same
//! reconfiguration. A snapshot never mutates the pool.

use serde::{Deserialize, Serialize};

use super::worker_pool::{DynamicPool, PoolState};
use crate::util::clock::wall_clock_ms;

/// Alert settings at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSnapshot {
    /// Utilization fraction at which alerts fire.
    pub threshold: f64,
    /// Minimum time between two fires.
    pub cooldown_ms: u64,
    /// Monotonic reading of the last fire, `None` if it never fired.
    pub last_alert_ms: Option<u64>,
}

/// Immutable copy of pool counters, settings and derived rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Workers kept alive while idle.
    pub core_pool_size: usize,
    /// Ceiling on live workers.
    pub max_pool_size: usize,
    /// Live worker threads.
    pub pool_size: usize,
    /// Most workers ever live at once.
    pub largest_pool_size: usize,
    /// Workers executing a task.
    pub active_count: usize,
    /// Tasks waiting in the queue.
    pub queued_tasks: usize,
    /// Queue bound.
    pub queue_capacity: usize,
    /// `queue_capacity - queued_tasks`, floored at zero.
    pub queue_remaining_capacity: usize,
    /// Tasks admitted.
    pub submitted_tasks: u64,
    /// Tasks finished, including failed ones.
    pub completed_tasks: u64,
    /// Tasks that panicked.
    pub failed_tasks: u64,
    /// Rejections since creation or the last reset.
    pub rejected_count: u64,
    /// `active_count / max_pool_size`, `0.0` for a zero ceiling.
    pub thread_usage_rate: f64,
    /// `queued_tasks / queue_capacity`, `0.0` for a zero-capacity queue.
    pub queue_usage_rate: f64,
    /// Lifecycle state.
    pub state: PoolState,
    /// Whether shutdown has begun.
    pub is_shutdown: bool,
    /// Whether every worker has exited.
    pub is_terminated: bool,
    /// Name of the active rejection policy.
    pub rejection_policy: String,
    /// Alert settings.
    pub alert: AlertSnapshot,
    /// Monotonic capture time, same clock as `alert.last_alert_ms`.
    pub monotonic_ms: u64,
    /// Wall-clock capture time, milliseconds since the Unix epoch.
    pub captured_at_ms: u128,
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl MetricsSnapshot {
    /// Read the pool's live counters.
    #[must_use]
    pub fn capture(pool: &DynamicPool) -> Self {
        let settings = pool.active_settings();
        let bounds = settings.bounds;
        let active_count = pool.active_count();
        let queued_tasks = pool.queued_tasks();
        let queue_capacity = pool.queue_capacity();
        let state = pool.state();

        Self {
            core_pool_size: bounds.core,
            max_pool_size: bounds.max,
            pool_size: pool.pool_size(),
            largest_pool_size: pool.largest_pool_size(),
            active_count,
            queued_tasks,
            queue_capacity,
            queue_remaining_capacity: queue_capacity.saturating_sub(queued_tasks),
            submitted_tasks: pool.submitted_tasks(),
            completed_tasks: pool.completed_tasks(),
            failed_tasks: pool.failed_tasks(),
            rejected_count: pool.rejected_count(),
            thread_usage_rate: ratio(active_count, bounds.max),
            queue_usage_rate: ratio(queued_tasks, queue_capacity),
            state,
            is_shutdown: state != PoolState::Running,
            is_terminated: state == PoolState::Terminated,
            rejection_policy: settings.policy_name().to_string(),
            alert: AlertSnapshot {
                threshold: pool.alert_threshold(),
                cooldown_ms: u64::try_from(pool.alert_cooldown().as_millis()).unwrap_or(u64::MAX),
                last_alert_ms: pool.last_alert_ms(),
            },
            monotonic_ms: pool.monotonic_now_ms(),
            captured_at_ms: wall_clock_ms(),
        }
    }

    /// Whether two snapshots agree on everything except their capture times.
    #[must_use]
    pub fn same_readings(&self, other: &Self) -> bool {
        let mut other = other.clone();
        other.monotonic_ms = self.monotonic_ms;
        other.captured_at_ms = self.captured_at_ms;
        *self == other
    }

    /// One-line summary of sizes, counts and rates.
    #[must_use]
    pub fn details(&self) -> String {
        format!(
            "core={} max={} pool={} largest={} active={} queued={}/{} \
             submitted={} completed={} failed={} rejected={} \
             thread_usage={:.1}% queue_usage={:.1}% policy={} state={:?}",
            self.core_pool_size,
            self.max_pool_size,
            self.pool_size,
            self.largest_pool_size,
            self.active_count,
            self.queued_tasks,
            self.queue_capacity,
            self.submitted_tasks,
            self.completed_tasks,
            self.failed_tasks,
            self.rejected_count,
            self.thread_usage_rate * 100.0,
            self.queue_usage_rate * 100.0,
            self.rejection_policy,
            self.state,
        )
    }

    /// Alert settings, time since the last fire and the rejection count.
    #[must_use]
    pub fn alert_stats(&self) -> String {
        let since_last = self.alert.last_alert_ms.map_or_else(
            || "never".to_string(),
            |last| format!("{}ms ago", self.monotonic_ms.saturating_sub(last)),
        );
        format!(
            "threshold={:.1}% cooldown={}ms last_alert={} rejected={}",
            self.alert.threshold * 100.0,
            self.alert.cooldown_ms,
            since_last,
            self.rejected_count,
        )
    }
}
