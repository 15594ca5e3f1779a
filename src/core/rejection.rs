//! Rejection policies and the accounting wrapper that counts their invocations.
//!
//! The pool never calls a user policy directly. Every policy is installed
//! behind a [`RejectionAccounting`] wrapper which bumps the shared
//! [`RejectionCounter`] and then forwards the task unchanged, so whatever the
//! policy does (drop, run inline, return an error, panic) is what the caller
//! observes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::error::{PoolError, RejectReason};
use super::task::Task;
use super::worker_pool::DynamicPool;

/// Strategy invoked when a task cannot be admitted.
///
/// Any `Fn(Task, &DynamicPool) -> Result<(), PoolError>` closure is a policy:
///
/// ```rust,ignore
/// let log_and_drop = |_task: Task, pool: &DynamicPool| {
///     tracing::warn!(queued = pool.queued_tasks(), "dropping task");
///     Ok(())
/// };
/// pool.reconfigure(4, 8, log_and_drop)?;
/// ```
pub trait RejectionPolicy: Send + Sync {
    /// Handle a task the pool refused.
    ///
    /// # Errors
    ///
    /// Policies that signal rejection to the submitter return an error; it is
    /// passed back from `DynamicPool::submit` untouched.
    fn rejected(&self, task: Task, pool: &DynamicPool) -> Result<(), PoolError>;

    /// Short name used in logs and snapshots.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<F> RejectionPolicy for F
where
    F: Fn(Task, &DynamicPool) -> Result<(), PoolError> + Send + Sync,
{
    fn rejected(&self, task: Task, pool: &DynamicPool) -> Result<(), PoolError> {
        self(task, pool)
    }

    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Fails the submission with [`PoolError::Rejected`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortPolicy;

impl RejectionPolicy for AbortPolicy {
    fn rejected(&self, _task: Task, pool: &DynamicPool) -> Result<(), PoolError> {
        let reason = if pool.is_shutdown() {
            RejectReason::Shutdown
        } else {
            RejectReason::Saturated
        };
        Err(PoolError::Rejected { reason })
    }

    fn name(&self) -> &'static str {
        "abort"
    }
}

/// Runs the task on the submitting thread, unless the pool is shut down.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallerRunsPolicy;

impl RejectionPolicy for CallerRunsPolicy {
    fn rejected(&self, task: Task, pool: &DynamicPool) -> Result<(), PoolError> {
        if !pool.is_shutdown() {
            task();
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "caller_runs"
    }
}

/// Silently drops the task.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardPolicy;

impl RejectionPolicy for DiscardPolicy {
    fn rejected(&self, _task: Task, _pool: &DynamicPool) -> Result<(), PoolError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "discard"
    }
}

/// Drops the oldest queued task and retries the submission once.
///
/// With nothing queued (for example a zero-capacity hand-off queue) the new
/// task itself is dropped instead of retrying forever.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardOldestPolicy;

impl RejectionPolicy for DiscardOldestPolicy {
    fn rejected(&self, task: Task, pool: &DynamicPool) -> Result<(), PoolError> {
        if pool.is_shutdown() {
            return Ok(());
        }
        if pool.discard_oldest_queued().is_some() {
            pool.submit_task(task).map(|_| ())
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &'static str {
        "discard_oldest"
    }
}

/// Shared, monotonically increasing count of rejected submissions.
///
/// Clones share the same underlying counter.
#[derive(Debug, Clone, Default)]
pub struct RejectionCounter {
    count: Arc<AtomicU64>,
}

impl RejectionCounter {
    /// Create a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Record one rejection and return the new total.
    pub fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Administrative reset to zero.
    pub fn reset(&self) {
        self.count.store(0, Ordering::Release);
    }
}

/// Counts every rejection, then hands the task to the real policy.
///
/// The counter binding is fixed at construction. Reconfiguration builds a new
/// wrapper around the new policy with the same counter.
pub struct RejectionAccounting {
    delegate: Arc<dyn RejectionPolicy>,
    counter: RejectionCounter,
}

impl RejectionAccounting {
    /// Wrap `delegate`, recording into `counter`.
    pub fn new(delegate: Arc<dyn RejectionPolicy>, counter: RejectionCounter) -> Self {
        Self { delegate, counter }
    }

    /// Name of the wrapped policy.
    #[must_use]
    pub fn delegate_name(&self) -> &'static str {
        self.delegate.name()
    }

    /// The counter this wrapper records into.
    #[must_use]
    pub const fn counter(&self) -> &RejectionCounter {
        &self.counter
    }
}

impl fmt::Debug for RejectionAccounting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectionAccounting")
            .field("delegate", &self.delegate.name())
            .field("rejected", &self.counter.get())
            .finish()
    }
}

impl RejectionPolicy for RejectionAccounting {
    fn rejected(&self, task: Task, pool: &DynamicPool) -> Result<(), PoolError> {
        let total = self.counter.increment();
        debug!(policy = self.delegate.name(), rejected_total = total, "Task rejected");
        self.delegate.rejected(task, pool)
    }

    fn name(&self) -> &'static str {
        self.delegate.name()
    }
}
