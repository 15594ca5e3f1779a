//! Bounded, runtime-reconfigurable worker pool on dedicated OS threads.
//!
//! Admission follows three steps: start a new worker while the pool is below
//! its core size, otherwise enqueue into the bounded queue, otherwise start a
//! worker up to the maximum size. When all three fail the task goes to the
//! active rejection policy through the accounting wrapper.
//!
//! # Example
//!
//! ```rust,ignore
//! use dynamic_worker_pool::config::DynamicPoolConfig;
//! use dynamic_worker_pool::core::{CallerRunsPolicy, DynamicPool};
//!
//! let pool = DynamicPool::new(
//!     DynamicPoolConfig::new()
//!         .with_core_pool_size(4)
//!         .with_max_pool_size(16)
//!         .with_queue_capacity(200),
//! )?;
//!
//! pool.submit(|| expensive_work())?;
//! pool.reconfigure(8, 32, CallerRunsPolicy)?;
//! let metrics = pool.snapshot();
//! pool.shutdown();
//! ```

mod native;
mod reconfigure;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use super::error::PoolError;
use super::rejection::RejectionAccounting;

pub use native::DynamicPool;

/// Largest accepted value for either pool bound.
pub const MAX_POOL_SIZE: usize = u32::MAX as usize;

/// Outcome of a submission that did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A new worker thread was started with this task.
    Spawned,
    /// The task was placed on the queue (or handed to an idle worker).
    Queued,
    /// The rejection policy handled the task without returning an error.
    Rejected,
}

impl Admission {
    /// Whether the pool took ownership of the task.
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Spawned | Self::Queued)
    }
}

/// Lifecycle of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    /// Admitting work.
    Running,
    /// `shutdown` was called; queued work drains, nothing new is admitted.
    ShuttingDown,
    /// `shutdown_now` was called; the queue was discarded and workers are finishing.
    Stopping,
    /// Every worker has exited.
    Terminated,
}

impl PoolState {
    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::ShuttingDown => 1,
            Self::Stopping => 2,
            Self::Terminated => 3,
        }
    }

    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::ShuttingDown,
            2 => Self::Stopping,
            _ => Self::Terminated,
        }
    }
}

/// Core and maximum worker counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolBounds {
    /// Workers kept alive while idle.
    pub core: usize,
    /// Hard ceiling on live workers.
    pub max: usize,
}

impl PoolBounds {
    /// Validate and build a pair of bounds.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfiguration`] unless `0 <= core <= max`,
    /// `max > 0` and `max <= MAX_POOL_SIZE`.
    pub fn new(core: usize, max: usize) -> Result<Self, PoolError> {
        if max == 0 {
            return Err(PoolError::invalid("max_pool_size must be greater than 0"));
        }
        if max > MAX_POOL_SIZE {
            return Err(PoolError::invalid(format!(
                "max_pool_size must not exceed {MAX_POOL_SIZE}"
            )));
        }
        if core > max {
            return Err(PoolError::invalid(format!(
                "core_pool_size ({core}) must not exceed max_pool_size ({max})"
            )));
        }
        Ok(Self { core, max })
    }

    /// Same checks as [`PoolBounds::new`] for signed, wire-shaped input.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfiguration`] for negative values or any
    /// failure [`PoolBounds::new`] reports.
    pub fn from_signed(core: i64, max: i64) -> Result<Self, PoolError> {
        let core = usize::try_from(core)
            .map_err(|_| PoolError::invalid("core_pool_size must be >= 0"))?;
        let max = usize::try_from(max)
            .map_err(|_| PoolError::invalid("max_pool_size must be greater than 0"))?;
        Self::new(core, max)
    }
}

/// Capacity and rejection handling that take effect together.
///
/// Published behind one atomic pointer and replaced whole on
/// reconfiguration, so a reader that loads it once sees bounds and policy
/// from the same change.
#[derive(Debug)]
pub(crate) struct ActiveSettings {
    pub(crate) bounds: PoolBounds,
    pub(crate) handler: RejectionAccounting,
}

impl ActiveSettings {
    pub(crate) const fn new(bounds: PoolBounds, handler: RejectionAccounting) -> Self {
        Self { bounds, handler }
    }

    pub(crate) fn policy_name(&self) -> &'static str {
        self.handler.delegate_name()
    }
}

/// Internal counters for pool statistics (lock-free).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    /// Live worker threads, including reserved-but-starting ones.
    pub pool_size: AtomicUsize,
    pub largest_pool_size: AtomicUsize,
    /// Tasks claimed by a worker and not yet finished.
    pub active_workers: AtomicUsize,
    pub queued_tasks: AtomicUsize,
    pub submitted_tasks: AtomicU64,
    /// Finished tasks, including ones that panicked.
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
}

impl PoolCounters {
    /// Reserve a worker slot if fewer than `limit` workers are live.
    pub fn try_reserve_worker(&self, limit: usize) -> bool {
        let mut current = self.pool_size.load(Ordering::Acquire);
        loop {
            if current >= limit {
                return false;
            }
            match self.pool_size.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.largest_pool_size.fetch_max(current + 1, Ordering::AcqRel);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Give a slot back only if the pool is still at `expected` workers.
    pub fn try_release_worker(&self, expected: usize) -> bool {
        expected > 0
            && self
                .pool_size
                .compare_exchange(expected, expected - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    pub fn release_worker(&self) {
        self.pool_size.fetch_sub(1, Ordering::AcqRel);
    }
}
