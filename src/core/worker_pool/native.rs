//! Native implementation of `DynamicPool` using OS threads.
//!
//! # Design Principles
//!
//! - **Lock-free hot path**: admission loads the active settings and the
//!   queue sender through `ArcSwap` pointers and updates plain atomics.
//! - **Consistent settings**: bounds and the rejection handler are published
//!   as one immutable value; submission and snapshots load it once.
//! - **No polling**: idle workers block in `recv_timeout` for the keep-alive
//!   period; the alert ticker sleeps on a Condvar.
//! - **Clean shutdown**: dropping the sender lets workers drain the queue and
//!   then observe disconnection.
//! - **Accountable counters**: a task is counted as queued before it is sent
//!   and as active before it leaves the queue; it is counted as completed
//!   before it stops being active.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use arc_swap::{ArcSwap, ArcSwapOption};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use crate::builders::PoolBuilder;
use crate::core::alert::{AlertMonitor, AlertOutcome, UtilizationReading};
use crate::core::error::PoolError;
use crate::core::rejection::{RejectionAccounting, RejectionCounter, RejectionPolicy};
use crate::core::snapshot::MetricsSnapshot;
use crate::core::task::{FailureHook, InterruptToken, Task, TaskFailure};
use crate::core::ticker::AlertTicker;
use crate::util::clock::MonotonicClock;

use super::{ActiveSettings, Admission, PoolBounds, PoolCounters, PoolState};

/// How long a graceful shutdown waits for an in-progress alert tick.
const TICKER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared between the pool handle, its workers and the alert ticker.
pub(super) struct Shared {
    pub(super) name_prefix: String,
    pub(super) stack_size: usize,
    pub(super) keep_alive: Duration,
    pub(super) queue_capacity: usize,
    /// Bounds and rejection handler, replaced whole by reconfiguration.
    pub(super) settings: ArcSwap<ActiveSettings>,
    pub(super) state: AtomicU8,
    pub(super) counters: PoolCounters,
    /// `None` once shutdown has begun.
    pub(super) task_tx: ArcSwapOption<Sender<Task>>,
    pub(super) task_rx: Receiver<Task>,
    pub(super) rejections: RejectionCounter,
    pub(super) alerts: AlertMonitor,
    pub(super) failure_hook: Option<FailureHook>,
    pub(super) interrupt: InterruptToken,
    pub(super) thread_seq: AtomicU64,
    pub(super) termination: (Mutex<()>, Condvar),
}

impl Shared {
    pub(super) fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn is_running(&self) -> bool {
        self.state() == PoolState::Running
    }

    fn transition(&self, from: PoolState, to: PoolState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(super) fn bounds(&self) -> PoolBounds {
        self.settings.load().bounds
    }

    pub(super) fn reading(&self) -> UtilizationReading {
        UtilizationReading {
            active_workers: self.counters.active_workers.load(Ordering::Acquire),
            max_pool_size: self.bounds().max,
            queued_tasks: self.counters.queued_tasks.load(Ordering::Acquire),
            rejected_count: self.rejections.get(),
        }
    }

    pub(super) fn check_alert(&self) -> AlertOutcome {
        self.alerts.evaluate(&self.reading())
    }

    /// Start a worker running `task` first if fewer than `limit` workers are
    /// live. The task counts as active from the moment the slot is reserved.
    /// Hands the task back if no worker could be started.
    fn try_add_worker(self: &Arc<Self>, task: Task, limit: usize) -> Result<(), Task> {
        if !self.counters.try_reserve_worker(limit) {
            return Err(task);
        }
        if !self.is_running() {
            self.counters.release_worker();
            self.try_terminate();
            return Err(task);
        }

        self.counters.active_workers.fetch_add(1, Ordering::AcqRel);
        match self.spawn_worker(Some(task)) {
            Ok(()) => Ok(()),
            Err(returned) => {
                self.counters.active_workers.fetch_sub(1, Ordering::AcqRel);
                self.counters.release_worker();
                self.try_terminate();
                // Only the worker empties the slot, and it never started.
                returned.map_or(Ok(()), Err)
            }
        }
    }

    /// Start a worker with no first task, to serve the queue.
    pub(super) fn try_add_idle_worker(self: &Arc<Self>, limit: usize) -> bool {
        if !self.counters.try_reserve_worker(limit) {
            return false;
        }
        if self.spawn_worker(None).is_ok() {
            return true;
        }
        self.counters.release_worker();
        self.try_terminate();
        false
    }

    fn spawn_worker(self: &Arc<Self>, first: Option<Task>) -> Result<(), Option<Task>> {
        let id = self.thread_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let name = format!("{}-{id}", self.name_prefix);

        // The first task goes through a slot so it can be recovered if the
        // OS refuses the thread.
        let slot = Arc::new(Mutex::new(first));
        let worker_slot = Arc::clone(&slot);
        let shared = Arc::clone(self);
        let worker_name = name.clone();

        let mut builder = thread::Builder::new().name(name.clone());
        if self.stack_size > 0 {
            builder = builder.stack_size(self.stack_size);
        }
        let spawned = builder.spawn(move || {
            let first = worker_slot.lock().take();
            run_worker(&shared, &worker_name, first);
        });

        match spawned {
            Ok(_detached) => Ok(()),
            Err(e) => {
                error!(worker = %name, error = %e, "Failed to spawn worker thread");
                let first = slot.lock().take();
                Err(first)
            }
        }
    }

    /// Put `task` on the queue. Fails when the queue is full or shut.
    fn enqueue(&self, task: Task) -> Result<(), Task> {
        let sender = self.task_tx.load();
        let Some(tx) = sender.as_deref() else {
            return Err(task);
        };
        // Counted before the send so a fast worker never drives it below zero.
        self.counters.queued_tasks.fetch_add(1, Ordering::AcqRel);
        match tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(task) | TrySendError::Disconnected(task)) => {
                self.counters.queued_tasks.fetch_sub(1, Ordering::AcqRel);
                Err(task)
            }
        }
    }

    /// Block for the next queued task. Returns `None` once this worker should
    /// exit, after its slot has been released.
    fn next_task(&self, worker: &str) -> Option<Task> {
        loop {
            let bounds = self.bounds();
            let size = self.counters.pool_size.load(Ordering::Acquire);

            if size > bounds.max {
                if self.counters.try_release_worker(size) {
                    debug!(
                        worker,
                        pool_size = size - 1,
                        max_pool_size = bounds.max,
                        "Worker retired after shrink"
                    );
                    return None;
                }
                continue;
            }
            if self.state() >= PoolState::Stopping {
                self.counters.release_worker();
                return None;
            }

            match self.task_rx.recv_timeout(self.keep_alive) {
                Ok(task) => {
                    self.counters.active_workers.fetch_add(1, Ordering::AcqRel);
                    self.counters.queued_tasks.fetch_sub(1, Ordering::AcqRel);
                    return Some(task);
                }
                Err(RecvTimeoutError::Timeout) => {
                    let bounds = self.bounds();
                    let core = bounds.core;
                    let size = self.counters.pool_size.load(Ordering::Acquire);
                    if size > core && self.counters.try_release_worker(size) {
                        // Work may have been queued while this worker was leaving.
                        if !self.task_rx.is_empty()
                            && self.counters.try_reserve_worker(bounds.max)
                        {
                            continue;
                        }
                        debug!(
                            worker,
                            pool_size = size - 1,
                            core_pool_size = core,
                            "Idle worker retired"
                        );
                        return None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.counters.release_worker();
                    return None;
                }
            }
        }
    }

    fn run_task(&self, worker: &str, task: Task) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(task));
        self.counters.completed_tasks.fetch_add(1, Ordering::AcqRel);
        self.counters.active_workers.fetch_sub(1, Ordering::AcqRel);

        if let Err(payload) = outcome {
            self.counters.failed_tasks.fetch_add(1, Ordering::AcqRel);
            let failure = TaskFailure::from_panic(worker, payload.as_ref());
            error!(worker, message = %failure.message, "Task panicked; worker continues");
            if let Some(hook) = &self.failure_hook {
                hook(&failure);
            }
        }
    }

    /// Move to `Terminated` once shut down with no live workers (and, for a
    /// graceful shutdown, nothing left to drain).
    pub(super) fn try_terminate(&self) {
        let state = self.state();
        if matches!(state, PoolState::Running | PoolState::Terminated) {
            return;
        }
        if self.counters.pool_size.load(Ordering::Acquire) != 0 {
            return;
        }
        if state == PoolState::ShuttingDown && !self.task_rx.is_empty() {
            return;
        }
        if self.transition(state, PoolState::Terminated) {
            // A submission racing shutdown_now may have queued after the drain.
            let mut stranded = 0_usize;
            while self.task_rx.try_recv().is_ok() {
                self.counters.queued_tasks.fetch_sub(1, Ordering::AcqRel);
                stranded += 1;
            }
            if stranded > 0 {
                debug!(discarded = stranded, "Discarded tasks queued during shutdown");
            }
            let _guard = self.termination.0.lock();
            self.termination.1.notify_all();
            info!(pool = %self.name_prefix, "Worker pool terminated");
        }
    }

    fn log_final_statistics(&self, how: &str) {
        info!(
            pool = %self.name_prefix,
            shutdown = how,
            submitted_tasks = self.counters.submitted_tasks.load(Ordering::Acquire),
            completed_tasks = self.counters.completed_tasks.load(Ordering::Acquire),
            failed_tasks = self.counters.failed_tasks.load(Ordering::Acquire),
            rejected_count = self.rejections.get(),
            "Worker pool statistics at shutdown"
        );
    }
}

/// Worker thread body.
fn run_worker(shared: &Arc<Shared>, name: &str, first: Option<Task>) {
    debug!(worker = name, "Worker thread started");
    if let Some(task) = first {
        shared.run_task(name, task);
    }
    while let Some(task) = shared.next_task(name) {
        shared.run_task(name, task);
    }
    debug!(worker = name, "Worker thread exiting");
    shared.try_terminate();
}

/// Bounded worker pool whose capacity, rejection policy and alerting can be
/// changed while it runs.
///
/// # Design
///
/// - **Composition**: owns a crossbeam channel as its queue and a set of
///   detached worker threads; nothing is inherited from another executor.
/// - **Explicit ownership**: constructed by the caller and passed to
///   collaborators; dropping it starts a graceful shutdown.
/// - **Accounting**: every rejection passes through a [`RejectionAccounting`]
///   wrapper sharing one [`RejectionCounter`] across reconfigurations.
pub struct DynamicPool {
    pub(super) shared: Arc<Shared>,
    ticker: Mutex<Option<AlertTicker>>,
}

impl DynamicPool {
    /// Create a pool from configuration with the default clock and no alert sink.
    ///
    /// No worker threads are started until work arrives.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfiguration` if the configuration is invalid.
    pub fn new(config: crate::config::DynamicPoolConfig) -> Result<Self, PoolError> {
        PoolBuilder::new(config).build()
    }

    /// Start a [`PoolBuilder`] for injecting a clock, alert sink, failure
    /// hook or custom rejection policy.
    #[must_use]
    pub fn builder(config: crate::config::DynamicPoolConfig) -> PoolBuilder {
        PoolBuilder::new(config)
    }

    pub(crate) fn from_builder(builder: PoolBuilder) -> Result<Self, PoolError> {
        let PoolBuilder {
            config,
            clock,
            alert_sink,
            failure_hook,
            rejection_policy,
        } = builder;
        config.validate().map_err(PoolError::InvalidConfiguration)?;

        let bounds = PoolBounds::new(config.core_pool_size, config.max_pool_size)?;
        let clock = clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let alerts = AlertMonitor::new(
            config.alert.threshold,
            config.alert.cooldown_ms,
            clock,
            alert_sink,
        )?;
        let policy = rejection_policy.unwrap_or_else(|| config.rejection_policy.build());
        let rejections = RejectionCounter::new();
        let (task_tx, task_rx) = bounded::<Task>(config.queue_capacity);

        let shared = Arc::new(Shared {
            name_prefix: config.thread_name_prefix.clone(),
            stack_size: config.thread_stack_size,
            keep_alive: Duration::from_millis(config.keep_alive_ms),
            queue_capacity: config.queue_capacity,
            settings: ArcSwap::from_pointee(ActiveSettings::new(
                bounds,
                RejectionAccounting::new(policy, rejections.clone()),
            )),
            state: AtomicU8::new(PoolState::Running.as_u8()),
            counters: PoolCounters::default(),
            task_tx: ArcSwapOption::from_pointee(task_tx),
            task_rx,
            rejections,
            alerts,
            failure_hook,
            interrupt: InterruptToken::new(),
            thread_seq: AtomicU64::new(0),
            termination: (Mutex::new(()), Condvar::new()),
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let ticker = AlertTicker::spawn(
            format!("{}-alert-checker", config.thread_name_prefix),
            Duration::from_millis(config.alert.check_interval_ms),
            move || {
                weak.upgrade().is_some_and(|shared| {
                    shared.check_alert();
                    true
                })
            },
        )?;

        info!(
            pool = %config.thread_name_prefix,
            core_pool_size = bounds.core,
            max_pool_size = bounds.max,
            queue_capacity = config.queue_capacity,
            rejection_policy = shared.settings.load().policy_name(),
            alert_threshold = config.alert.threshold,
            alert_check_interval_ms = config.alert.check_interval_ms,
            "Dynamic worker pool initialized"
        );

        Ok(Self {
            shared,
            ticker: Mutex::new(Some(ticker)),
        })
    }

    /// Submit a closure.
    ///
    /// Never blocks: the task is started on a new worker, queued, or handed
    /// to the rejection policy. Submissions after shutdown are rejections.
    ///
    /// # Errors
    ///
    /// Whatever error the active rejection policy returns (for example
    /// `PoolError::Rejected` from `AbortPolicy`).
    pub fn submit<F>(&self, task: F) -> Result<Admission, PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_task(Box::new(task))
    }

    /// Submit an already boxed [`Task`].
    ///
    /// # Errors
    ///
    /// See [`DynamicPool::submit`].
    pub fn submit_task(&self, task: Task) -> Result<Admission, PoolError> {
        let shared = &self.shared;
        let settings = shared.settings.load_full();
        if !shared.is_running() {
            return self.reject(task, &settings);
        }
        let bounds = settings.bounds;

        let task = match shared.try_add_worker(task, bounds.core) {
            Ok(()) => return Ok(self.admitted(Admission::Spawned)),
            Err(task) => task,
        };

        let task = match shared.enqueue(task) {
            Ok(()) => {
                if shared.counters.pool_size.load(Ordering::Acquire) == 0 {
                    shared.try_add_idle_worker(bounds.max);
                }
                return Ok(self.admitted(Admission::Queued));
            }
            Err(task) => task,
        };

        match shared.try_add_worker(task, bounds.max) {
            Ok(()) => Ok(self.admitted(Admission::Spawned)),
            Err(task) => self.reject(task, &settings),
        }
    }

    fn admitted(&self, admission: Admission) -> Admission {
        self.shared.counters.submitted_tasks.fetch_add(1, Ordering::AcqRel);
        admission
    }

    /// Hand `task` to the handler paired with the bounds admission used.
    fn reject(&self, task: Task, settings: &ActiveSettings) -> Result<Admission, PoolError> {
        settings.handler.rejected(task, self).map(|()| Admission::Rejected)
    }

    /// Remove and return the oldest queued task, if any.
    pub fn discard_oldest_queued(&self) -> Option<Task> {
        let task = self.shared.task_rx.try_recv().ok()?;
        self.shared.counters.queued_tasks.fetch_sub(1, Ordering::AcqRel);
        Some(task)
    }

    /// Evaluate the utilization alert now.
    pub fn check_alert_now(&self) -> AlertOutcome {
        self.shared.check_alert()
    }

    /// Capture a point-in-time copy of every counter and setting.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::capture(self)
    }

    /// Administrative reset of the rejection counter to zero.
    pub fn reset_rejection_counter(&self) {
        let previous = self.shared.rejections.get();
        self.shared.rejections.reset();
        info!(previous, "Rejection counter reset");
    }

    /// Stop admitting work, let queued and running tasks finish, and stop the
    /// alert ticker. Returns without waiting for workers; see
    /// [`DynamicPool::await_termination`]. Idempotent.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        if !shared.transition(PoolState::Running, PoolState::ShuttingDown) {
            return;
        }
        info!(pool = %shared.name_prefix, "Shutting down worker pool");
        shared.log_final_statistics("graceful");

        if let Some(ticker) = self.ticker.lock().take() {
            ticker.stop(TICKER_JOIN_TIMEOUT);
        }
        // Dropping the only sender lets idle workers drain and then exit.
        shared.task_tx.store(None);
        shared.try_terminate();
    }

    /// Stop admitting work, discard the queue, raise the interrupt token and
    /// stop the alert ticker without waiting. Returns the tasks that were
    /// still queued. Running tasks finish (or notice the interrupt) on their
    /// own. Idempotent: later calls return an empty list.
    pub fn shutdown_now(&self) -> Vec<Task> {
        let shared = &self.shared;
        let stopped = shared.transition(PoolState::Running, PoolState::Stopping)
            || shared.transition(PoolState::ShuttingDown, PoolState::Stopping);
        if !stopped {
            return Vec::new();
        }
        info!(pool = %shared.name_prefix, "Force shutting down worker pool");
        shared.log_final_statistics("immediate");

        shared.interrupt.interrupt();
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.stop_now();
        }
        shared.task_tx.store(None);

        let mut drained = Vec::new();
        while let Ok(task) = shared.task_rx.try_recv() {
            shared.counters.queued_tasks.fetch_sub(1, Ordering::AcqRel);
            drained.push(task);
        }
        if !drained.is_empty() {
            info!(discarded = drained.len(), "Discarded queued tasks");
        }
        shared.try_terminate();
        drained
    }

    /// Block until the pool terminates or `timeout` elapses. Returns whether
    /// it terminated.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, condvar) = &self.shared.termination;
        let mut guard = lock.lock();
        while self.shared.state() != PoolState::Terminated {
            if condvar.wait_until(&mut guard, deadline).timed_out() {
                return self.shared.state() == PoolState::Terminated;
            }
        }
        true
    }

    /// Whether shutdown has begun.
    pub fn is_shutdown(&self) -> bool {
        self.shared.state() != PoolState::Running
    }

    /// Whether every worker has exited after shutdown.
    pub fn is_terminated(&self) -> bool {
        self.shared.state() == PoolState::Terminated
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PoolState {
        self.shared.state()
    }

    /// Token raised by [`DynamicPool::shutdown_now`]; capture it in tasks
    /// that should stop early.
    pub fn interrupt_token(&self) -> InterruptToken {
        self.shared.interrupt.clone()
    }

    /// Current core and maximum sizes, read as one unit.
    pub fn bounds(&self) -> PoolBounds {
        self.shared.bounds()
    }

    /// Workers kept alive while idle.
    pub fn core_pool_size(&self) -> usize {
        self.bounds().core
    }

    /// Ceiling on live workers.
    pub fn max_pool_size(&self) -> usize {
        self.bounds().max
    }

    /// Live worker threads.
    pub fn pool_size(&self) -> usize {
        self.shared.counters.pool_size.load(Ordering::Acquire)
    }

    /// Most workers ever live at once.
    pub fn largest_pool_size(&self) -> usize {
        self.shared.counters.largest_pool_size.load(Ordering::Acquire)
    }

    /// Workers currently executing a task.
    pub fn active_count(&self) -> usize {
        self.shared.counters.active_workers.load(Ordering::Acquire)
    }

    /// Tasks waiting in the queue.
    pub fn queued_tasks(&self) -> usize {
        self.shared.counters.queued_tasks.load(Ordering::Acquire)
    }

    /// Queue bound; zero means direct hand-off to idle workers.
    pub fn queue_capacity(&self) -> usize {
        self.shared.queue_capacity
    }

    /// Tasks admitted (started or queued).
    pub fn submitted_tasks(&self) -> u64 {
        self.shared.counters.submitted_tasks.load(Ordering::Acquire)
    }

    /// Tasks that finished, including those that panicked.
    pub fn completed_tasks(&self) -> u64 {
        self.shared.counters.completed_tasks.load(Ordering::Acquire)
    }

    /// Tasks that panicked.
    pub fn failed_tasks(&self) -> u64 {
        self.shared.counters.failed_tasks.load(Ordering::Acquire)
    }

    /// Rejections recorded since creation or the last reset.
    pub fn rejected_count(&self) -> u64 {
        self.shared.rejections.get()
    }

    /// `active_count / max_pool_size`, or `0.0` for a zero ceiling.
    pub fn thread_usage_rate(&self) -> f64 {
        self.shared.reading().utilization().unwrap_or(0.0)
    }

    /// Name of the policy behind the accounting wrapper.
    pub fn rejection_policy_name(&self) -> &'static str {
        self.shared.settings.load().policy_name()
    }

    /// Bounds and rejection handler from one reconfiguration.
    pub(crate) fn active_settings(&self) -> Arc<ActiveSettings> {
        self.shared.settings.load_full()
    }

    /// Current alert threshold.
    pub fn alert_threshold(&self) -> f64 {
        self.shared.alerts.threshold()
    }

    /// Current alert cooldown.
    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_millis(self.shared.alerts.cooldown_ms())
    }

    /// Monotonic reading of the last alert fire, if any.
    pub fn last_alert_ms(&self) -> Option<u64> {
        self.shared.alerts.last_alert_ms()
    }

    pub(crate) fn monotonic_now_ms(&self) -> u64 {
        self.shared.alerts.now_ms()
    }
}

impl fmt::Debug for DynamicPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bounds = self.bounds();
        f.debug_struct("DynamicPool")
            .field("name", &self.shared.name_prefix)
            .field("state", &self.state())
            .field("core_pool_size", &bounds.core)
            .field("max_pool_size", &bounds.max)
            .field("pool_size", &self.pool_size())
            .field("active_count", &self.active_count())
            .field("queued_tasks", &self.queued_tasks())
            .field("rejected_count", &self.rejected_count())
            .finish_non_exhaustive()
    }
}

impl Drop for DynamicPool {
    fn drop(&mut self) {
        // Graceful and non-blocking for workers; explicit shutdown is preferred.
        if !self.is_shutdown() {
            debug!(
                pool = %self.shared.name_prefix,
                "DynamicPool dropped without explicit shutdown"
            );
            self.shutdown();
        }
    }
}
