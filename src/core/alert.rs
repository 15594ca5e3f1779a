//! Utilization alerting.
//!
//! An [`AlertMonitor`] compares `active_workers / max_pool_size` against a
//! threshold and fires at most once per cooldown window. Each evaluation that
//! finds the pool hot emits a [`AlertEventKind::ConditionMet`] event; the one
//! evaluation that wins the compare-and-swap on the last-fired timestamp also
//! emits [`AlertEventKind::Fired`]. Any number of threads (the periodic ticker,
//! reconfiguration, explicit checks) may evaluate concurrently.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::error::PoolError;
use crate::util::clock::{wall_clock_ms, Clock};

/// `last_alert_ms` value meaning the alert has never fired.
const NEVER_FIRED: u64 = 0;

/// Which stage of an alert cycle an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertEventKind {
    /// Utilization reached the threshold (before cooldown gating).
    ConditionMet,
    /// The alert fired (after cooldown gating).
    Fired,
}

/// Structured alert event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Event identifier.
    pub event_id: String,
    /// Condition-met or fired.
    pub kind: AlertEventKind,
    /// `active_workers / max_pool_size` at evaluation time.
    pub utilization: f64,
    /// Threshold in force at evaluation time.
    pub threshold: f64,
    /// Workers executing a task.
    pub active_workers: usize,
    /// Pool ceiling.
    pub max_pool_size: usize,
    /// Tasks waiting in the queue.
    pub queued_tasks: usize,
    /// Rejections recorded so far.
    pub rejected_count: u64,
    /// Monotonic clock reading used for cooldown arithmetic.
    pub monotonic_ms: u64,
    /// Wall-clock timestamp, milliseconds since the Unix epoch.
    pub created_at_ms: u128,
}

/// Receiver of alert events.
pub trait AlertSink: Send + Sync {
    /// Record an alert event. Must not block for long: it runs on the
    /// evaluating thread.
    fn record(&self, event: &AlertEvent);
}

impl<F> AlertSink for F
where
    F: Fn(&AlertEvent) + Send + Sync,
{
    fn record(&self, event: &AlertEvent) {
        self(event);
    }
}

/// Bounded in-memory alert sink for testing and operational inspection.
pub struct InMemoryAlertSink {
    events: Mutex<VecDeque<AlertEvent>>,
    max_events: usize,
}

impl InMemoryAlertSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Stored events of one kind.
    pub fn events_of(&self, kind: AlertEventKind) -> Vec<AlertEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of stored `Fired` events.
    pub fn fired_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == AlertEventKind::Fired)
            .count()
    }

    /// Drop all stored events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl AlertSink for InMemoryAlertSink {
    fn record(&self, event: &AlertEvent) {
        if self.max_events == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event.clone());
    }
}

/// Live pool figures an evaluation works from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UtilizationReading {
    /// Workers executing a task.
    pub active_workers: usize,
    /// Pool ceiling.
    pub max_pool_size: usize,
    /// Tasks waiting in the queue.
    pub queued_tasks: usize,
    /// Rejections recorded so far.
    pub rejected_count: u64,
}

impl UtilizationReading {
    /// `active_workers / max_pool_size`, or `None` when the ceiling is zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> Option<f64> {
        (self.max_pool_size > 0).then(|| self.active_workers as f64 / self.max_pool_size as f64)
    }
}

/// Result of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    /// `max_pool_size` was zero; nothing evaluated.
    Skipped,
    /// Utilization below threshold.
    Normal,
    /// Hot, but the previous fire is inside the cooldown window.
    CoolingDown,
    /// Hot and eligible, but a concurrent evaluation fired first.
    LostRace,
    /// This evaluation fired the alert.
    Fired,
}

/// Check that `threshold` is a fraction in `[0.0, 1.0]`.
///
/// # Errors
///
/// Returns [`PoolError::InvalidConfiguration`] for values outside the range or NaN.
pub fn validate_threshold(threshold: f64) -> Result<f64, PoolError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(PoolError::invalid(format!(
            "alert threshold must be between 0.0 and 1.0, got {threshold}"
        )))
    }
}

/// Threshold/cooldown gated utilization alert.
pub struct AlertMonitor {
    threshold_bits: AtomicU64,
    cooldown_ms: AtomicU64,
    last_alert_ms: AtomicU64,
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn AlertSink>>,
}

impl AlertMonitor {
    /// Create a monitor.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfiguration`] if `threshold` is out of range.
    pub fn new(
        threshold: f64,
        cooldown_ms: u64,
        clock: Arc<dyn Clock>,
        sink: Option<Arc<dyn AlertSink>>,
    ) -> Result<Self, PoolError> {
        let threshold = validate_threshold(threshold)?;
        Ok(Self {
            threshold_bits: AtomicU64::new(threshold.to_bits()),
            cooldown_ms: AtomicU64::new(cooldown_ms),
            last_alert_ms: AtomicU64::new(NEVER_FIRED),
            clock,
            sink,
        })
    }

    /// Current threshold.
    pub fn threshold(&self) -> f64 {
        f64::from_bits(self.threshold_bits.load(Ordering::Acquire))
    }

    /// Replace the threshold, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfiguration`] if `threshold` is out of
    /// range; the stored value is left untouched.
    pub fn set_threshold(&self, threshold: f64) -> Result<f64, PoolError> {
        let threshold = validate_threshold(threshold)?;
        let old = self.threshold_bits.swap(threshold.to_bits(), Ordering::AcqRel);
        Ok(f64::from_bits(old))
    }

    /// Current cooldown in milliseconds.
    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms.load(Ordering::Acquire)
    }

    /// Replace the cooldown, returning the previous one.
    pub fn set_cooldown_ms(&self, cooldown_ms: u64) -> u64 {
        self.cooldown_ms.swap(cooldown_ms, Ordering::AcqRel)
    }

    /// Monotonic reading of the last fire, if any.
    pub fn last_alert_ms(&self) -> Option<u64> {
        match self.last_alert_ms.load(Ordering::Acquire) {
            NEVER_FIRED => None,
            ms => Some(ms),
        }
    }

    /// Current reading of the monitor's clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Evaluate the alert condition once.
    pub fn evaluate(&self, reading: &UtilizationReading) -> AlertOutcome {
        let Some(utilization) = reading.utilization() else {
            return AlertOutcome::Skipped;
        };
        let threshold = self.threshold();

        if utilization < threshold {
            trace!(
                utilization,
                threshold,
                rejected_count = reading.rejected_count,
                "Pool utilization normal"
            );
            return AlertOutcome::Normal;
        }

        let last = self.last_alert_ms.load(Ordering::Acquire);
        let now = self.clock.now_ms();
        debug!(
            utilization,
            threshold,
            active_workers = reading.active_workers,
            max_pool_size = reading.max_pool_size,
            "Alert condition met"
        );
        self.emit(AlertEventKind::ConditionMet, reading, utilization, threshold, now);

        if last != NEVER_FIRED && now.saturating_sub(last) < self.cooldown_ms() {
            return AlertOutcome::CoolingDown;
        }

        // NEVER_FIRED is reserved, so a fire at monotonic zero is stamped as 1.
        let stamp = now.max(1);
        if self
            .last_alert_ms
            .compare_exchange(last, stamp, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return AlertOutcome::LostRace;
        }

        warn!(
            utilization_pct = utilization * 100.0,
            threshold_pct = threshold * 100.0,
            active_workers = reading.active_workers,
            max_pool_size = reading.max_pool_size,
            queued_tasks = reading.queued_tasks,
            rejected_count = reading.rejected_count,
            "Pool utilization alert"
        );
        self.emit(AlertEventKind::Fired, reading, utilization, threshold, now);
        AlertOutcome::Fired
    }

    fn emit(
        &self,
        kind: AlertEventKind,
        reading: &UtilizationReading,
        utilization: f64,
        threshold: f64,
        now: u64,
    ) {
        let Some(sink) = &self.sink else {
            return;
        };
        sink.record(&AlertEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            kind,
            utilization,
            threshold,
            active_workers: reading.active_workers,
            max_pool_size: reading.max_pool_size,
            queued_tasks: reading.queued_tasks,
            rejected_count: reading.rejected_count,
            monotonic_ms: now,
            created_at_ms: wall_clock_ms(),
        });
    }
}
