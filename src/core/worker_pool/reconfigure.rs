//! Live reconfiguration of capacity, rejection policy and alert settings.
//!
//! Every mutator validates all of its input before touching any state, then
//! runs an immediate alert check so a change that makes the pool hot is
//! reported without waiting for the next tick.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{AlertSettingsRequest, ReconfigureRequest};
use crate::core::error::PoolError;
use crate::core::rejection::{RejectionAccounting, RejectionPolicy};

use super::{ActiveSettings, DynamicPool, PoolBounds};

impl DynamicPool {
    /// Replace core size, maximum size and rejection policy as one unit.
    ///
    /// Workers above a smaller maximum are not interrupted; they retire after
    /// their current task. The new policy is wrapped in a fresh accounting
    /// wrapper recording into the same rejection counter, so the cumulative
    /// count survives.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfiguration`] for invalid bounds or a pool
    /// that is shutting down. Nothing is changed in that case.
    pub fn reconfigure<P>(
        &self,
        core_pool_size: usize,
        max_pool_size: usize,
        policy: P,
    ) -> Result<(), PoolError>
    where
        P: RejectionPolicy + 'static,
    {
        self.reconfigure_with(core_pool_size, max_pool_size, Arc::new(policy))
    }

    /// [`DynamicPool::reconfigure`] for an already shared policy.
    ///
    /// # Errors
    ///
    /// See [`DynamicPool::reconfigure`].
    pub fn reconfigure_with(
        &self,
        core_pool_size: usize,
        max_pool_size: usize,
        policy: Arc<dyn RejectionPolicy>,
    ) -> Result<(), PoolError> {
        let bounds = PoolBounds::new(core_pool_size, max_pool_size)?;
        let shared = &self.shared;
        if self.is_shutdown() {
            return Err(PoolError::invalid("pool is shut down; reconfiguration refused"));
        }

        let next = Arc::new(ActiveSettings::new(
            bounds,
            RejectionAccounting::new(policy, shared.rejections.clone()),
        ));
        let new_policy = next.policy_name();
        let previous = shared.settings.swap(next);

        info!(
            old_core_pool_size = previous.bounds.core,
            new_core_pool_size = bounds.core,
            old_max_pool_size = previous.bounds.max,
            new_max_pool_size = bounds.max,
            old_policy = previous.policy_name(),
            new_policy,
            "Pool reconfigured"
        );

        self.start_workers_for_backlog(bounds);
        shared.check_alert();
        Ok(())
    }

    /// Apply a wire-shaped reconfiguration request.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfiguration`] for negative sizes, a
    /// missing policy, or anything [`DynamicPool::reconfigure`] rejects.
    pub fn apply(&self, request: &ReconfigureRequest) -> Result<(), PoolError> {
        let (bounds, kind) = request.validate()?;
        self.reconfigure_with(bounds.core, bounds.max, kind.build())
    }

    /// Set the utilization fraction at which alerts fire, then re-check.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfiguration`] unless `threshold` is in `[0.0, 1.0]`.
    pub fn set_alert_threshold(&self, threshold: f64) -> Result<(), PoolError> {
        let old = self.shared.alerts.set_threshold(threshold)?;
        info!(
            old_threshold_pct = old * 100.0,
            new_threshold_pct = threshold * 100.0,
            "Alert threshold adjusted"
        );
        self.shared.check_alert();
        Ok(())
    }

    /// Set the minimum time between two alert fires, then re-check.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfiguration`] if the cooldown does not
    /// fit in 64-bit milliseconds.
    pub fn set_alert_cooldown(&self, cooldown: Duration) -> Result<(), PoolError> {
        let cooldown_ms = u64::try_from(cooldown.as_millis())
            .map_err(|_| PoolError::invalid("alert cooldown is too large"))?;
        let old = self.shared.alerts.set_cooldown_ms(cooldown_ms);
        info!(old_cooldown_ms = old, new_cooldown_ms = cooldown_ms, "Alert cooldown adjusted");
        self.shared.check_alert();
        Ok(())
    }

    /// Apply a wire-shaped alert settings request. Both fields are validated
    /// before either is stored.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfiguration`] for an out-of-range
    /// threshold or a negative cooldown.
    pub fn apply_alert_settings(&self, request: &AlertSettingsRequest) -> Result<(), PoolError> {
        let (threshold, cooldown_ms) = request.validate()?;
        let alerts = &self.shared.alerts;
        if let Some(threshold) = threshold {
            let old = alerts.set_threshold(threshold)?;
            info!(
                old_threshold_pct = old * 100.0,
                new_threshold_pct = threshold * 100.0,
                "Alert threshold adjusted"
            );
        }
        if let Some(cooldown_ms) = cooldown_ms {
            let old = alerts.set_cooldown_ms(cooldown_ms);
            info!(old_cooldown_ms = old, new_cooldown_ms = cooldown_ms, "Alert cooldown adjusted");
        }
        self.shared.check_alert();
        Ok(())
    }

    /// A larger core size starts workers for work already waiting.
    fn start_workers_for_backlog(&self, bounds: PoolBounds) {
        let shared = &self.shared;
        let backlog = shared.counters.queued_tasks.load(Ordering::Acquire);
        let live = shared.counters.pool_size.load(Ordering::Acquire);
        let wanted = bounds.core.saturating_sub(live).min(backlog);
        for _ in 0..wanted {
            if !shared.try_add_idle_worker(bounds.core) {
                break;
            }
        }
    }
}
