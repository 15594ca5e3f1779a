//! Builder for a [`DynamicPool`] with injected collaborators.

use std::fmt;
use std::sync::Arc;

use crate::config::DynamicPoolConfig;
use crate::core::alert::AlertSink;
use crate::core::error::PoolError;
use crate::core::rejection::RejectionPolicy;
use crate::core::task::{FailureHook, TaskFailure};
use crate::core::DynamicPool;
use crate::util::clock::Clock;

/// Assembles a [`DynamicPool`] from configuration plus optional collaborators.
///
/// Anything not supplied falls back to the configuration: a monotonic clock,
/// no alert sink, no failure hook, and the configured built-in policy.
pub struct PoolBuilder {
    pub(crate) config: DynamicPoolConfig,
    pub(crate) clock: Option<Arc<dyn Clock>>,
    pub(crate) alert_sink: Option<Arc<dyn AlertSink>>,
    pub(crate) failure_hook: Option<FailureHook>,
    pub(crate) rejection_policy: Option<Arc<dyn RejectionPolicy>>,
}

impl PoolBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: DynamicPoolConfig) -> Self {
        Self {
            config,
            clock: None,
            alert_sink: None,
            failure_hook: None,
            rejection_policy: None,
        }
    }

    /// Clock used for alert cooldowns and snapshot timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Receiver of condition-met and fired alert events.
    #[must_use]
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sink = Some(sink);
        self
    }

    /// Called on the worker thread after a task panics.
    #[must_use]
    pub fn with_failure_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TaskFailure) + Send + Sync + 'static,
    {
        self.failure_hook = Some(Arc::new(hook));
        self
    }

    /// Initial rejection policy, overriding `config.rejection_policy`.
    #[must_use]
    pub fn with_rejection_policy<P>(mut self, policy: P) -> Self
    where
        P: RejectionPolicy + 'static,
    {
        self.rejection_policy = Some(Arc::new(policy));
        self
    }

    /// Validate the configuration and start the pool.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfiguration` for invalid configuration and
    /// `PoolError::WorkerSpawn` if the alert thread cannot be started.
    pub fn build(self) -> Result<DynamicPool, PoolError> {
        DynamicPool::from_builder(self)
    }
}

impl fmt::Debug for PoolBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("config", &self.config)
            .field("custom_clock", &self.clock.is_some())
            .field("alert_sink", &self.alert_sink.is_some())
            .field("failure_hook", &self.failure_hook.is_some())
            .field(
                "rejection_policy",
                &self.rejection_policy.as_ref().map(|p| p.name()),
            )
            .finish()
    }
}

/// Build a pool straight from configuration.
///
/// # Errors
///
/// See [`PoolBuilder::build`].
pub fn build_pool(cfg: &DynamicPoolConfig) -> Result<DynamicPool, PoolError> {
    PoolBuilder::new(cfg.clone()).build()
}
