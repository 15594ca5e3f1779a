//! Pool configuration structures.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::alert::validate_threshold;
use crate::core::error::{AppResult, PoolError};
use crate::core::rejection::{
    AbortPolicy, CallerRunsPolicy, DiscardOldestPolicy, DiscardPolicy, RejectionPolicy,
};
use crate::core::worker_pool::PoolBounds;

/// Prefix of every environment variable read by [`DynamicPoolConfig::from_env`].
pub const ENV_PREFIX: &str = "DYNPOOL_";

/// Built-in rejection policy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionPolicyKind {
    /// Fail the submission with `PoolError::Rejected`.
    Abort,
    /// Run the task on the submitting thread.
    #[default]
    CallerRuns,
    /// Drop the task.
    Discard,
    /// Drop the oldest queued task and retry.
    DiscardOldest,
}

impl RejectionPolicyKind {
    /// Instantiate the selected policy.
    #[must_use]
    pub fn build(self) -> Arc<dyn RejectionPolicy> {
        match self {
            Self::Abort => Arc::new(AbortPolicy),
            Self::CallerRuns => Arc::new(CallerRunsPolicy),
            Self::Discard => Arc::new(DiscardPolicy),
            Self::DiscardOldest => Arc::new(DiscardOldestPolicy),
        }
    }

    /// Wire name, matching the serde representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::CallerRuns => "caller_runs",
            Self::Discard => "discard",
            Self::DiscardOldest => "discard_oldest",
        }
    }
}

impl fmt::Display for RejectionPolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RejectionPolicyKind {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "abort" => Ok(Self::Abort),
            "caller_runs" => Ok(Self::CallerRuns),
            "discard" => Ok(Self::Discard),
            "discard_oldest" => Ok(Self::DiscardOldest),
            other => Err(PoolError::invalid(format!("unknown rejection policy `{other}`"))),
        }
    }
}

/// Utilization alert settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Fraction of `max_pool_size` considered hot, in `[0.0, 1.0]`.
    pub threshold: f64,
    /// Minimum milliseconds between two fires.
    pub cooldown_ms: u64,
    /// Period of the background check. The first check runs one period after start.
    pub check_interval_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            cooldown_ms: 60_000,
            check_interval_ms: 60_000,
        }
    }
}

impl AlertConfig {
    /// Validate alert settings.
    pub fn validate(&self) -> Result<(), String> {
        validate_threshold(self.threshold).map_err(|e| e.to_string())?;
        if self.check_interval_ms == 0 {
            return Err("alert check_interval_ms must be greater than 0".into());
        }
        Ok(())
    }
}

/// Configuration for a [`DynamicPool`](crate::core::DynamicPool).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicPoolConfig {
    /// Workers kept alive while idle.
    pub core_pool_size: usize,
    /// Ceiling on live workers.
    pub max_pool_size: usize,
    /// Bounded queue capacity. Zero hands tasks directly to idle workers.
    pub queue_capacity: usize,
    /// How long a worker above the core size waits for work before retiring.
    pub keep_alive_ms: u64,
    /// Worker threads are named `<prefix>-<n>`.
    pub thread_name_prefix: String,
    /// Worker stack size in bytes; zero keeps the platform default.
    pub thread_stack_size: usize,
    /// Initial rejection policy.
    pub rejection_policy: RejectionPolicyKind,
    /// Alert settings.
    pub alert: AlertConfig,
}

impl Default for DynamicPoolConfig {
    fn default() -> Self {
        Self {
            core_pool_size: 5,
            max_pool_size: 20,
            queue_capacity: 200,
            keep_alive_ms: 60_000,
            thread_name_prefix: "dynamic-pool".to_string(),
            thread_stack_size: 0,
            rejection_policy: RejectionPolicyKind::CallerRuns,
            alert: AlertConfig::default(),
        }
    }
}

impl DynamicPoolConfig {
    /// Create a configuration with the default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults sized to the machine: one core worker per logical CPU and
    /// four times that as the ceiling.
    #[must_use]
    pub fn for_available_cpus() -> Self {
        let cpus = num_cpus::get().max(1);
        Self::default()
            .with_core_pool_size(cpus)
            .with_max_pool_size(cpus.saturating_mul(4))
    }

    /// Set the core pool size.
    #[must_use]
    pub const fn with_core_pool_size(mut self, size: usize) -> Self {
        self.core_pool_size = size;
        self
    }

    /// Set the maximum pool size.
    #[must_use]
    pub const fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Set the queue capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the idle keep-alive for workers above the core size.
    #[must_use]
    pub const fn with_keep_alive_ms(mut self, keep_alive_ms: u64) -> Self {
        self.keep_alive_ms = keep_alive_ms;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Set the initial rejection policy.
    #[must_use]
    pub const fn with_rejection_policy(mut self, kind: RejectionPolicyKind) -> Self {
        self.rejection_policy = kind;
        self
    }

    /// Set the alert threshold.
    #[must_use]
    pub const fn with_alert_threshold(mut self, threshold: f64) -> Self {
        self.alert.threshold = threshold;
        self
    }

    /// Set the alert cooldown.
    #[must_use]
    pub const fn with_alert_cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.alert.cooldown_ms = cooldown_ms;
        self
    }

    /// Set the background alert check period.
    #[must_use]
    pub const fn with_alert_check_interval_ms(mut self, interval_ms: u64) -> Self {
        self.alert.check_interval_ms = interval_ms;
        self
    }

    /// Validate pool configuration values.
    pub fn validate(&self) -> Result<(), String> {
        PoolBounds::new(self.core_pool_size, self.max_pool_size).map_err(|e| e.to_string())?;
        if self.keep_alive_ms == 0 {
            return Err("keep_alive_ms must be greater than 0".into());
        }
        if self.thread_name_prefix.is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        self.alert.validate()
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from `DYNPOOL_*` environment variables, reading a
    /// `.env` file first if one exists. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Fails when a variable does not parse or the result does not validate.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// [`DynamicPoolConfig::from_env`] over an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Fails when a value does not parse or the result does not validate.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T, F>(lookup: &F, name: &str, slot: &mut T) -> AppResult<()>
        where
            T: FromStr,
            T::Err: std::error::Error + Send + Sync + 'static,
            F: Fn(&str) -> Option<String>,
        {
            let key = format!("{ENV_PREFIX}{name}");
            if let Some(raw) = lookup(&key) {
                *slot = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} has invalid value `{raw}`"))?;
            }
            Ok(())
        }

        let mut cfg = Self::default();
        parsed(&lookup, "CORE_POOL_SIZE", &mut cfg.core_pool_size)?;
        parsed(&lookup, "MAX_POOL_SIZE", &mut cfg.max_pool_size)?;
        parsed(&lookup, "QUEUE_CAPACITY", &mut cfg.queue_capacity)?;
        parsed(&lookup, "KEEP_ALIVE_MS", &mut cfg.keep_alive_ms)?;
        parsed(&lookup, "THREAD_STACK_SIZE", &mut cfg.thread_stack_size)?;
        parsed(&lookup, "REJECTION_POLICY", &mut cfg.rejection_policy)?;
        parsed(&lookup, "ALERT_THRESHOLD", &mut cfg.alert.threshold)?;
        parsed(&lookup, "ALERT_COOLDOWN_MS", &mut cfg.alert.cooldown_ms)?;
        parsed(&lookup, "ALERT_CHECK_INTERVAL_MS", &mut cfg.alert.check_interval_ms)?;
        if let Some(prefix) = lookup(&format!("{ENV_PREFIX}THREAD_NAME_PREFIX")) {
            cfg.thread_name_prefix = prefix;
        }

        cfg.validate().map_err(|e| anyhow::anyhow!("config invalid: {e}"))?;
        Ok(cfg)
    }
}

/// Wire-shaped reconfiguration input with signed sizes and an optional policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconfigureRequest {
    /// Requested core size; negative values are rejected.
    pub core_pool_size: i64,
    /// Requested maximum size; must be positive.
    pub max_pool_size: i64,
    /// Requested policy; `None` is rejected.
    pub rejection_policy: Option<RejectionPolicyKind>,
}

impl ReconfigureRequest {
    /// Check every field, returning the validated bounds and policy.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfiguration`] for invalid bounds or a
    /// missing policy.
    pub fn validate(&self) -> Result<(PoolBounds, RejectionPolicyKind), PoolError> {
        let bounds = PoolBounds::from_signed(self.core_pool_size, self.max_pool_size)?;
        let kind = self
            .rejection_policy
            .ok_or_else(|| PoolError::invalid("rejection_policy is required"))?;
        Ok((bounds, kind))
    }
}

/// Wire-shaped alert tuning input. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettingsRequest {
    /// New threshold in `[0.0, 1.0]`.
    pub threshold: Option<f64>,
    /// New cooldown in milliseconds; negative values are rejected.
    pub cooldown_ms: Option<i64>,
}

impl AlertSettingsRequest {
    /// Check every present field.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfiguration`] for an out-of-range
    /// threshold or a negative cooldown.
    pub fn validate(&self) -> Result<(Option<f64>, Option<u64>), PoolError> {
        let threshold = self.threshold.map(validate_threshold).transpose()?;
        let cooldown_ms = self
            .cooldown_ms
            .map(|ms| {
                u64::try_from(ms).map_err(|_| PoolError::invalid("alert cooldown_ms must be >= 0"))
            })
            .transpose()?;
        Ok((threshold, cooldown_ms))
    }
}
