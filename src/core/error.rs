//! Error types for pool operations.

use std::fmt;

use thiserror::Error;

/// Why a submission could not be admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Every worker slot is busy and the queue is full.
    Saturated,
    /// The pool no longer admits work.
    Shutdown,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saturated => write!(f, "pool and queue are saturated"),
            Self::Shutdown => write!(f, "pool has been shut down"),
        }
    }
}

/// Errors produced by pool components.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Bounds, policy, threshold or cooldown failed validation. Nothing was changed.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// The active rejection policy refused the task.
    #[error("task rejected: {reason}")]
    Rejected {
        /// What made admission impossible.
        reason: RejectReason,
    },
    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(String),
}

impl PoolError {
    /// Shorthand for an [`PoolError::InvalidConfiguration`] error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Whether this error reports a refused submission.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
