//! Task representation and the hooks tasks interact with.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A unit of work accepted by the pool.
///
/// Tasks are plain closures. Results travel through whatever the closure
/// captures (channels, shared state); the pool only runs them.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Details about a task that panicked on a worker.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    /// Name of the worker thread that ran the task.
    pub worker: String,
    /// Panic payload rendered as text, when it was a string.
    pub message: String,
}

impl TaskFailure {
    pub(crate) fn from_panic(worker: &str, payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self {
            worker: worker.to_string(),
            message,
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task panicked on {}: {}", self.worker, self.message)
    }
}

/// Observability hook invoked after a task panics. The worker keeps running.
pub type FailureHook = Arc<dyn Fn(&TaskFailure) + Send + Sync>;

/// Cooperative interruption flag raised by `shutdown_now`.
///
/// Rust threads cannot be interrupted from outside, so long-running tasks
/// that want to stop early capture a token and poll it.
#[derive(Debug, Clone, Default)]
pub struct InterruptToken {
    flag: Arc<AtomicBool>,
}

impl InterruptToken {
    /// Create a token that is not yet interrupted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the owning pool has been force-stopped.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub(crate) fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
    }
}
