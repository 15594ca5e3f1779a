//! Cancellable fixed-period background thread driving alert checks.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::error::PoolError;

/// Stop flag shared with the ticker thread, paired with its Condvar.
type StopSignal = Arc<(Mutex<bool>, Condvar)>;

/// Background thread that calls `tick` every `period` until stopped.
///
/// The thread sleeps on a Condvar between ticks, so stopping it wakes it
/// immediately instead of waiting out the period.
pub(crate) struct AlertTicker {
    stop: StopSignal,
    handle: Option<JoinHandle<()>>,
}

impl AlertTicker {
    /// Start the ticker. The first tick happens one `period` after start.
    /// `tick` returns `false` to end the thread on its own.
    pub(crate) fn spawn<F>(name: String, period: Duration, mut tick: F) -> Result<Self, PoolError>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let stop: StopSignal = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let (lock, condvar) = &*thread_stop;
                let mut stopped = lock.lock();
                loop {
                    let deadline = Instant::now() + period;
                    while !*stopped {
                        if condvar.wait_until(&mut stopped, deadline).timed_out() {
                            break;
                        }
                    }
                    if *stopped {
                        break;
                    }
                    // Release the lock while ticking so stop() never waits on a tick.
                    if !parking_lot::MutexGuard::unlocked(&mut stopped, &mut tick) {
                        break;
                    }
                }
                debug!("Alert ticker exiting");
            })
            .map_err(|e| PoolError::WorkerSpawn(e.to_string()))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    fn signal(&self) {
        let (lock, condvar) = &*self.stop;
        *lock.lock() = true;
        condvar.notify_all();
    }

    /// Stop and wait up to `timeout` for the thread to exit, detaching it if
    /// a tick is still running after that.
    pub(crate) fn stop(mut self, timeout: Duration) {
        self.signal();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if !join_with_timeout(handle, timeout) {
            warn!("Alert ticker did not exit within timeout - detaching");
        }
    }

    /// Stop without waiting for the thread.
    pub(crate) fn stop_now(mut self) {
        self.signal();
        self.handle.take();
    }
}

impl Drop for AlertTicker {
    fn drop(&mut self) {
        self.signal();
    }
}

/// Join `handle`, giving up after `timeout`. Returns whether the thread exited.
fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let joiner = thread::spawn(move || {
        let _ = tx.send(handle.join().is_ok());
    });
    match rx.recv_timeout(timeout) {
        Ok(clean) => {
            if !clean {
                warn!("Alert ticker panicked");
            }
            let _ = joiner.join();
            true
        }
        Err(_) => false,
    }
}
