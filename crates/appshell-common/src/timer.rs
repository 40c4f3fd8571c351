//! One-shot timers on the tokio runtime.
//!
//! A scheduled task runs once after its delay unless its [`TimerToken`] is
//! cancelled first. Dropping a token does not cancel the timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::sleep;
use tracing::trace;

/// Unique identifier for a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Cancellation handle for a scheduled task.
#[derive(Debug)]
pub struct TimerToken {
    id: TimerId,
    abort: AbortHandle,
}

impl TimerToken {
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Cancel the task. No effect if it already ran.
    pub fn cancel(self) {
        trace!(id = self.id.raw(), "Timer cancelled");
        self.abort.abort();
    }
}

/// Schedules one-shot tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct Timers {
    handle: Handle,
}

impl Timers {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Run `task` once after `delay`.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TimerToken
    where
        F: FnOnce(TimerId) + Send + 'static,
    {
        let id = TimerId::new();
        trace!(id = id.raw(), ?delay, "Timer scheduled");
        let join = self.handle.spawn(async move {
            sleep(delay).await;
            task(id);
        });

        TimerToken {
            id,
            abort: join.abort_handle(),
        }
    }
}
