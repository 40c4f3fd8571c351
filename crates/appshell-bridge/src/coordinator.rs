//! "Close external viewer" coordination.
//!
//! `close_all` asks every running viewer process to close and reports back
//! through a single pending callback once they are gone. Three timer-driven
//! paths can finish the operation:
//!
//! - an acknowledgment re-check after each delivered close request,
//! - a short heartbeat that polls while processes linger,
//! - an overall timeout that reports [`ErrorCode::Unknown`] if any remain.
//!
//! Whichever path gets there first cancels both timers and fires the
//! callback. Later ticks find no callback or a stale token and do nothing.

use crate::request::ScriptCallback;
use crate::services::ExternalViewer;
use appshell_common::{TimerId, TimerToken, Timers};
use appshell_core::config::CloseConfig;
use appshell_core::ErrorCode;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

#[derive(Default)]
struct CloseState {
    callback: Option<ScriptCallback>,
    heartbeat: Option<TimerToken>,
    timeout: Option<TimerToken>,
}

impl CloseState {
    fn cancel_timers(&mut self) {
        if let Some(token) = self.heartbeat.take() {
            token.cancel();
        }
        if let Some(token) = self.timeout.take() {
            token.cancel();
        }
    }

    fn is_current(slot: &Option<TimerToken>, id: TimerId) -> bool {
        slot.as_ref().map(TimerToken::id) == Some(id)
    }
}

/// State reachable from timer tasks.
struct Shared {
    viewer: Arc<dyn ExternalViewer>,
    timers: Timers,
    heartbeat_interval: Duration,
    state: Mutex<CloseState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CloseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn anything_running(&self) -> bool {
        !self.viewer.running().is_empty()
    }

    /// Schedule `tick` on a weak reference so pending timers do not keep a
    /// dropped coordinator alive.
    fn schedule(
        self: &Arc<Self>,
        delay: Duration,
        tick: fn(&Arc<Shared>, TimerId),
    ) -> TimerToken {
        let weak: Weak<Shared> = Arc::downgrade(self);
        self.timers.schedule(delay, move |id| match weak.upgrade() {
            Some(shared) => tick(&shared, id),
            None => trace!(id = id.raw(), "Coordinator gone, ignoring tick"),
        })
    }

    fn acknowledged(self: &Arc<Self>, _id: TimerId) {
        if !self.anything_running() {
            self.fire(ErrorCode::None);
            return;
        }

        let mut state = self.lock();
        if state.callback.is_some() && state.heartbeat.is_none() {
            trace!("Viewer still running, starting heartbeat");
            state.heartbeat = Some(self.schedule(self.heartbeat_interval, Shared::heartbeat));
        }
    }

    fn heartbeat(self: &Arc<Self>, id: TimerId) {
        if !CloseState::is_current(&self.lock().heartbeat, id) {
            return;
        }

        if !self.anything_running() {
            self.fire(ErrorCode::None);
            return;
        }

        let mut state = self.lock();
        if CloseState::is_current(&state.heartbeat, id) {
            state.heartbeat = Some(self.schedule(self.heartbeat_interval, Shared::heartbeat));
        }
    }

    fn timed_out(self: &Arc<Self>, id: TimerId) {
        if !CloseState::is_current(&self.lock().timeout, id) {
            return;
        }

        let code = if self.anything_running() {
            ErrorCode::Unknown
        } else {
            ErrorCode::None
        };
        self.fire(code);
    }

    /// Cancel both timers and hand the callback `code`, at most once. The
    /// callback runs without the state lock held.
    fn fire(&self, code: ErrorCode) {
        let callback = {
            let mut state = self.lock();
            state.cancel_timers();
            state.callback.take()
        };

        if let Some(callback) = callback {
            info!(%code, "Close operation finished");
            callback.invoke(code);
        }
    }
}

/// Closes external viewer processes and notifies one pending caller.
pub struct CloseCoordinator {
    shared: Arc<Shared>,
    timeout: Duration,
    immediate_timeout: Duration,
}

impl CloseCoordinator {
    pub fn new(viewer: Arc<dyn ExternalViewer>, timers: Timers, config: &CloseConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                viewer,
                timers,
                heartbeat_interval: config.heartbeat_interval(),
                state: Mutex::new(CloseState::default()),
            }),
            timeout: config.timeout(),
            immediate_timeout: config.immediate_timeout(),
        }
    }

    /// Request every running viewer process to close.
    ///
    /// A still-pending callback from an earlier call is dropped without
    /// firing. `callback`, if given, fires once with [`ErrorCode::None`]
    /// when no viewer is left or [`ErrorCode::Unknown`] on timeout.
    pub fn close_all(&self, callback: Option<ScriptCallback>) -> ErrorCode {
        {
            let mut state = self.shared.lock();
            if state.callback.take().is_some() {
                warn!("Close already in progress; previous callback will not be called");
            }
            state.cancel_timers();
            state.callback = callback;
        }

        let running = self.shared.viewer.running();
        info!(count = running.len(), "Closing external viewer");

        for process in &running {
            match self.shared.viewer.request_close(process) {
                Ok(()) => {
                    self.shared.schedule(Duration::ZERO, Shared::acknowledged);
                }
                Err(err) => warn!(pid = process.pid, %err, "Close request failed"),
            }
        }

        let mut state = self.shared.lock();
        if state.callback.is_some() {
            let delay = if running.is_empty() {
                self.immediate_timeout
            } else {
                self.timeout
            };
            debug!(?delay, "Close timeout armed");
            state.timeout = Some(self.shared.schedule(delay, Shared::timed_out));
        }

        ErrorCode::None
    }

    /// Whether a callback is waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.shared.lock().callback.is_some()
    }
}

impl Drop for CloseCoordinator {
    fn drop(&mut self) {
        self.shared.lock().cancel_timers();
    }
}
