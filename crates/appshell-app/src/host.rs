//! Window-side requests coming out of the bridge.

use appshell_bridge::WindowHost;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

/// Requests the main loop handles for the (single) application window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    ShowDeveloperTools,
    Quit,
}

/// [`WindowHost`] that posts requests to the main loop.
pub struct AppWindow {
    events: UnboundedSender<HostEvent>,
}

impl AppWindow {
    pub fn new(events: UnboundedSender<HostEvent>) -> Self {
        Self { events }
    }

    fn post(&self, event: HostEvent) {
        trace!(?event, "Posting host event");
        // The loop outlives every dispatcher, so a closed channel only
        // happens during shutdown.
        let _ = self.events.send(event);
    }
}

impl WindowHost for AppWindow {
    fn show_developer_tools(&self) {
        self.post(HostEvent::ShowDeveloperTools);
    }

    fn quit(&self) {
        self.post(HostEvent::Quit);
    }
}
