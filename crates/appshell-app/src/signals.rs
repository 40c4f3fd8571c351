//! Process signals mapped to shell commands.
//!
//! On Unix, `SIGHUP` reloads the script application and `SIGUSR1` shows
//! the about information. Other platforms never deliver either.

use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    Reload,
    About,
}

#[cfg(unix)]
pub struct HostSignals {
    hangup: tokio::signal::unix::Signal,
    user1: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl HostSignals {
    pub fn new() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            user1: signal(SignalKind::user_defined1())?,
        })
    }

    pub async fn recv(&mut self) -> HostSignal {
        tokio::select! {
            _ = self.hangup.recv() => HostSignal::Reload,
            _ = self.user1.recv() => HostSignal::About,
        }
    }
}

#[cfg(not(unix))]
pub struct HostSignals;

#[cfg(not(unix))]
impl HostSignals {
    pub fn new() -> io::Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> HostSignal {
        std::future::pending().await
    }
}
