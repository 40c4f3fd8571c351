//! # AppShell Common
//!
//! Utilities shared by the AppShell crates.
//!
//! ## Features
//!
//! - Logging configuration and setup
//! - Cancellable one-shot timers on the tokio runtime

pub mod logging;
pub mod timer;

pub use logging::{init_logging, LogConfig, LogFormat, SCRIPT_TARGET};
pub use timer::{TimerId, TimerToken, Timers};
