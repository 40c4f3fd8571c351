//! AppShell Core Library
//!
//! This crate provides the script-facing error codes, host errors, and
//! configuration shared by the AppShell crates.

pub mod config;
pub mod error;
pub mod error_code;

pub use config::ShellConfig;
pub use error::{ShellError, ShellResult};
pub use error_code::{Access, ErrorCode};
