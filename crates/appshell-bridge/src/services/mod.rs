//! Native service handlers and the collaborators they rely on.
//!
//! Handlers return [`HandlerResult`]: the `Err` side carries the
//! script-facing [`ErrorCode`](appshell_core::ErrorCode) and never a panic
//! or host error.

pub mod dialog;
pub mod fs;
pub mod viewer;

use appshell_core::ErrorCode;

pub use dialog::{DialogSelection, FileDialogs, OpenDialogOptions, RfdDialogs};
pub use viewer::{ExternalViewer, SystemViewer, ViewerProcess};

/// Outcome of a service handler.
pub type HandlerResult<T> = Result<T, ErrorCode>;

/// Requests the bridge forwards to the window that hosts the script
/// application.
///
/// Implementations post the request and return; neither call can fail.
pub trait WindowHost {
    /// Open developer tools for the active window
    fn show_developer_tools(&self);

    /// Ask the application to quit
    fn quit(&self);
}
