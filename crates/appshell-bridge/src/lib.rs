//! # AppShell Bridge
//!
//! Native side of the script/host boundary.
//!
//! ## Features
//!
//! - Named native calls with a per-call error code ([`Dispatcher`])
//! - File system, dialog and external viewer services
//! - Close coordination for external viewer processes ([`CloseCoordinator`])
//! - Host-to-script command dispatch ([`dispatch_command`])
//! - Script binding over [`appshell_js::JsRuntime`] ([`ShellBinding`])

pub mod binding;
pub mod coordinator;
pub mod dispatcher;
pub mod normalize;
pub mod request;
pub mod reverse;
pub mod services;

#[cfg(test)]
mod testing;

pub use binding::{CallbackEvent, ShellBinding, BINDING_JS};
pub use coordinator::CloseCoordinator;
pub use dispatcher::{Dispatch, Dispatcher, Services};
pub use normalize::JsonEscaping;
pub use request::{CallArg, CallValue, Command, ScriptCallback, ShellRequest, GET_LAST_ERROR};
pub use reverse::{dispatch_command, ShellCommand, EXECUTE_COMMAND_PATH};
pub use services::{
    DialogSelection, ExternalViewer, FileDialogs, HandlerResult, OpenDialogOptions, RfdDialogs,
    SystemViewer, ViewerProcess, WindowHost,
};
