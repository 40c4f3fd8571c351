//! Native-to-script command dispatch.
//!
//! The host asks the script application whether it may go ahead with a
//! default action (quit, close, reload) by running the command through
//! `shellAPI.executeCommand`. Anything short of an explicit `true` ("prevent
//! default") from script lets the host proceed.

use appshell_js::{JsRuntime, JsValue};
use std::fmt;
use tracing::{debug, warn};

/// Property path of the script-side command executor.
pub const EXECUTE_COMMAND_PATH: [&str; 2] = ["shellAPI", "executeCommand"];

/// Commands the host sends to script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellCommand {
    Quit,
    CloseWindow,
    RefreshWindow,
    About,
}

impl ShellCommand {
    /// Identifier understood by the script command system.
    pub fn id(self) -> &'static str {
        match self {
            ShellCommand::Quit => "file.quit",
            ShellCommand::CloseWindow => "file.close_window",
            ShellCommand::RefreshWindow => "debug.refreshWindow",
            ShellCommand::About => "help.about",
        }
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Run `command` in script. Returns whether the host should proceed with
/// its default action.
pub fn dispatch_command(runtime: Option<&mut JsRuntime>, command: ShellCommand) -> bool {
    let Some(runtime) = runtime else {
        debug!(%command, "No script context, proceeding");
        return true;
    };

    let Some(execute) = runtime.lookup_function(&EXECUTE_COMMAND_PATH) else {
        debug!(%command, "No command executor in script, proceeding");
        return true;
    };

    match runtime.call_function(&execute, &[JsValue::String(command.id().to_string())]) {
        Ok(JsValue::Boolean(prevent_default)) => {
            debug!(%command, prevent_default, "Command dispatched");
            !prevent_default
        }
        Ok(_) => true,
        Err(err) => {
            warn!(%command, %err, "Command failed in script, proceeding");
            true
        }
    }
}
