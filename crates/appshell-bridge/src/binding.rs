//! Script-facing binding.
//!
//! [`ShellBinding::install`] registers every dispatcher call as a global
//! native function and evaluates [`BINDING_JS`], which wraps them into the
//! `appshell.fs` and `appshell.app` namespaces.
//!
//! Script functions passed to native calls are retained by the runtime.
//! Native code only holds a [`ScriptCallback`] that posts a
//! [`CallbackEvent`]; the host then runs the function through
//! [`ShellBinding::run_pending_callbacks`] or [`ShellBinding::deliver`].
//!
//! With `appshell.forceAsyncCallbacks` set, every callback runs from the
//! host's event loop instead of inside the call that produced it.

use crate::dispatcher::{Dispatch, Dispatcher};
use crate::request::{CallArg, CallValue, Command, ScriptCallback, GET_LAST_ERROR};
use appshell_common::Timers;
use appshell_core::ErrorCode;
use appshell_js::{JsError, JsRuntime, JsValue, RetainedFunctions};
use std::cell::RefCell;
use std::iter;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, trace, warn};

/// Script side of the binding. Error constants are added by
/// [`ShellBinding::install`].
pub const BINDING_JS: &str = r#"
(function() {
    var appshell = globalThis.appshell || (globalThis.appshell = {});
    var fs = appshell.fs || (appshell.fs = {});
    var app = appshell.app || (appshell.app = {});

    // Defer every callback to the host event loop
    appshell.forceAsyncCallbacks = false;

    // Native calls are synchronous; results are handed to callbacks as (err, result)
    function invokeCallback(callback) {
        if (typeof callback !== 'function') {
            return;
        }
        var args = Array.prototype.slice.call(arguments, 1);
        function doCallback() {
            callback.apply(null, args);
        }
        if (appshell.forceAsyncCallbacks) {
            __appshellDefer(doCallback, 10);
        } else {
            doCallback();
        }
    }

    function parseList(resultString, err) {
        return err === fs.NO_ERROR ? JSON.parse(resultString || '[]') : [];
    }

    // The dialog is modal; open it after the calling script has returned
    fs.showOpenDialog = function(allowMultipleSelection, chooseDirectory, title, initialPath, fileTypes, callback) {
        __appshellDefer(function() {
            var resultString = ShowOpenDialog(!!allowMultipleSelection, !!chooseDirectory,
                                              title || 'Open', initialPath || '',
                                              fileTypes ? fileTypes.join(' ') : '');
            var err = GetLastError();
            invokeCallback(callback, err, parseList(resultString, err));
        }, 0);
    };

    fs.readdir = function(path, callback) {
        var resultString = ReadDirectory(path);
        var err = GetLastError();
        invokeCallback(callback, err, parseList(resultString, err));
    };

    fs.stat = function(path, callback) {
        var isDir = IsDirectory(path);
        var err = GetLastError();
        if (err !== fs.NO_ERROR) {
            invokeCallback(callback, err);
            return;
        }

        var modtime = GetModificationTime(path);
        invokeCallback(callback, GetLastError(), {
            isFile: function() { return !isDir; },
            isDirectory: function() { return isDir; },
            mtime: new Date(modtime)
        });
    };

    fs.readFile = function(path, encoding, callback) {
        var contents = ReadFile(path, encoding);
        invokeCallback(callback, GetLastError(), contents);
    };

    fs.writeFile = function(path, data, encoding, callback) {
        WriteFile(path, data, encoding);
        invokeCallback(callback, GetLastError());
    };

    fs.chmod = function(path, mode, callback) {
        SetPermissions(path, mode);
        invokeCallback(callback, GetLastError());
    };

    // Only files can be unlinked
    fs.unlink = function(path, callback) {
        if (IsDirectory(path) === true) {
            invokeCallback(callback, fs.ERR_NOT_FILE);
            return;
        }
        DeleteFileOrDirectory(path);
        invokeCallback(callback, GetLastError());
    };

    app.openLiveBrowser = function(url, enableRemoteDebugging, callback) {
        OpenExternalViewer(url, !!enableRemoteDebugging);
        invokeCallback(callback, GetLastError());
    };

    // callback(err) runs once the viewer is gone or the close timed out
    app.closeLiveBrowser = function(callback) {
        if (typeof callback === 'function') {
            CloseExternalViewer(callback);
        } else {
            CloseExternalViewer();
        }
        var err = GetLastError();
        if (err !== fs.NO_ERROR) {
            invokeCallback(callback, err);
        }
    };

    app.quit = function() {
        QuitApplication();
    };

    app.showDeveloperTools = function() {
        ShowDeveloperTools();
    };

    app.getElapsedMilliseconds = function() {
        return GetElapsedMilliseconds();
    };
})();
"#;

/// Name of the native call the binding script defers work through.
const DEFER: &str = "__appshellDefer";

/// Fate of a script function handed to native code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackEvent {
    /// Call the function with the code
    Fire { id: u64, code: ErrorCode },
    /// Call the function with no arguments
    Run { id: u64 },
    /// Native code dropped it; forget the function
    Release { id: u64 },
}

/// Native-side stand-in for a retained script function. Releases it when
/// dropped.
struct CallbackHandle {
    id: u64,
    events: UnboundedSender<CallbackEvent>,
}

impl CallbackHandle {
    fn fire(&self, code: ErrorCode) {
        // The receiver is gone only when the binding is, and then nobody is
        // left to run the function.
        let _ = self.events.send(CallbackEvent::Fire { id: self.id, code });
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        let _ = self.events.send(CallbackEvent::Release { id: self.id });
    }
}

/// The installed binding.
///
/// Events refer to functions retained by the runtime the binding was
/// installed in, so [`ShellBinding::deliver`] must be given that runtime.
pub struct ShellBinding {
    dispatcher: Rc<RefCell<Dispatcher>>,
    events: UnboundedReceiver<CallbackEvent>,
}

impl ShellBinding {
    /// Register the native calls in `runtime` and evaluate the binding
    /// script.
    pub fn install(runtime: &mut JsRuntime, dispatcher: Dispatcher) -> Result<Self, JsError> {
        Self::bind(runtime, Rc::new(RefCell::new(dispatcher)))
    }

    /// Install the same dispatcher into a fresh runtime, e.g. when the
    /// script application is reloaded. The last error code and the start
    /// time carry over.
    ///
    /// The new binding has its own event queue. Callbacks still pending
    /// here are never run there.
    pub fn rebind(&self, runtime: &mut JsRuntime) -> Result<Self, JsError> {
        Self::bind(runtime, self.dispatcher.clone())
    }

    fn bind(
        runtime: &mut JsRuntime,
        dispatcher: Rc<RefCell<Dispatcher>>,
    ) -> Result<Self, JsError> {
        let (sender, events) = mpsc::unbounded_channel();

        let names = Command::ALL
            .iter()
            .map(|command| command.name())
            .chain(iter::once(GET_LAST_ERROR));

        for name in names {
            let dispatcher = dispatcher.clone();
            let sender = sender.clone();

            runtime.register_function(name, 0, move |args, retained| {
                let args = args
                    .into_iter()
                    .map(|arg| to_call_arg(arg, retained, &sender))
                    .collect();

                let outcome = dispatcher.borrow_mut().dispatch(name, args);
                match outcome {
                    Dispatch::Handled(Some(value)) => to_js_value(value),
                    Dispatch::Handled(None) | Dispatch::Unhandled => JsValue::Undefined,
                }
            })?;
        }

        let timers = dispatcher.borrow().timers().clone();
        runtime.register_function(DEFER, 2, move |args, retained| {
            defer(args, retained, &timers, &sender);
            JsValue::Undefined
        })?;

        runtime.evaluate_script(BINDING_JS)?;
        runtime.evaluate_script(&error_code_script())?;

        info!("Native binding installed");
        Ok(Self { dispatcher, events })
    }

    /// Code of the most recent native call.
    pub fn last_error(&self) -> ErrorCode {
        self.dispatcher.borrow().last_error()
    }

    /// Wait for the next callback event.
    pub async fn next_event(&mut self) -> Option<CallbackEvent> {
        self.events.recv().await
    }

    /// Act on one event. Returns whether a script function ran.
    pub fn deliver(&self, runtime: &mut JsRuntime, event: CallbackEvent) -> bool {
        let (id, args) = match event {
            CallbackEvent::Fire { id, code } => {
                (id, vec![JsValue::Number(code.as_i32() as f64)])
            }
            CallbackEvent::Run { id } => (id, Vec::new()),
            CallbackEvent::Release { id } => {
                runtime.retained().take(id);
                return false;
            }
        };

        // Taken before the call: the function may retain new callbacks
        // while it runs.
        let Some(function) = runtime.retained().take(id) else {
            trace!(id, "Callback already released");
            return false;
        };

        debug!(id, ?event, "Running script callback");
        if let Err(err) = runtime.call_function(&function, &args) {
            warn!(id, %err, "Script callback failed");
        }
        true
    }

    /// Run every callback that is ready. Returns how many ran.
    pub fn run_pending_callbacks(&mut self, runtime: &mut JsRuntime) -> usize {
        let mut ran = 0;
        while let Ok(event) = self.events.try_recv() {
            if self.deliver(runtime, event) {
                ran += 1;
            }
        }
        ran
    }
}

/// `__appshellDefer(fn, delayMs)`: run `fn` from the event loop after the
/// delay.
fn defer(
    args: Vec<JsValue>,
    retained: &RetainedFunctions,
    timers: &Timers,
    events: &UnboundedSender<CallbackEvent>,
) {
    let mut args = args.into_iter();
    let Some(JsValue::Function(function)) = args.next() else {
        warn!("Deferred call without a function");
        return;
    };
    let delay = match args.next() {
        Some(JsValue::Number(ms)) if ms.is_finite() && ms > 0.0 => {
            Duration::from_millis(ms as u64)
        }
        _ => Duration::ZERO,
    };

    let id = retained.retain(function);
    let events = events.clone();
    trace!(id, ?delay, "Deferring script function");
    timers.schedule(delay, move |_| {
        let _ = events.send(CallbackEvent::Run { id });
    });
}

/// `appshell.fs.NO_ERROR`, `appshell.fs.ERR_*` from [`ErrorCode`].
fn error_code_script() -> String {
    ErrorCode::ALL
        .iter()
        .map(|code| {
            format!(
                "appshell.fs.{} = {};\n",
                code.script_name(),
                code.as_i32()
            )
        })
        .collect()
}

fn to_call_arg(
    value: JsValue,
    retained: &RetainedFunctions,
    events: &UnboundedSender<CallbackEvent>,
) -> CallArg {
    match value {
        JsValue::Undefined => CallArg::Undefined,
        JsValue::Null => CallArg::Null,
        JsValue::Boolean(value) => CallArg::Bool(value),
        JsValue::Number(value) => number_arg(value),
        JsValue::String(value) => CallArg::String(value),
        JsValue::Object | JsValue::Array => CallArg::Object,
        JsValue::Function(function) => {
            let handle = CallbackHandle {
                id: retained.retain(function),
                events: events.clone(),
            };
            CallArg::Function(ScriptCallback::new(move |code| handle.fire(code)))
        }
    }
}

/// Script numbers that hold a 32-bit integer count as integers.
fn number_arg(value: f64) -> CallArg {
    if value.fract() == 0.0 && value >= i32::MIN as f64 && value <= i32::MAX as f64 {
        CallArg::Int(value as i32)
    } else {
        CallArg::Number(value)
    }
}

fn to_js_value(value: CallValue) -> JsValue {
    match value {
        CallValue::String(value) => JsValue::String(value),
        CallValue::Bool(value) => JsValue::Boolean(value),
        CallValue::Int(value) => JsValue::Number(value as f64),
        CallValue::Number(value) => JsValue::Number(value),
        CallValue::Timestamp(time) => JsValue::Number(epoch_millis(time)),
    }
}

/// Milliseconds since the Unix epoch, negative before it.
fn epoch_millis(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_millis() as f64,
        Err(before) => -(before.duration().as_millis() as f64),
    }
}
