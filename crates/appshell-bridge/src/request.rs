//! Script calls and their validation into typed requests.
//!
//! A call arrives as a name plus positional [`CallArg`]s. [`ShellRequest::parse`]
//! checks arity and argument types once, so handlers only ever see a
//! well-formed [`ShellRequest`].

use crate::services::dialog::OpenDialogOptions;
use appshell_core::ErrorCode;
use std::fmt;
use std::time::SystemTime;
use thiserror::Error;

/// Name of the zero-argument call returning the last error code.
pub const GET_LAST_ERROR: &str = "GetLastError";

/// A script function handed to native code, to be called once with an
/// [`ErrorCode`] at some later time.
pub struct ScriptCallback(Box<dyn FnOnce(ErrorCode) + Send>);

impl ScriptCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(ErrorCode) + Send + 'static,
    {
        Self(Box::new(callback))
    }

    pub fn invoke(self, code: ErrorCode) {
        (self.0)(code)
    }
}

impl fmt::Debug for ScriptCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScriptCallback")
    }
}

/// One positional argument of a script call.
#[derive(Debug)]
pub enum CallArg {
    String(String),
    Bool(bool),
    Int(i32),
    Number(f64),
    Function(ScriptCallback),
    Null,
    Undefined,
    Object,
}

impl CallArg {
    fn kind(&self) -> &'static str {
        match self {
            CallArg::String(_) => "string",
            CallArg::Bool(_) => "boolean",
            CallArg::Int(_) => "integer",
            CallArg::Number(_) => "number",
            CallArg::Function(_) => "function",
            CallArg::Null => "null",
            CallArg::Undefined => "undefined",
            CallArg::Object => "object",
        }
    }
}

/// Result value of a handled call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallValue {
    String(String),
    Bool(bool),
    Int(i32),
    /// Milliseconds
    Number(f64),
    Timestamp(SystemTime),
}

/// Native operations reachable from script, by call name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    OpenExternalViewer,
    CloseExternalViewer,
    ShowOpenDialog,
    ReadDirectory,
    IsDirectory,
    ReadFile,
    WriteFile,
    SetPermissions,
    GetModificationTime,
    DeleteFileOrDirectory,
    GetElapsedMilliseconds,
    ShowDeveloperTools,
    QuitApplication,
}

impl Command {
    pub const ALL: [Command; 13] = [
        Command::OpenExternalViewer,
        Command::CloseExternalViewer,
        Command::ShowOpenDialog,
        Command::ReadDirectory,
        Command::IsDirectory,
        Command::ReadFile,
        Command::WriteFile,
        Command::SetPermissions,
        Command::GetModificationTime,
        Command::DeleteFileOrDirectory,
        Command::GetElapsedMilliseconds,
        Command::ShowDeveloperTools,
        Command::QuitApplication,
    ];

    /// Name the call is registered under in script.
    pub fn name(self) -> &'static str {
        match self {
            Command::OpenExternalViewer => "OpenExternalViewer",
            Command::CloseExternalViewer => "CloseExternalViewer",
            Command::ShowOpenDialog => "ShowOpenDialog",
            Command::ReadDirectory => "ReadDirectory",
            Command::IsDirectory => "IsDirectory",
            Command::ReadFile => "ReadFile",
            Command::WriteFile => "WriteFile",
            Command::SetPermissions => "SetPermissions",
            Command::GetModificationTime => "GetModificationTime",
            Command::DeleteFileOrDirectory => "DeleteFileOrDirectory",
            Command::GetElapsedMilliseconds => "GetElapsedMilliseconds",
            Command::ShowDeveloperTools => "ShowDeveloperTools",
            Command::QuitApplication => "QuitApplication",
        }
    }

    /// Exact, case-sensitive lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|command| command.name() == name)
    }
}

/// A call whose arguments failed validation.
#[derive(Debug, Error)]
#[error("{command}: {reason}")]
pub struct InvalidArgs {
    pub command: &'static str,
    pub reason: String,
}

/// A validated script call.
#[derive(Debug)]
pub enum ShellRequest {
    OpenExternalViewer {
        url: String,
        enable_debug_port: bool,
    },
    CloseExternalViewer {
        callback: Option<ScriptCallback>,
    },
    ShowOpenDialog(OpenDialogOptions),
    ReadDirectory {
        path: String,
    },
    IsDirectory {
        path: String,
    },
    ReadFile {
        path: String,
        encoding: String,
    },
    WriteFile {
        path: String,
        data: String,
        encoding: String,
    },
    SetPermissions {
        path: String,
        mode: i32,
    },
    GetModificationTime {
        path: String,
    },
    DeleteFileOrDirectory {
        path: String,
    },
    GetElapsedMilliseconds,
    ShowDeveloperTools,
    QuitApplication,
}

impl ShellRequest {
    /// Validate a call.
    ///
    /// Returns `None` when `name` is not a known command.
    pub fn parse(name: &str, args: Vec<CallArg>) -> Option<Result<Self, InvalidArgs>> {
        let command = Command::from_name(name)?;
        Some(Self::parse_command(command, ArgReader::new(command, args)))
    }

    fn parse_command(command: Command, mut args: ArgReader) -> Result<Self, InvalidArgs> {
        let request = match command {
            Command::OpenExternalViewer => ShellRequest::OpenExternalViewer {
                url: args.string()?,
                enable_debug_port: args.bool()?,
            },
            Command::CloseExternalViewer => ShellRequest::CloseExternalViewer {
                callback: args.optional_function()?,
            },
            Command::ShowOpenDialog => ShellRequest::ShowOpenDialog(OpenDialogOptions {
                allow_multiple: args.bool()?,
                choose_directory: args.bool()?,
                title: args.string()?,
                initial_path: args.string()?,
                file_types: args.string()?,
            }),
            Command::ReadDirectory => ShellRequest::ReadDirectory {
                path: args.string()?,
            },
            Command::IsDirectory => ShellRequest::IsDirectory {
                path: args.string()?,
            },
            Command::ReadFile => ShellRequest::ReadFile {
                path: args.string()?,
                encoding: args.string()?,
            },
            Command::WriteFile => ShellRequest::WriteFile {
                path: args.string()?,
                data: args.string()?,
                encoding: args.string()?,
            },
            Command::SetPermissions => ShellRequest::SetPermissions {
                path: args.string()?,
                mode: args.int()?,
            },
            Command::GetModificationTime => ShellRequest::GetModificationTime {
                path: args.string()?,
            },
            Command::DeleteFileOrDirectory => ShellRequest::DeleteFileOrDirectory {
                path: args.string()?,
            },
            Command::GetElapsedMilliseconds => ShellRequest::GetElapsedMilliseconds,
            Command::ShowDeveloperTools => ShellRequest::ShowDeveloperTools,
            Command::QuitApplication => ShellRequest::QuitApplication,
        };

        args.finish()?;
        Ok(request)
    }
}

/// Positional reader over call arguments.
struct ArgReader {
    command: Command,
    args: std::vec::IntoIter<CallArg>,
    position: usize,
}

impl ArgReader {
    fn new(command: Command, args: Vec<CallArg>) -> Self {
        Self {
            command,
            args: args.into_iter(),
            position: 0,
        }
    }

    fn invalid(&self, reason: String) -> InvalidArgs {
        InvalidArgs {
            command: self.command.name(),
            reason,
        }
    }

    fn next(&mut self, expected: &str) -> Result<CallArg, InvalidArgs> {
        let position = self.position;
        self.position += 1;
        self.args.next().ok_or_else(|| {
            self.invalid(format!("missing argument {} ({})", position, expected))
        })
    }

    fn mismatch(&self, expected: &str, found: &CallArg) -> InvalidArgs {
        self.invalid(format!(
            "argument {}: expected {}, found {}",
            self.position - 1,
            expected,
            found.kind()
        ))
    }

    fn string(&mut self) -> Result<String, InvalidArgs> {
        match self.next("string")? {
            CallArg::String(value) => Ok(value),
            other => Err(self.mismatch("string", &other)),
        }
    }

    fn bool(&mut self) -> Result<bool, InvalidArgs> {
        match self.next("boolean")? {
            CallArg::Bool(value) => Ok(value),
            other => Err(self.mismatch("boolean", &other)),
        }
    }

    fn int(&mut self) -> Result<i32, InvalidArgs> {
        match self.next("integer")? {
            CallArg::Int(value) => Ok(value),
            other => Err(self.mismatch("integer", &other)),
        }
    }

    /// A trailing function argument that may be omitted entirely. When
    /// present it must be a function.
    fn optional_function(&mut self) -> Result<Option<ScriptCallback>, InvalidArgs> {
        match self.args.next() {
            None => Ok(None),
            Some(arg) => {
                self.position += 1;
                match arg {
                    CallArg::Function(callback) => Ok(Some(callback)),
                    other => Err(self.mismatch("function", &other)),
                }
            }
        }
    }

    fn finish(mut self) -> Result<(), InvalidArgs> {
        let extra = self.args.len();
        match self.args.next() {
            None => Ok(()),
            Some(_) => Err(self.invalid(format!("{} unexpected trailing argument(s)", extra))),
        }
    }
}
