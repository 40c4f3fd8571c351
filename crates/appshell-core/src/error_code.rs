//! Error codes reported to script across the native binding.
//!
//! The numeric values are part of the script-facing contract and are
//! mirrored as `appshell.fs.ERR_*` constants by the binding script.

use std::fmt;
use std::io;

/// Result code of a native call, as seen by script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ErrorCode {
    #[default]
    None = 0,
    Unknown = 1,
    InvalidParams = 2,
    NotFound = 3,
    CantRead = 4,
    UnsupportedEncoding = 5,
    CantWrite = 6,
    OutOfSpace = 7,
    NotFile = 8,
    NotDirectory = 9,
}

/// Direction of the failing operation; "access denied" is reported as
/// [`ErrorCode::CantRead`] or [`ErrorCode::CantWrite`] depending on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

// Win32 file-system error codes (WinError.h).
const ERROR_SUCCESS: u32 = 0;
const ERROR_FILE_NOT_FOUND: u32 = 2;
const ERROR_PATH_NOT_FOUND: u32 = 3;
const ERROR_ACCESS_DENIED: u32 = 5;
const ERROR_WRITE_PROTECT: u32 = 19;
const ERROR_HANDLE_DISK_FULL: u32 = 39;
const ERROR_DISK_FULL: u32 = 112;
const ERROR_DIRECTORY: u32 = 267;

// errno values shared by POSIX systems and the Windows CRT.
const EPERM: i32 = 1;
const ENOENT: i32 = 2;
const EACCES: i32 = 13;
const ENOTDIR: i32 = 20;
const EISDIR: i32 = 21;
const EINVAL: i32 = 22;
const ENOSPC: i32 = 28;
const EROFS: i32 = 30;

impl ErrorCode {
    /// Every code, in numeric order.
    pub const ALL: [ErrorCode; 10] = [
        ErrorCode::None,
        ErrorCode::Unknown,
        ErrorCode::InvalidParams,
        ErrorCode::NotFound,
        ErrorCode::CantRead,
        ErrorCode::UnsupportedEncoding,
        ErrorCode::CantWrite,
        ErrorCode::OutOfSpace,
        ErrorCode::NotFile,
        ErrorCode::NotDirectory,
    ];

    /// Numeric value handed to script.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Inverse of [`ErrorCode::as_i32`].
    pub fn from_i32(value: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|code| code.as_i32() == value)
    }

    /// Constant name used by the binding script (`NO_ERROR`, `ERR_NOT_FOUND`, ...).
    pub fn script_name(self) -> &'static str {
        match self {
            ErrorCode::None => "NO_ERROR",
            ErrorCode::Unknown => "ERR_UNKNOWN",
            ErrorCode::InvalidParams => "ERR_INVALID_PARAMS",
            ErrorCode::NotFound => "ERR_NOT_FOUND",
            ErrorCode::CantRead => "ERR_CANT_READ",
            ErrorCode::UnsupportedEncoding => "ERR_UNSUPPORTED_ENCODING",
            ErrorCode::CantWrite => "ERR_CANT_WRITE",
            ErrorCode::OutOfSpace => "ERR_OUT_OF_SPACE",
            ErrorCode::NotFile => "ERR_NOT_FILE",
            ErrorCode::NotDirectory => "ERR_NOT_DIRECTORY",
        }
    }

    /// Map a Win32 file-system error (`GetLastError()` value).
    pub fn from_win32_error(code: u32, access: Access) -> Self {
        match code {
            ERROR_SUCCESS => ErrorCode::None,
            ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND => ErrorCode::NotFound,
            ERROR_ACCESS_DENIED => access_denied(access),
            ERROR_WRITE_PROTECT => ErrorCode::CantWrite,
            ERROR_HANDLE_DISK_FULL | ERROR_DISK_FULL => ErrorCode::OutOfSpace,
            ERROR_DIRECTORY => ErrorCode::NotDirectory,
            _ => ErrorCode::Unknown,
        }
    }

    /// Map an `errno` value.
    pub fn from_errno(code: i32, access: Access) -> Self {
        match code {
            0 => ErrorCode::None,
            ENOENT => ErrorCode::NotFound,
            EINVAL => ErrorCode::InvalidParams,
            EACCES | EPERM => access_denied(access),
            EROFS => ErrorCode::CantWrite,
            ENOSPC => ErrorCode::OutOfSpace,
            ENOTDIR => ErrorCode::NotDirectory,
            EISDIR => ErrorCode::NotFile,
            _ => ErrorCode::Unknown,
        }
    }

    /// Map an I/O error raised by the standard library.
    ///
    /// Uses the raw OS code with this platform's table when there is one,
    /// and the error kind otherwise.
    pub fn from_io_error(err: &io::Error, access: Access) -> Self {
        if let Some(raw) = err.raw_os_error() {
            return if cfg!(windows) {
                Self::from_win32_error(raw as u32, access)
            } else {
                Self::from_errno(raw, access)
            };
        }

        match err.kind() {
            io::ErrorKind::NotFound => ErrorCode::NotFound,
            io::ErrorKind::PermissionDenied => access_denied(access),
            io::ErrorKind::InvalidInput => ErrorCode::InvalidParams,
            io::ErrorKind::InvalidData => ErrorCode::UnsupportedEncoding,
            _ => ErrorCode::Unknown,
        }
    }
}

fn access_denied(access: Access) -> ErrorCode {
    match access {
        Access::Read => ErrorCode::CantRead,
        Access::Write => ErrorCode::CantWrite,
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.script_name(), self.as_i32())
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.as_i32()
    }
}
