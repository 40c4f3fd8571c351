//! Error types for AppShell host code
//!
//! These never cross into script. Calls made from script report failures
//! through [`crate::ErrorCode`] instead.

use thiserror::Error;

/// Result type alias for AppShell host operations
pub type ShellResult<T> = Result<T, ShellError>;

/// Main error type for the AppShell host
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new script error
    pub fn script(msg: impl Into<String>) -> Self {
        Self::Script(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ShellError::config("bad port").to_string(),
            "Configuration error: bad port"
        );
        assert_eq!(
            ShellError::script("boom").to_string(),
            "Script error: boom"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ShellError = io.into();
        assert!(matches!(err, ShellError::Io(_)));
    }
}
