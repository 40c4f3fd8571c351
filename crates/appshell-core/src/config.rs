//! Shell configuration

use crate::{ShellError, ShellResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shell configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// External viewer used for live preview
    pub viewer: ViewerConfig,

    /// Timing of the "close external viewer" operation
    pub close: CloseConfig,

    /// Script binding behavior
    pub bridge: BridgeConfig,

    /// Log output
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Executable launched (and later recognized) as the external viewer
    pub executable: PathBuf,

    /// Port passed as `--remote-debugging-port` when debugging is requested
    pub remote_debugging_port: u16,

    /// Extra arguments added when debugging is requested
    pub debug_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloseConfig {
    /// Poll period while waiting for viewer processes to exit
    pub heartbeat_interval_ms: u64,

    /// Give up waiting after this long
    pub timeout_ms: u64,

    /// Timeout used when no viewer process was running at all
    pub immediate_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Render backslashes as forward slashes in JSON results, as older
    /// script consumers expect
    pub legacy_json_escaping: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when no filter is given
    pub level: String,

    /// One of "pretty", "compact", "json"
    pub format: String,

    /// Filter directives (e.g. "appshell_bridge=debug"); overrides `level`
    pub filter: Option<String>,

    /// Level for the script application's console output
    pub script_level: Option<String>,
}

impl ShellConfig {
    /// Default location: `<config dir>/appshell/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("appshell").join("config.json"))
    }

    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> ShellResult<Self> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config: ShellConfig = serde_json::from_str(&text).map_err(|e| {
            ShellError::config(format!("{}: {}", path.display(), e))
        })?;

        config.validate()?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from `path` if given, else from the default location.
    pub fn load_or_default(path: Option<&Path>) -> ShellResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) => Self::load(&path),
                None => Ok(Self::default()),
            },
        }
    }

    fn validate(&self) -> ShellResult<()> {
        if self.close.heartbeat_interval_ms == 0 {
            return Err(ShellError::config("close.heartbeat_interval_ms must be > 0"));
        }
        if self.close.timeout_ms < self.close.immediate_timeout_ms {
            return Err(ShellError::config(
                "close.timeout_ms must not be shorter than close.immediate_timeout_ms",
            ));
        }
        match self.logging.format.as_str() {
            "pretty" | "compact" | "json" => Ok(()),
            other => Err(ShellError::config(format!(
                "logging.format: unknown format '{}'",
                other
            ))),
        }
    }
}

impl CloseConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn immediate_timeout(&self) -> Duration {
        Duration::from_millis(self.immediate_timeout_ms)
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            executable: default_viewer_executable(),
            remote_debugging_port: 9222,
            debug_args: vec!["--allow-file-access-from-files".to_string()],
        }
    }
}

impl Default for CloseConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 30,
            timeout_ms: 3 * 60 * 1000, // 3 minutes
            immediate_timeout_ms: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            filter: None,
            script_level: None,
        }
    }
}

/// Chrome's per-platform install location
fn default_viewer_executable() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Google")
            .join("Chrome")
            .join("Application")
            .join("chrome.exe")
    } else if cfg!(target_os = "macos") {
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome")
    } else {
        PathBuf::from("/usr/bin/google-chrome")
    }
}
