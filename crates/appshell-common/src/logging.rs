//! Log output for the host and the hosted script application.
//!
//! Host crates log through `tracing` (`appshell-core` through `log`, which
//! the subscriber forwards). The script application's `console` output is
//! logged under the [`SCRIPT_TARGET`] target and can be filtered separately
//! from host output.

use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{
    filter::Directive,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer, Registry,
};

/// Target of log records written by script through `console`.
pub const SCRIPT_TARGET: &str = "script";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-readable
    #[default]
    Pretty,
    /// One line per record
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level for everything no directive covers
    pub level: Level,
    pub format: LogFormat,
    /// Print file and line of each record (pretty format only)
    pub show_source: bool,
    /// Log span enter/close
    pub span_events: bool,
    /// `EnvFilter` directives replacing `level` and `RUST_LOG`
    pub filter: Option<String>,
    /// Separate level for script console output
    pub script_level: Option<Level>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            show_source: false,
            span_events: false,
            filter: None,
            script_level: None,
        }
    }
}

impl LogConfig {
    /// Everything at debug, with source locations and span events.
    pub fn debug() -> Self {
        Self {
            level: Level::DEBUG,
            show_source: true,
            span_events: true,
            ..Default::default()
        }
    }

    /// Build from the text settings of the config file. Values that do not
    /// parse fall back to the defaults.
    pub fn from_settings(level: &str, format: &str, filter: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            level: Level::from_str(level).unwrap_or(defaults.level),
            format: format.parse().unwrap_or(defaults.format),
            filter: filter.map(str::to_string),
            ..defaults
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_script_level(mut self, level: Level) -> Self {
        self.script_level = Some(level);
        self
    }

    fn env_filter(&self) -> EnvFilter {
        let base = match &self.filter {
            Some(directives) => EnvFilter::try_new(directives).ok(),
            None => EnvFilter::try_from_default_env().ok(),
        };
        let filter = base.unwrap_or_else(|| EnvFilter::new(self.level.as_str()));

        match self.script_directive() {
            Some(directive) => filter.add_directive(directive),
            None => filter,
        }
    }

    fn script_directive(&self) -> Option<Directive> {
        let level = self.script_level?;
        format!("{}={}", SCRIPT_TARGET, level.as_str()).parse().ok()
    }
}

/// Install the global subscriber.
///
/// Fails when a subscriber is already installed.
pub fn init_logging(config: LogConfig) -> Result<(), TryInitError> {
    let span_events = if config.span_events {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let output: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_file(config.show_source)
            .with_line_number(config.show_source)
            .with_span_events(span_events)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_span_events(span_events)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_span_events(span_events).boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(config.env_filter())
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_config() {
        let config = LogConfig::debug();
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.show_source);
        assert!(config.script_level.is_none());
    }

    #[test]
    fn test_from_settings() {
        let config = LogConfig::from_settings("warn", "json", Some("appshell_bridge=trace"));
        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter.as_deref(), Some("appshell_bridge=trace"));
    }

    #[test]
    fn test_from_settings_falls_back() {
        let config = LogConfig::from_settings("loud", "xml", None);
        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn test_script_level_adds_directive() {
        let config = LogConfig::default()
            .with_filter("appshell_bridge=debug")
            .with_script_level(Level::WARN);

        let directives = config.env_filter().to_string().to_lowercase();
        assert!(directives.contains("appshell_bridge=debug"));
        assert!(directives.contains("script=warn"));
    }

    #[test]
    fn test_no_script_directive_by_default() {
        assert!(LogConfig::default().script_directive().is_none());
    }
}
