//! Logging configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable structured logging
    pub enabled: bool,

    /// Log level filter
    pub level: LogLevel,

    /// Log format
    pub format: LogFormat,

    /// Include span information in logs
    pub with_spans: bool,

    /// Include target in logs
    pub with_target: bool,

    /// Include file/line information
    pub with_file: bool,

    /// Include thread information
    pub with_thread_ids: bool,

    /// Include thread names
    pub with_thread_names: bool,

    /// Include ANSI colors (for console output)
    pub ansi_colors: bool,

    /// Log file path (None for stdout)
    pub file: Option<PathBuf>,

    /// Filter directives (e.g., "taskmesh=debug,tokio=warn")
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            with_spans: true,
            with_target: true,
            with_file: false,
            with_thread_ids: false,
            with_thread_names: false,
            ansi_colors: true,
            file: None,
            filter: None,
        }
    }
}

impl LoggingConfig {
    /// Create a production logging configuration.
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
            format: LogFormat::Json,
            with_spans: true,
            with_target: true,
            with_file: false,
            with_thread_ids: false,
            with_thread_names: false,
            ansi_colors: false,
            file: None,
            filter: Some("taskmesh=info,warn".to_string()),
        }
    }

    /// Create a development logging configuration.
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            with_spans: true,
            with_target: true,
            with_file: true,
            with_thread_ids: false,
            with_thread_names: false,
            ansi_colors: true,
            file: None,
            filter: None,
        }
    }

    /// Set the log level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Set the log format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the filter directive.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }

    /// Convert from verbosity level (0-3+).
    pub fn from_verbosity(verbosity: u8) -> Self {
        match verbosity {
            0 => LogLevel::Warn,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty console output with colors
    Pretty,
    /// Compact single-line output
    Compact,
    /// JSON structured output
    Json,
    /// Full format with all details
    Full,
}
