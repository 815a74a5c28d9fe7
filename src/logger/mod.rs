//! Logger module
//!
//! Provides logging for the adapter:
//! - Invocation lifecycle and handler failure logging
//! - Access logging with multiple formats
//! - File-based logging support
//!
//! Everything goes to stderr or log files; stdout is reserved for the
//! response envelope.

mod format;
pub mod writer;

pub use format::InvocationLogEntry;

use std::fmt;
use std::str::FromStr;

use crate::config::LoggingConfig;

/// Log verbosity, ordered from least to most verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" | "trace" => Ok(Self::Debug),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// Initialize the logger with configuration
///
/// Should be called once per process. An unknown level falls back to
/// `info` with a warning.
pub fn init(config: &LoggingConfig) -> std::io::Result<()> {
    let level = config.level.parse().unwrap_or_else(|e: String| {
        eprintln!("[WARN] {e}, using info");
        Level::Info
    });
    writer::init(
        level,
        config.access_log_file.as_deref(),
        config.error_log_file.as_deref(),
    )
}

fn write(level: Level, message: &str) {
    match writer::get() {
        Some(w) => w.write(level, message),
        None => eprintln!("{message}"),
    }
}

pub fn log_error(message: &str) {
    write(Level::Error, &format!("[ERROR] {message}"));
}

pub fn log_warning(message: &str) {
    write(Level::Warn, &format!("[WARN] {message}"));
}

pub fn log_debug(message: &str) {
    write(Level::Debug, &format!("[DEBUG] {message}"));
}

pub fn log_invocation_start(method: &str, path: &str) {
    write(Level::Info, &format!("[Invocation] {method} {path}"));
}

pub fn log_request_error(err: &impl fmt::Display) {
    log_error(&format!("Failed to build request: {err}"));
}

pub fn log_handler_error(trace: &str) {
    log_error(&format!("Handler failed:\n{trace}"));
}

pub fn log_output_error(err: &std::io::Error) {
    log_error(&format!("Failed to write response: {err}"));
}

/// Log formatted access log entry
pub fn log_access(entry: &InvocationLogEntry, format: &str) {
    let line = entry.format(format);
    match writer::get() {
        Some(w) => w.write_access(&line),
        None => eprintln!("{line}"),
    }
}
