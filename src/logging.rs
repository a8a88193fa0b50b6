//! Log sinks handed to each pipeline stage
//!
//! Stages never reach for a process-wide logger. They receive a `&dyn LogSink`
//! whose minimum severity is fixed when the sink is built, so a GUI shell can
//! collect messages, the CLI can route them to `env_logger`, and tests can
//! assert on captured output.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Message severity, lowest first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Destination for pipeline log messages
pub trait LogSink {
    /// Messages below this severity are dropped
    fn min_level(&self) -> LogLevel;

    /// Deliver a message that already passed the severity filter
    fn write(&self, level: LogLevel, message: &str);

    fn log(&self, level: LogLevel, message: &str) {
        if level >= self.min_level() {
            self.write(level, message);
        }
    }

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Forwards to the `log` facade
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    min_level: LogLevel,
}

impl ConsoleSink {
    pub fn new(min_level: LogLevel) -> Self {
        Self { min_level }
    }
}

impl LogSink for ConsoleSink {
    fn min_level(&self) -> LogLevel {
        self.min_level
    }

    fn write(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => log::debug!("{}", message),
            LogLevel::Info => log::info!("{}", message),
            LogLevel::Warning => log::warn!("{}", message),
            LogLevel::Error => log::error!("{}", message),
        }
    }
}

/// Keeps formatted lines in memory: `[2024-01-01 12:00:00] WARNING | message`
#[derive(Debug)]
pub struct MemorySink {
    min_level: LogLevel,
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new(min_level: LogLevel) -> Self {
        Self {
            min_level,
            lines: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of everything captured so far
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// True if any captured line at `level` contains `needle`
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        let tag = format!("] {} | ", level.name());
        self.lines()
            .iter()
            .any(|line| line.contains(&tag) && line.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn min_level(&self) -> LogLevel {
        self.min_level
    }

    fn write(&self, level: LogLevel, message: &str) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{}] {} | {}", timestamp, level.name(), message);
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn min_level(&self) -> LogLevel {
        LogLevel::Error
    }

    fn write(&self, _level: LogLevel, _message: &str) {}
}

impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    fn min_level(&self) -> LogLevel {
        (**self).min_level()
    }

    fn write(&self, level: LogLevel, message: &str) {
        (**self).write(level, message)
    }
}
