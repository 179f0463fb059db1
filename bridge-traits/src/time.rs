//! Time and Logging Abstractions
//!
//! Provides an injectable time source and logging sink for testing and host
//! integration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Time source trait
///
/// Abstracts system time so the rate limiter, backpressure monitor, and
/// ledger timestamps are deterministic under test.
pub trait Clock: Send + Sync {
    /// Get current UTC time
    fn now(&self) -> DateTime<Utc>;

    /// Get current Unix timestamp in seconds
    fn unix_timestamp(&self) -> i64 {
        self.now().timestamp()
    }

    /// Get current Unix timestamp in milliseconds
    fn unix_timestamp_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// System clock implementation using actual system time
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured log entry forwarded to a [`LoggerSink`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Target module/component
    pub target: String,
    pub message: String,
    /// Structured fields emitted on the event
    pub fields: HashMap<String, String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: HashMap::new(),
        }
    }
}

/// Host logging sink.
///
/// When configured, every tracing event that survives filtering is mirrored
/// to the sink while still flowing through the standard subscriber layers.
/// This replaces any process-global logger: components receive the sink at
/// construction time.
pub trait LoggerSink: Send + Sync {
    fn log(&self, entry: LogEntry);
}

/// Sink that writes entries to stderr. Useful default for tools and tests.
#[derive(Debug, Clone, Default)]
pub struct ConsoleLogger;

impl LoggerSink for ConsoleLogger {
    fn log(&self, entry: LogEntry) {
        eprintln!(
            "[{:?}] {} {}: {}",
            entry.level,
            entry.timestamp.to_rfc3339(),
            entry.target,
            entry.message
        );
    }
}
