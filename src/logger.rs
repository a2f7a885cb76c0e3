//! Logging collaborator.
//!
//! The connection does not talk to a process-wide logger; it is handed a
//! [`Logger`] sink at construction time. [`DefaultLogger`] forwards records
//! to the `log` crate facade.

use std::sync::Arc;

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    /// A NoticeResponse forwarded from the server.
    Notice,
    Warning,
}

/// One structured log record emitted by the connection.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Sink for records emitted by a connection.
pub trait Logger: Send + Sync {
    fn log(&self, record: &LogRecord);
}

/// Forwards records to the `log` crate facade.
#[derive(Debug, Default)]
pub struct DefaultLogger;

impl Logger for DefaultLogger {
    fn log(&self, record: &LogRecord) {
        match record.level {
            LogLevel::Debug => log::debug!("{}", record.message),
            LogLevel::Info => log::info!("{}", record.message),
            LogLevel::Notice => log::info!(target: "pgline::notice", "{}", record.message),
            LogLevel::Warning => log::warn!("{}", record.message),
        }
    }
}

pub(crate) fn default_logger() -> Arc<dyn Logger> {
    Arc::new(DefaultLogger)
}
