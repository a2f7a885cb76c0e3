//! Error types for pgline.

use thiserror::Error;

/// Result type for pgline operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Parsed fields of an ErrorResponse or NoticeResponse message.
///
/// Field meanings follow the PostgreSQL error and notice message fields
/// documentation; every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerError {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG
    pub severity: Option<String>,
    /// Non-localized severity (never translated)
    pub severity_non_localized: Option<String>,
    /// SQLSTATE error code (5 characters)
    pub code: Option<String>,
    /// Primary error message
    pub message: Option<String>,
    /// Detailed error explanation
    pub detail: Option<String>,
    /// Suggestion for fixing the error
    pub hint: Option<String>,
    /// Cursor position in the query string (1-based)
    pub position: Option<u32>,
    /// Position in an internally generated query
    pub internal_position: Option<u32>,
    /// Failed internal command text
    pub internal_query: Option<String>,
    /// Context in which the error occurred
    pub where_: Option<String>,
    /// Schema name
    pub schema: Option<String>,
    /// Table name
    pub table: Option<String>,
    /// Column name
    pub column: Option<String>,
    /// Data type name
    pub data_type: Option<String>,
    /// Constraint name
    pub constraint: Option<String>,
    /// Source file name
    pub file: Option<String>,
    /// Source line number
    pub line: Option<u32>,
    /// Source routine name
    pub routine: Option<String>,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = &self.message {
            write!(f, "{}", message)?;
        }
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// Error type for pgline.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying transport failure
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// TLS negotiation, handshake or verification failure
    #[error("TLS error: {0}")]
    Ssl(String),

    /// Error response from the server
    #[error("server error: {0}")]
    Server(ServerError),

    /// Malformed frame, unexpected message, out-of-order response
    #[error("protocol error: {0}")]
    Protocol(String),

    /// SCRAM mismatch, unsupported mechanism, bad server signature
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Channel binding policy is `Required` but SCRAM-SHA-256-PLUS is unavailable
    #[error("channel binding required but not available")]
    ChannelBindingRequired,

    /// Operation attempted on a closed or poisoned connection
    #[error("connection is closed")]
    ConnectionClosed,

    /// A column value could not be converted to the requested type
    #[error("cannot convert value {value:?} to {target}: {reason}")]
    ValueConversion {
        /// Target Rust type name
        target: &'static str,
        /// The raw Postgres text that failed to convert
        value: String,
        /// Why the conversion failed
        reason: String,
    },

    /// Non-optional read of a NULL column
    #[error("value is null")]
    ValueIsNull,

    /// Operation on a closed statement, or a statement from another connection
    #[error("statement is closed")]
    StatementClosed,

    /// Operation on a closed cursor
    #[error("cursor is closed")]
    CursorClosed,

    /// More than 65535 bind parameters
    #[error("too many bind parameters: {0} (maximum 65535)")]
    TooManyParameters(usize),

    /// Socket timeout elapsed
    #[error("operation timed out")]
    Timeout,
}

impl Error {
    /// Returns true if the error poisons the connection.
    ///
    /// Transport and protocol failures leave the session out of sync and the
    /// connection must not be reused. Server errors are recoverable unless
    /// FATAL or PANIC.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Socket(_)
            | Error::Ssl(_)
            | Error::Protocol(_)
            | Error::Timeout
            | Error::ConnectionClosed => true,
            Error::Server(fields) => {
                matches!(fields.severity.as_deref(), Some("FATAL") | Some("PANIC"))
            }
            _ => false,
        }
    }

    /// Get the SQLSTATE code if this is a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(fields) => fields.code.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn conversion(
        target: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::ValueConversion {
            target,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl From<native_tls::Error> for Error {
    fn from(err: native_tls::Error) -> Self {
        Error::Ssl(err.to_string())
    }
}
