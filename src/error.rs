/// Unified error handling for the loadguard crate
///
/// This module provides the error type system covering all error scenarios
/// in the guard: configuration errors, engine probing errors, cache errors,
/// and the expected overload signal raised by the guard protocol.

use crate::config::ConfigError;
use crate::core::ConnectionError;
use std::fmt;
use thiserror::Error;

/// Main error type for loadguard operations
#[derive(Debug, Error)]
pub enum GuardError {
    /// Configuration errors, surfaced at the validation boundary
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Engine name matched none of the known probes
    #[error("Unsupported database engine: {engine}")]
    UnsupportedEngine { engine: String },

    /// Errors while determining an engine version or running the
    /// session-count query
    #[error("Probe failed: {message}")]
    Probe { message: String },

    /// Errors from the cache read/write path
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// The session-count query exceeded its timeout
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// The guarded database is over its load threshold
    #[error("Database is overloaded ({load_pct}%)")]
    Overloaded { load_pct: u32 },
}

/// Result type alias for loadguard operations
pub type GuardResult<T> = Result<T, GuardError>;

/// Convenience methods for creating specific error types
impl GuardError {
    /// Create an unsupported-engine error
    pub fn unsupported_engine<S: Into<String>>(engine: S) -> Self {
        GuardError::UnsupportedEngine {
            engine: engine.into(),
        }
    }

    /// Create a probe error
    pub fn probe<S: Into<String>>(message: S) -> Self {
        GuardError::Probe {
            message: message.into(),
        }
    }

    /// Create a cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        GuardError::Cache {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        GuardError::Timeout {
            operation: operation.into(),
        }
    }

    /// Create an overloaded error from a raw load fraction
    ///
    /// The load is rounded to the nearest whole percent for the message.
    pub fn overloaded(load: f64) -> Self {
        GuardError::Overloaded {
            load_pct: (load * 100.0).round() as u32,
        }
    }

    /// Check if this error is recoverable (absorbed by a fallback or retried
    /// on the next cache-expiry cycle)
    pub fn is_recoverable(&self) -> bool {
        match self {
            GuardError::Probe { .. } => true,
            GuardError::Cache { .. } => true,
            GuardError::Timeout { .. } => true,
            GuardError::Overloaded { .. } => true,
            _ => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            GuardError::Config(_) => ErrorSeverity::Critical,
            GuardError::UnsupportedEngine { .. } => ErrorSeverity::Critical,
            GuardError::Probe { .. } => ErrorSeverity::Warning,
            GuardError::Cache { .. } => ErrorSeverity::Warning,
            GuardError::Timeout { .. } => ErrorSeverity::Warning,
            GuardError::Overloaded { .. } => ErrorSeverity::Info,
        }
    }
}

impl From<ConnectionError> for GuardError {
    fn from(err: ConnectionError) -> Self {
        GuardError::probe(err.to_string())
    }
}

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that require operator attention
    Critical,
    /// Warnings about absorbed failures
    Warning,
    /// Informational, expected control-flow signals
    Info,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Info => write!(f, "INFO"),
        }
    }
}
