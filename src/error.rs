/// Unified error handling for the pool and cache layer
///
/// Relational-side errors propagate to business operations. Cache-side failures
/// are folded into `CacheLookup` / `CacheWrite` outcomes by the accessor and never
/// reach callers as errors.

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::core::BackendKind;

/// Main error type for pool and cache operations
#[derive(Debug, Error)]
pub enum PoolError {
    /// Configuration could not be loaded; the process cannot start
    #[error("Configuration load failed: {0}")]
    ConfigLoadFailed(#[from] ConfigError),

    /// A new physical connection could not be opened
    #[error("Failed to create {kind} connection: {message}")]
    ConnectionCreateFailed { kind: BackendKind, message: String },

    /// No connection became available before the wait deadline
    #[error("{kind} pool exhausted after waiting {waited:?}")]
    PoolExhausted { kind: BackendKind, waited: Duration },

    /// Caller supplied an unusable argument
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Cache store protocol or command errors
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    /// Relational store driver errors
    #[error("Relational store error: {0}")]
    Relational(#[from] sqlx::Error),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] io::Error),

    /// Timeout errors
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Redis-specific errors
#[derive(Debug, Error)]
pub enum RedisError {
    #[error("RESP protocol error: {message}")]
    ProtocolError { message: String },

    #[error("Redis command error: {command} - {message}")]
    CommandError { command: String, message: String },

    #[error("Connection closed by server")]
    ConnectionClosed,
}

/// Result type alias for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

impl PoolError {
    /// Create a connection creation error
    pub fn create_failed<S: Into<String>>(kind: BackendKind, message: S) -> Self {
        PoolError::ConnectionCreateFailed {
            kind,
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        PoolError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        PoolError::Timeout {
            operation: operation.into(),
        }
    }

    /// Check if this error is transient (a later attempt may succeed)
    pub fn is_recoverable(&self) -> bool {
        match self {
            PoolError::ConnectionCreateFailed { .. } => true,
            PoolError::PoolExhausted { .. } => true,
            PoolError::Network(_) => true,
            PoolError::Timeout { .. } => true,
            PoolError::Redis(RedisError::ConnectionClosed) => true,
            _ => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PoolError::ConfigLoadFailed(_) => ErrorSeverity::Critical,
            PoolError::InvalidArgument { .. } => ErrorSeverity::Error,
            PoolError::PoolExhausted { .. } => ErrorSeverity::Warning,
            PoolError::ConnectionCreateFailed { .. } => ErrorSeverity::Warning,
            PoolError::Network(_) => ErrorSeverity::Warning,
            PoolError::Timeout { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that require immediate attention
    Critical,
    /// Errors that affect functionality but don't crash the system
    Error,
    /// Warnings about potential issues
    Warning,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
        }
    }
}

impl RedisError {
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        RedisError::ProtocolError {
            message: message.into(),
        }
    }

    pub fn command<C: Into<String>, M: Into<String>>(command: C, message: M) -> Self {
        RedisError::CommandError {
            command: command.into(),
            message: message.into(),
        }
    }
}
