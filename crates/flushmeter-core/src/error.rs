//! Shared error types across flushmeter crates.

use thiserror::Error;

/// Shared result type.
pub type Result<T> = std::result::Result<T, FlushError>;

/// Why an observation was refused at admission.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("metric name is empty")]
    Empty,
    #[error("metric name is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("disallowed character {ch:?} at byte {at}")]
    InvalidChar { ch: char, at: usize },
    #[error("empty segment at byte {at}")]
    EmptySegment { at: usize },
    #[error("metric name uses reserved prefix {0:?}")]
    ReservedPrefix(String),
    #[error("sample value is not finite")]
    NonFinite,
    #[error("negative value {0} for a monotonic metric")]
    Negative(f64),
}

impl Rejection {
    /// Stable code used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::Empty => "EMPTY",
            Rejection::TooLong { .. } => "TOO_LONG",
            Rejection::InvalidChar { .. } => "INVALID_CHAR",
            Rejection::EmptySegment { .. } => "EMPTY_SEGMENT",
            Rejection::ReservedPrefix(_) => "RESERVED_PREFIX",
            Rejection::NonFinite => "NON_FINITE",
            Rejection::Negative(_) => "NEGATIVE",
        }
    }
}

/// Retry classification of a failed submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Worth retrying (timeouts, 5xx, connection resets).
    Transient,
    /// Retrying cannot help (bad credentials, rejected payload).
    Fatal,
}

/// Failure reported by a transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?} transport failure: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { kind: TransportErrorKind::Transient, message: message.into() }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self { kind: TransportErrorKind::Fatal, message: message.into() }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == TransportErrorKind::Transient
    }
}

/// Unified error type used by core and agent.
#[derive(Debug, Error)]
pub enum FlushError {
    #[error("config: {0}")]
    Config(String),
    #[error("no tokio runtime available to run the worker")]
    NoRuntime,
    #[error("internal: {0}")]
    Internal(String),
}

impl FlushError {
    /// Stable code for logs and diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            FlushError::Config(_) => "CONFIG",
            FlushError::NoRuntime => "NO_RUNTIME",
            FlushError::Internal(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_error_codes_are_stable() {
        assert_eq!(FlushError::Config("x".into()).code(), "CONFIG");
        assert_eq!(FlushError::NoRuntime.code(), "NO_RUNTIME");
        assert_eq!(FlushError::Internal("x".into()).code(), "INTERNAL");
    }

    #[test]
    fn transport_error_kinds() {
        assert!(TransportError::transient("503").is_transient());
        assert!(!TransportError::fatal("401").is_transient());
    }
}
