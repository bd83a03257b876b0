//! Error types for relay operations
//!
//! Errors returned here are synchronous call-site results. Failures on the
//! processing path stay inside the session worker and never surface here.

use crate::session::SessionId;

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Error type for relay operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// No session is registered under this id
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    /// Session has been stopped and no longer accepts chunks
    #[error("Session not active: {0}")]
    Inactive(SessionId),

    /// Ingest buffer is saturated; the producer may retry or drop
    #[error("Ingest buffer full: {0}")]
    BufferFull(SessionId),

    /// Producer submitted a zero-length chunk
    #[error("Empty chunk rejected: {0}")]
    EmptyChunk(SessionId),

    /// Session id space is exhausted; nothing was registered
    #[error("No session id available")]
    IdExhausted,
}

impl RelayError {
    /// Whether the caller may reasonably retry the same operation later
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayError::BufferFull(_) | RelayError::IdExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        let id = SessionId::from_raw(7);

        assert!(RelayError::BufferFull(id).is_retryable());
        assert!(RelayError::IdExhausted.is_retryable());
        assert!(!RelayError::NotFound(id).is_retryable());
        assert!(!RelayError::Inactive(id).is_retryable());
        assert!(!RelayError::EmptyChunk(id).is_retryable());
    }

    #[test]
    fn test_display() {
        let id = SessionId::from_raw(3);

        assert_eq!(
            RelayError::NotFound(id).to_string(),
            "Session not found: session-3"
        );
        assert_eq!(
            RelayError::BufferFull(id).to_string(),
            "Ingest buffer full: session-3"
        );
    }
}
