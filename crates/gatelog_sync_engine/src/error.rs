//! Error types for the sync engine.

use gatelog_storage::StoreError;
use gatelog_sync_protocol::ProtocolError;
use std::fmt;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The gateway answered with something the client cannot use.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Server rejected the request.
    #[error("server error: {0}")]
    ServerError(String),

    /// Local store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,

    /// A sync task died before reporting.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Classification of a failed run, as reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The gateway was unreachable, timed out, or answered non-success.
    Transport,
    /// The gateway refused the credentials.
    Authentication,
    /// The gateway answered with an undecodable or inconsistent message.
    Protocol,
    /// Writing to the local store failed.
    Persistence,
    /// The run itself crashed.
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Transport => "transport",
            FailureKind::Authentication => "authentication",
            FailureKind::Protocol => "protocol",
            FailureKind::Persistence => "persistence",
            FailureKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::ServerError(_) => true,
            SyncError::NotConnected => true,
            _ => false,
        }
    }

    /// Returns the failure class of this error.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            SyncError::Transport { .. }
            | SyncError::ServerError(_)
            | SyncError::Timeout
            | SyncError::NotConnected => FailureKind::Transport,
            SyncError::AuthenticationFailed(_) => FailureKind::Authentication,
            SyncError::Protocol(_) => FailureKind::Protocol,
            SyncError::Store(_) => FailureKind::Persistence,
            SyncError::Internal(_) => FailureKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::ServerError("internal error".into()).is_retryable());
        assert!(!SyncError::AuthenticationFailed("expired".into()).is_retryable());
        assert!(!SyncError::Store(StoreError::Locked).is_retryable());
    }

    #[test]
    fn failure_kinds() {
        assert_eq!(SyncError::Timeout.failure_kind(), FailureKind::Transport);
        assert_eq!(
            SyncError::AuthenticationFailed("x".into()).failure_kind(),
            FailureKind::Authentication
        );
        assert_eq!(
            SyncError::Store(StoreError::other("disk full")).failure_kind(),
            FailureKind::Persistence
        );
        let protocol = ProtocolError::Inconsistent {
            message: "pull response",
            reason: "short".into(),
        };
        assert_eq!(
            SyncError::from(protocol).failure_kind(),
            FailureKind::Protocol
        );
    }

    #[test]
    fn error_display() {
        let err = SyncError::NotConnected;
        assert_eq!(err.to_string(), "not connected to server");
        assert_eq!(FailureKind::Persistence.to_string(), "persistence");
    }
}
