//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or checking wire messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Serializing a message failed.
    #[error("failed to encode {message}: {reason}")]
    Encode {
        /// Message type.
        message: &'static str,
        /// Underlying reason.
        reason: String,
    },

    /// A message body could not be parsed, or held an invalid record.
    #[error("failed to decode {message}: {reason}")]
    Decode {
        /// Message type.
        message: &'static str,
        /// Underlying reason.
        reason: String,
    },

    /// A message parsed but contradicts itself.
    #[error("inconsistent {message}: {reason}")]
    Inconsistent {
        /// Message type.
        message: &'static str,
        /// Underlying reason.
        reason: String,
    },
}
