//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The snapshot on disk is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// Encoding the snapshot failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// The store directory does not exist.
    #[error("store directory does not exist: {0}")]
    Missing(String),
}

impl StoreError {
    /// Wraps an arbitrary failure as an I/O error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Io(io::Error::new(io::ErrorKind::Other, message.into()))
    }
}
