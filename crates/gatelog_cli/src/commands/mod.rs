//! CLI command implementations.

pub mod delete;
pub mod inspect;
pub mod log;
pub mod pending;

use gatelog_core::CoreError;
use gatelog_storage::{FileRecordStore, StoreConfig, StoreError};
use std::path::Path;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The store could not be opened, read or written.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The entry failed validation.
    #[error("invalid entry: {0}")]
    Record(#[from] CoreError),

    /// Output could not be serialized.
    #[error("output error: {0}")]
    Json(#[from] serde_json::Error),

    /// The argument is not a record id.
    #[error("not a record id: {0}")]
    InvalidId(String),

    /// No record has the given id.
    #[error("no record with id {0}")]
    NotFound(String),

    /// Unsupported `--format` value.
    #[error("unknown output format '{0}' (expected text or json)")]
    UnknownFormat(String),
}

/// Result alias for commands.
pub type CliResult<T> = Result<T, CliError>;

/// Output format for read-only commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable lines.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl Format {
    /// Parses a `--format` value.
    pub fn parse(value: &str) -> CliResult<Self> {
        match value {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(CliError::UnknownFormat(other.to_string())),
        }
    }
}

/// Opens the store at `path`. Only `log` may create a new one.
pub fn open_store(path: &Path, create: bool) -> CliResult<FileRecordStore> {
    let config = StoreConfig::new().create_if_missing(create);
    Ok(FileRecordStore::open(path, config)?)
}
