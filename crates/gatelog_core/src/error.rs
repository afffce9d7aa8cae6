//! Error types for the record model.

use crate::payload::EntryType;
use thiserror::Error;

/// Result type for record construction.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised when a record would violate a model invariant.
///
/// These are construction-time errors: a record that fails any of these
/// checks never exists, so it can never reach a store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The payload variant does not match the declared entry type.
    #[error("payload of type {payload:?} does not match entry type {entry_type:?}")]
    PayloadMismatch {
        /// Declared entry type.
        entry_type: EntryType,
        /// Entry type implied by the payload variant.
        payload: EntryType,
    },

    /// A required field is missing or blank.
    #[error("required field `{field}` is empty")]
    MissingField {
        /// Field name.
        field: &'static str,
    },
}

impl CoreError {
    /// Creates a missing-field error.
    pub fn missing(field: &'static str) -> Self {
        Self::MissingField { field }
    }
}
