//! The synchronizable checkpoint record.

use crate::error::{CoreError, CoreResult};
use crate::id::RecordId;
use crate::payload::{EntryPayload, EntryType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a record.
///
/// Deletion is a status transition, never a removal, so that it syncs like
/// any other mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    /// Live entry.
    #[default]
    Active,
    /// Soft-deleted entry.
    Deleted,
}

/// The raw fields of a record, exactly as they travel on the wire.
///
/// Converting parts into a [`Record`] runs every model check; this is the
/// only way (besides [`Record::new`]) to obtain a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordParts {
    /// Record identifier.
    pub id: RecordId,
    /// Checkpoint the entry was logged at.
    pub checkpoint_id: String,
    /// Operator who logged the entry.
    pub logging_user_id: String,
    /// Entry classification.
    pub entry_type: EntryType,
    /// Client-observed creation instant.
    pub client_timestamp: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last overwrite timestamp.
    pub updated_at: DateTime<Utc>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: RecordStatus,
    /// Type-specific content.
    pub payload: EntryPayload,
}

/// One checkpoint-logging entry.
///
/// `id`, `checkpoint_id`, `logging_user_id` and `entry_type` are fixed at
/// creation. `pending` is local-only state: it is never serialized, and a
/// deserialized record always starts out as not pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RecordParts", into = "RecordParts")]
pub struct Record {
    id: RecordId,
    checkpoint_id: String,
    logging_user_id: String,
    entry_type: EntryType,
    client_timestamp: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    status: RecordStatus,
    payload: EntryPayload,
    pending: bool,
}

impl Record {
    /// Creates a new local record.
    ///
    /// The record gets a fresh random id, its entry type is taken from the
    /// payload, and it starts out pending.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is blank.
    pub fn new(
        checkpoint_id: impl Into<String>,
        logging_user_id: impl Into<String>,
        payload: EntryPayload,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let mut record = Self::from_parts(RecordParts {
            id: RecordId::new(),
            checkpoint_id: checkpoint_id.into(),
            logging_user_id: logging_user_id.into(),
            entry_type: payload.entry_type(),
            client_timestamp: now,
            created_at: now,
            updated_at: now,
            status: RecordStatus::Active,
            payload,
        })?;
        record.pending = true;
        Ok(record)
    }

    /// Builds a record from raw parts, checking every invariant.
    ///
    /// The result is not pending.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PayloadMismatch`] if the payload variant does not
    /// match `entry_type`, or [`CoreError::MissingField`] for blank required
    /// fields.
    pub fn from_parts(parts: RecordParts) -> CoreResult<Self> {
        if parts.payload.entry_type() != parts.entry_type {
            return Err(CoreError::PayloadMismatch {
                entry_type: parts.entry_type,
                payload: parts.payload.entry_type(),
            });
        }
        if parts.checkpoint_id.trim().is_empty() {
            return Err(CoreError::missing("checkpointId"));
        }
        if parts.logging_user_id.trim().is_empty() {
            return Err(CoreError::missing("loggingUserId"));
        }
        parts.payload.validate()?;

        Ok(Self {
            id: parts.id,
            checkpoint_id: parts.checkpoint_id,
            logging_user_id: parts.logging_user_id,
            entry_type: parts.entry_type,
            client_timestamp: parts.client_timestamp,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            status: parts.status,
            payload: parts.payload,
            pending: false,
        })
    }

    /// Returns the raw parts (without the local pending flag).
    #[must_use]
    pub fn to_parts(&self) -> RecordParts {
        RecordParts {
            id: self.id,
            checkpoint_id: self.checkpoint_id.clone(),
            logging_user_id: self.logging_user_id.clone(),
            entry_type: self.entry_type,
            client_timestamp: self.client_timestamp,
            created_at: self.created_at,
            updated_at: self.updated_at,
            status: self.status,
            payload: self.payload.clone(),
        }
    }

    /// Returns the record id.
    #[must_use]
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Returns the checkpoint id.
    #[must_use]
    pub fn checkpoint_id(&self) -> &str {
        &self.checkpoint_id
    }

    /// Returns the logging operator's id.
    #[must_use]
    pub fn logging_user_id(&self) -> &str {
        &self.logging_user_id
    }

    /// Returns the entry type.
    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// Returns the client-observed creation instant.
    #[must_use]
    pub fn client_timestamp(&self) -> DateTime<Utc> {
        self.client_timestamp
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last-updated timestamp.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub fn status(&self) -> RecordStatus {
        self.status
    }

    /// Returns true if the record is soft-deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.status == RecordStatus::Deleted
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &EntryPayload {
        &self.payload
    }

    /// Returns true if the record has no confirmed server acknowledgment.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.pending
    }

    /// Sets the local pending flag.
    ///
    /// Only the store layer and the reconciliation engine should need this.
    pub fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    /// Marks the record as acknowledged by the remote authority.
    #[must_use]
    pub fn into_synced(mut self) -> Self {
        self.pending = false;
        self
    }

    /// Soft-deletes the record locally.
    ///
    /// The deletion becomes a pending mutation that syncs on the next run.
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.status = RecordStatus::Deleted;
        self.updated_at = now.max(self.updated_at);
        self.pending = true;
    }

    /// Compares every field except the local pending flag.
    #[must_use]
    pub fn same_content(&self, other: &Record) -> bool {
        self.id == other.id
            && self.checkpoint_id == other.checkpoint_id
            && self.logging_user_id == other.logging_user_id
            && self.entry_type == other.entry_type
            && self.client_timestamp == other.client_timestamp
            && self.created_at == other.created_at
            && self.updated_at == other.updated_at
            && self.status == other.status
            && self.payload == other.payload
    }
}

impl TryFrom<RecordParts> for Record {
    type Error = CoreError;

    fn try_from(parts: RecordParts) -> Result<Self, Self::Error> {
        Self::from_parts(parts)
    }
}

impl From<Record> for RecordParts {
    fn from(record: Record) -> Self {
        RecordParts {
            id: record.id,
            checkpoint_id: record.checkpoint_id,
            logging_user_id: record.logging_user_id,
            entry_type: record.entry_type,
            client_timestamp: record.client_timestamp,
            created_at: record.created_at,
            updated_at: record.updated_at,
            status: record.status,
            payload: record.payload,
        }
    }
}

/// Sorts records for display, most recent client timestamp first.
///
/// Ties are broken by id so the order is stable across reloads.
pub fn sort_for_display(records: &mut [Record]) {
    records.sort_by(|a, b| {
        b.client_timestamp
            .cmp(&a.client_timestamp)
            .then_with(|| a.id.cmp(&b.id))
    });
}
