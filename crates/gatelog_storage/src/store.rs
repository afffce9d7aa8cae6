//! Record store trait definition.

use crate::error::StoreResult;
use async_trait::async_trait;
use gatelog_core::{Record, RecordId};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::watch;

/// Monotonic counter bumped after every successful store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StoreRevision(pub u64);

impl StoreRevision {
    /// Returns the next revision.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for StoreRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rev:{}", self.0)
    }
}

/// Durable local storage for checkpoint records.
///
/// The store is the single source of truth for record state. Views that
/// derive from it (such as the pending set) subscribe to [`subscribe`] and
/// re-read after every revision.
///
/// # Invariants
///
/// - Records are keyed by id; `put_*` is an upsert
/// - `put_many` is all-or-nothing: on error, no record in the batch was written
/// - Records are never removed; deletion is a status change on the record
/// - `acknowledge` checks and flips under the same write, so an edit made
///   after a record was sent is never overwritten
/// - The revision is bumped only after a write succeeded
///
/// [`subscribe`]: RecordStore::subscribe
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns every record, in no particular order.
    async fn get_all(&self) -> StoreResult<Vec<Record>>;

    /// Returns the record with the given id.
    async fn get(&self, id: RecordId) -> StoreResult<Option<Record>> {
        Ok(self.get_all().await?.into_iter().find(|r| r.id() == id))
    }

    /// Inserts or replaces a single record.
    async fn put_one(&self, record: Record) -> StoreResult<()>;

    /// Inserts or replaces a batch of records atomically.
    async fn put_many(&self, records: Vec<Record>) -> StoreResult<()>;

    /// Clears `pending` on every record whose stored copy is still pending
    /// and has the same content as the one in `sent`.
    ///
    /// The check and the write are one atomic step. A record edited after it
    /// was sent keeps its newer content and stays pending. Returns the ids
    /// that were flipped; nothing is written if none were.
    async fn acknowledge(&self, sent: Vec<Record>) -> StoreResult<Vec<RecordId>>;

    /// Reads a value from the app-state side table.
    async fn get_app_state(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes a value to the app-state side table.
    async fn set_app_state(&self, key: &str, value: String) -> StoreResult<()>;

    /// Subscribes to store change notifications.
    fn subscribe(&self) -> watch::Receiver<StoreRevision>;
}

/// Flips the unchanged records of `sent` in `records`.
pub(crate) fn acknowledge_in(
    records: &mut BTreeMap<RecordId, Record>,
    sent: &[Record],
) -> Vec<RecordId> {
    let mut flipped = Vec::new();
    for record in sent {
        if let Some(stored) = records.get_mut(&record.id()) {
            if stored.pending() && stored.same_content(record) {
                stored.set_pending(false);
                flipped.push(record.id());
            }
        }
    }
    flipped
}
