//! Pending-set tracking.
//!
//! The pending set is every record whose `pending` flag is set, deleted
//! records included. It is always derived from the store, never kept as a
//! second source of truth.

use gatelog_core::{sort_for_display, Record, RecordId};
use gatelog_storage::{RecordStore, StoreResult, StoreRevision};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Returns the pending records of `records`, newest first.
pub fn pending(records: &[Record]) -> Vec<Record> {
    let mut pending: Vec<Record> = records.iter().filter(|r| r.pending()).cloned().collect();
    sort_for_display(&mut pending);
    pending
}

/// A snapshot of the pending set at one store revision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingSet {
    revision: StoreRevision,
    records: Vec<Record>,
}

impl PendingSet {
    /// Derives the pending set from a full read of the store.
    pub fn from_records(revision: StoreRevision, records: &[Record]) -> Self {
        Self {
            revision,
            records: pending(records),
        }
    }

    /// Store revision this snapshot was derived from.
    pub fn revision(&self) -> StoreRevision {
        self.revision
    }

    /// Pending records, newest first.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of pending records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns true if the record with `id` is pending.
    pub fn contains(&self, id: RecordId) -> bool {
        self.records.iter().any(|r| r.id() == id)
    }

    /// Ids of the pending records.
    pub fn ids(&self) -> Vec<RecordId> {
        self.records.iter().map(Record::id).collect()
    }
}

/// Keeps an observable pending set up to date with a store.
///
/// A background task re-derives the set after every store revision. The
/// task stops when the tracker is dropped.
pub struct PendingTracker {
    store: Arc<dyn RecordStore>,
    tx: watch::Sender<PendingSet>,
    task: JoinHandle<()>,
}

impl PendingTracker {
    /// Reads the initial pending set and starts tracking `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial read fails.
    pub async fn spawn<S: RecordStore + 'static>(store: Arc<S>) -> StoreResult<Self> {
        // Subscribe before reading so no write falls between the two.
        let mut revisions = store.subscribe();
        let revision = *revisions.borrow_and_update();
        let initial = PendingSet::from_records(revision, &store.get_all().await?);
        let (tx, _) = watch::channel(initial);
        let store: Arc<dyn RecordStore> = store;

        let task = tokio::spawn(follow(Arc::clone(&store), revisions, tx.clone()));

        Ok(Self { store, tx, task })
    }

    /// Returns the current pending set.
    pub fn current(&self) -> PendingSet {
        self.tx.borrow().clone()
    }

    /// Subscribes to pending-set updates.
    pub fn subscribe(&self) -> watch::Receiver<PendingSet> {
        self.tx.subscribe()
    }

    /// Re-derives the pending set immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn refresh(&self) -> StoreResult<PendingSet> {
        let revision = *self.store.subscribe().borrow();
        let set = PendingSet::from_records(revision, &self.store.get_all().await?);
        self.tx.send_replace(set.clone());
        Ok(set)
    }
}

async fn follow(
    store: Arc<dyn RecordStore>,
    mut revisions: watch::Receiver<StoreRevision>,
    tx: watch::Sender<PendingSet>,
) {
    while revisions.changed().await.is_ok() {
        let revision = *revisions.borrow_and_update();
        match store.get_all().await {
            Ok(records) => {
                let set = PendingSet::from_records(revision, &records);
                debug!(%revision, pending = set.len(), "pending set refreshed");
                tx.send_replace(set);
            }
            Err(e) => warn!(%revision, error = %e, "failed to refresh pending set"),
        }
    }
}

impl Drop for PendingTracker {
    fn drop(&mut self) {
        self.task.abort();
    }
}
