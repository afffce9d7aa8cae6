//! In-memory record store.

use crate::error::StoreResult;
use crate::store::{acknowledge_in, RecordStore, StoreRevision};
use async_trait::async_trait;
use gatelog_core::{Record, RecordId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tokio::sync::watch;

/// An in-memory record store.
///
/// Suitable for:
/// - Unit and integration tests
/// - Ephemeral sessions that don't need persistence
///
/// # Example
///
/// ```rust,ignore
/// use gatelog_storage::{InMemoryRecordStore, RecordStore};
///
/// let store = InMemoryRecordStore::new();
/// store.put_one(record.clone()).await?;
/// assert_eq!(store.get(record.id()).await?, Some(record));
/// ```
#[derive(Debug)]
pub struct InMemoryRecordStore {
    records: RwLock<BTreeMap<RecordId, Record>>,
    app_state: RwLock<BTreeMap<String, String>>,
    revision: watch::Sender<StoreRevision>,
}

impl InMemoryRecordStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    /// Creates a store pre-populated with records.
    #[must_use]
    pub fn with_records(records: Vec<Record>) -> Self {
        let (revision, _) = watch::channel(StoreRevision::default());
        Self {
            records: RwLock::new(records.into_iter().map(|r| (r.id(), r)).collect()),
            app_state: RwLock::new(BTreeMap::new()),
            revision,
        }
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns the current revision.
    #[must_use]
    pub fn revision(&self) -> StoreRevision {
        *self.revision.borrow()
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev = rev.next());
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_all(&self) -> StoreResult<Vec<Record>> {
        Ok(self.records.read().values().cloned().collect())
    }

    async fn get(&self, id: RecordId) -> StoreResult<Option<Record>> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn put_one(&self, record: Record) -> StoreResult<()> {
        self.records.write().insert(record.id(), record);
        self.bump();
        Ok(())
    }

    async fn put_many(&self, records: Vec<Record>) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        {
            let mut map = self.records.write();
            for record in records {
                map.insert(record.id(), record);
            }
        }
        self.bump();
        Ok(())
    }

    async fn acknowledge(&self, sent: Vec<Record>) -> StoreResult<Vec<RecordId>> {
        let flipped = acknowledge_in(&mut self.records.write(), &sent);
        if !flipped.is_empty() {
            self.bump();
        }
        Ok(flipped)
    }

    async fn get_app_state(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.app_state.read().get(key).cloned())
    }

    async fn set_app_state(&self, key: &str, value: String) -> StoreResult<()> {
        self.app_state.write().insert(key.to_string(), value);
        self.bump();
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<StoreRevision> {
        self.revision.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gatelog_core::EntryPayload;

    fn record(name: &str) -> Record {
        Record::new("gate-1", "op-1", EntryPayload::personnel(name), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn put_and_get() {
        let store = InMemoryRecordStore::new();
        let r = record("Ann");
        store.put_one(r.clone()).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(r.id()).await.unwrap(), Some(r));
        assert_eq!(store.get(RecordId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_many_upserts() {
        let a = record("Ann");
        let b = record("Ben");
        let store = InMemoryRecordStore::with_records(vec![a.clone()]);

        let synced_a = a.clone().into_synced();
        store.put_many(vec![synced_a.clone(), b.clone()]).await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(a.id()).await.unwrap(), Some(synced_a));
    }

    #[tokio::test]
    async fn acknowledge_flips_only_unchanged_pending_records() {
        let sent = record("Ann");
        let other = record("Ben");
        let mut deleted_since = sent.clone();
        deleted_since.mark_deleted(Utc::now());
        let store = InMemoryRecordStore::with_records(vec![deleted_since.clone(), other.clone()]);

        let flipped = store
            .acknowledge(vec![sent.clone(), other.clone()])
            .await
            .unwrap();
        assert_eq!(flipped, vec![other.id()]);
        assert_eq!(store.get(sent.id()).await.unwrap(), Some(deleted_since));
        assert!(!store.get(other.id()).await.unwrap().unwrap().pending());
    }

    #[tokio::test]
    async fn acknowledge_without_flips_is_not_a_write() {
        let store = InMemoryRecordStore::new();
        assert!(store.acknowledge(vec![record("Ann")]).await.unwrap().is_empty());
        assert_eq!(store.revision(), StoreRevision(0));
    }

    #[tokio::test]
    async fn app_state_roundtrip() {
        let store = InMemoryRecordStore::new();
        assert_eq!(store.get_app_state("k").await.unwrap(), None);
        store.set_app_state("k", "v".into()).await.unwrap();
        assert_eq!(store.get_app_state("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn writes_bump_revision() {
        let store = InMemoryRecordStore::new();
        let mut rx = store.subscribe();
        assert_eq!(*rx.borrow(), StoreRevision(0));

        store.put_one(record("Ann")).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), StoreRevision(1));

        // Empty batches are not a write.
        store.put_many(Vec::new()).await.unwrap();
        assert_eq!(store.revision(), StoreRevision(1));
    }
}
