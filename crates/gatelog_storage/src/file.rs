//! File-backed record store.

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::snapshot::{self, SnapshotState};
use crate::store::{acknowledge_in, RecordStore, StoreRevision};
use async_trait::async_trait;
use fs2::FileExt;
use gatelog_core::{Record, RecordId};
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

/// File names within the store directory.
const LOCK_FILE: &str = "LOCK";
const SNAPSHOT_FILE: &str = "records.snap";
/// Temporary file for atomic snapshot writes.
const SNAPSHOT_TEMP: &str = "records.snap.tmp";

/// A durable record store kept in a directory:
///
/// ```text
/// <store_path>/
/// ├─ LOCK              # Advisory lock for single-process access
/// └─ records.snap      # Checksummed CBOR snapshot
/// ```
///
/// Every write produces a complete new snapshot that replaces the old one
/// with an atomic rename, so `put_many` is all-or-nothing across crashes.
/// The in-memory image is swapped only after the file write succeeded; a
/// failed write leaves both memory and disk at the previous state.
///
/// Reads are served from memory. File I/O runs on the blocking pool.
///
/// # Example
///
/// ```rust,ignore
/// use gatelog_storage::{FileRecordStore, StoreConfig};
///
/// let store = FileRecordStore::open(Path::new("gate_data"), StoreConfig::default())?;
/// store.put_one(record).await?;
/// ```
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    config: StoreConfig,
    state: RwLock<SnapshotState>,
    /// Serialises writers so snapshots are produced in order.
    writer: Mutex<()>,
    revision: watch::Sender<StoreRevision>,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl FileRecordStore {
    /// Opens or creates a store directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `Locked`)
    /// - The snapshot is corrupted
    /// - I/O errors occur
    pub fn open(path: &Path, config: StoreConfig) -> StoreResult<Self> {
        if !path.exists() {
            if config.create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StoreError::Missing(path.display().to_string()));
            }
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }

        // A leftover temp file is an interrupted write; the old snapshot wins.
        let temp = path.join(SNAPSHOT_TEMP);
        if temp.exists() {
            warn!(path = ?temp, "discarding interrupted snapshot write");
            fs::remove_file(&temp)?;
        }

        let snapshot_path = path.join(SNAPSHOT_FILE);
        let state = if snapshot_path.exists() {
            snapshot::decode(&fs::read(&snapshot_path)?)?
        } else {
            SnapshotState::default()
        };
        debug!(path = ?path, records = state.records.len(), "opened record store");

        let (revision, _) = watch::channel(StoreRevision::default());
        Ok(Self {
            inner: Arc::new(Inner {
                path: path.to_path_buf(),
                config,
                state: RwLock::new(state),
                writer: Mutex::new(()),
                revision,
                _lock_file: lock_file,
            }),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.read().records.len()
    }

    /// Returns true if no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies a mutation to a copy of the state, persists it, then publishes it.
    async fn commit<F>(&self, mutate: F) -> StoreResult<()>
    where
        F: FnOnce(&mut SnapshotState),
    {
        self.commit_with(|state| {
            mutate(state);
            Some(())
        })
        .await
        .map(|_| ())
    }

    /// Like [`commit`](Self::commit), but `mutate` decides under the writer
    /// lock whether anything changed. `None` skips the write.
    async fn commit_with<F, T>(&self, mutate: F) -> StoreResult<Option<T>>
    where
        F: FnOnce(&mut SnapshotState) -> Option<T>,
    {
        let _writer = self.inner.writer.lock().await;

        let mut next = self.inner.state.read().clone();
        let Some(result) = mutate(&mut next) else {
            return Ok(None);
        };
        let bytes = snapshot::encode(&next)?;

        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.write_snapshot(&bytes))
            .await
            .map_err(|e| StoreError::other(format!("snapshot writer panicked: {e}")))??;

        *self.inner.state.write() = next;
        self.inner.revision.send_modify(|rev| *rev = rev.next());
        Ok(Some(result))
    }
}

impl Inner {
    fn write_snapshot(&self, bytes: &[u8]) -> StoreResult<()> {
        let temp = self.path.join(SNAPSHOT_TEMP);
        {
            let mut file = File::create(&temp)?;
            file.write_all(bytes)?;
            if self.config.sync_on_write {
                file.sync_all()?;
            }
        }
        fs::rename(&temp, self.path.join(SNAPSHOT_FILE))?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn get_all(&self) -> StoreResult<Vec<Record>> {
        Ok(self.inner.state.read().records.values().cloned().collect())
    }

    async fn get(&self, id: RecordId) -> StoreResult<Option<Record>> {
        Ok(self.inner.state.read().records.get(&id).cloned())
    }

    async fn put_one(&self, record: Record) -> StoreResult<()> {
        self.commit(|state| {
            state.records.insert(record.id(), record);
        })
        .await
    }

    async fn put_many(&self, records: Vec<Record>) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.commit(|state| {
            for record in records {
                state.records.insert(record.id(), record);
            }
        })
        .await
    }

    async fn acknowledge(&self, sent: Vec<Record>) -> StoreResult<Vec<RecordId>> {
        let flipped = self
            .commit_with(|state| {
                let flipped = acknowledge_in(&mut state.records, &sent);
                (!flipped.is_empty()).then_some(flipped)
            })
            .await?;
        Ok(flipped.unwrap_or_default())
    }

    async fn get_app_state(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.inner.state.read().app_state.get(key).cloned())
    }

    async fn set_app_state(&self, key: &str, value: String) -> StoreResult<()> {
        let key = key.to_string();
        self.commit(|state| {
            state.app_state.insert(key, value);
        })
        .await
    }

    fn subscribe(&self) -> watch::Receiver<StoreRevision> {
        self.inner.revision.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gatelog_core::EntryPayload;
    use tempfile::tempdir;

    fn record(plate: &str) -> Record {
        Record::new("gate-1", "op-1", EntryPayload::vehicle(plate), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        let pending = record("KAA 001");
        let synced = record("KAA 002").into_synced();

        {
            let store = FileRecordStore::open(dir.path(), StoreConfig::default()).unwrap();
            store
                .put_many(vec![pending.clone(), synced.clone()])
                .await
                .unwrap();
            store
                .set_app_state("lastSyncTimestamp", "2024-05-01T10:00:00.000Z".into())
                .await
                .unwrap();
        }

        let store = FileRecordStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(pending.id()).await.unwrap(), Some(pending));
        assert_eq!(store.get(synced.id()).await.unwrap(), Some(synced));
        assert_eq!(
            store.get_app_state("lastSyncTimestamp").await.unwrap().as_deref(),
            Some("2024-05-01T10:00:00.000Z")
        );
    }

    #[tokio::test]
    async fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = FileRecordStore::open(dir.path(), StoreConfig::default()).unwrap();
        let second = FileRecordStore::open(dir.path(), StoreConfig::default());
        assert!(matches!(second, Err(StoreError::Locked)));
    }

    #[test]
    fn missing_directory_without_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope");
        let result = FileRecordStore::open(&path, StoreConfig::new().create_if_missing(false));
        assert!(matches!(result, Err(StoreError::Missing(_))));
    }

    #[tokio::test]
    async fn corrupted_snapshot_refused() {
        let dir = tempdir().unwrap();
        {
            let store = FileRecordStore::open(dir.path(), StoreConfig::default()).unwrap();
            store.put_one(record("KAA 003")).await.unwrap();
        }
        let snap = dir.path().join(SNAPSHOT_FILE);
        let mut bytes = fs::read(&snap).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        fs::write(&snap, bytes).unwrap();

        let result = FileRecordStore::open(dir.path(), StoreConfig::default());
        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }

    #[tokio::test]
    async fn interrupted_write_is_discarded() {
        let dir = tempdir().unwrap();
        let kept = record("KAA 004");
        {
            let store = FileRecordStore::open(dir.path(), StoreConfig::default()).unwrap();
            store.put_one(kept.clone()).await.unwrap();
        }
        fs::write(dir.path().join(SNAPSHOT_TEMP), b"half a snapshot").unwrap();

        let store = FileRecordStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.get_all().await.unwrap(), vec![kept]);
        assert!(!dir.path().join(SNAPSHOT_TEMP).exists());
    }

    #[tokio::test]
    async fn acknowledge_persists_flips_and_keeps_edits() {
        let dir = tempdir().unwrap();
        let accepted = record("KAA 006");
        let sent = record("KAA 007");
        let mut edited = sent.clone();
        edited.mark_deleted(Utc::now());
        {
            let store = FileRecordStore::open(dir.path(), StoreConfig::default()).unwrap();
            store
                .put_many(vec![accepted.clone(), edited.clone()])
                .await
                .unwrap();
            let flipped = store
                .acknowledge(vec![accepted.clone(), sent.clone()])
                .await
                .unwrap();
            assert_eq!(flipped, vec![accepted.id()]);
        }

        let store = FileRecordStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert!(!store.get(accepted.id()).await.unwrap().unwrap().pending());
        assert_eq!(store.get(sent.id()).await.unwrap(), Some(edited));
    }

    #[tokio::test]
    async fn writes_notify_subscribers() {
        let dir = tempdir().unwrap();
        let store = FileRecordStore::open(dir.path(), StoreConfig::default()).unwrap();
        let mut rx = store.subscribe();

        store.put_one(record("KAA 005")).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), StoreRevision(1));
    }
}
