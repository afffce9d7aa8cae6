//! Record fixtures and store helpers.

use chrono::{DateTime, Duration, TimeZone, Utc};
use gatelog_core::{EntryPayload, Record, RecordParts};
use gatelog_storage::{FileRecordStore, StoreConfig};
use tempfile::TempDir;

/// Checkpoint used by every fixture.
pub const CHECKPOINT: &str = "gate-north";

/// Logging user used by every fixture.
pub const GUARD: &str = "guard-07";

/// A fixed instant for reproducible tests.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 6, 0, 0)
        .single()
        .expect("valid fixture time")
}

/// `base_time()` plus `minutes`.
pub fn at_minute(minutes: i64) -> DateTime<Utc> {
    base_time() + Duration::minutes(minutes)
}

/// A new pending personnel entry.
pub fn personnel(full_name: &str) -> Record {
    Record::new(CHECKPOINT, GUARD, EntryPayload::personnel(full_name), base_time())
        .expect("valid personnel fixture")
}

/// A new pending vehicle entry.
pub fn vehicle(plate_number: &str) -> Record {
    Record::new(CHECKPOINT, GUARD, EntryPayload::vehicle(plate_number), base_time())
        .expect("valid vehicle fixture")
}

/// A new pending free-form entry.
pub fn other(description: &str) -> Record {
    Record::new(CHECKPOINT, GUARD, EntryPayload::other(description), base_time())
        .expect("valid other fixture")
}

/// `record` with its note replaced, keeping every other field.
///
/// The result is not pending, as if it came off the wire.
pub fn with_note(record: &Record, note: &str) -> Record {
    let mut parts: RecordParts = record.to_parts();
    parts.payload = parts.payload.with_note(note);
    Record::from_parts(parts).expect("valid edited fixture")
}

/// `record` edited locally: new note, bumped `updated_at`, pending.
pub fn edited_locally(record: &Record, note: &str, at: DateTime<Utc>) -> Record {
    let mut parts: RecordParts = record.to_parts();
    parts.payload = parts.payload.with_note(note);
    parts.updated_at = at.max(parts.updated_at);
    let mut edited = Record::from_parts(parts).expect("valid edited fixture");
    edited.set_pending(true);
    edited
}

/// A file store in a temporary directory that is removed on drop.
pub struct TestFileStore {
    /// The store.
    pub store: FileRecordStore,
    /// The temporary directory (kept alive to prevent cleanup).
    pub dir: TempDir,
}

impl TestFileStore {
    /// Opens a fresh file store.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileRecordStore::open(dir.path(), StoreConfig::default())
            .expect("Failed to open file store");
        Self { store, dir }
    }

    /// Closes the store and opens it again from disk.
    pub fn reopen(self) -> Self {
        let Self { store, dir } = self;
        drop(store);
        let store = FileRecordStore::open(dir.path(), StoreConfig::default())
            .expect("Failed to reopen file store");
        Self { store, dir }
    }
}

impl Default for TestFileStore {
    fn default() -> Self {
        Self::new()
    }
}
