//! Log command implementation.

use super::{open_store, CliResult};
use chrono::Utc;
use gatelog_core::{EntryPayload, Record, RecordId};
use gatelog_storage::RecordStore;
use std::path::Path;
use tracing::debug;

/// Creates a pending record in `store`.
pub async fn create<S: RecordStore>(
    store: &S,
    checkpoint: &str,
    user: &str,
    payload: EntryPayload,
) -> CliResult<RecordId> {
    let record = Record::new(checkpoint, user, payload, Utc::now())?;
    let id = record.id();
    store.put_one(record).await?;
    debug!(%id, "logged entry");
    Ok(id)
}

/// Runs the log command.
pub async fn run(path: &Path, checkpoint: &str, user: &str, payload: EntryPayload) -> CliResult<()> {
    let store = open_store(path, true)?;
    let id = create(&store, checkpoint, user, payload).await?;
    println!("{id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CliError;
    use gatelog_storage::InMemoryRecordStore;

    #[tokio::test]
    async fn logged_entry_is_pending() {
        let store = InMemoryRecordStore::new();
        let id = create(&store, "gate-1", "guard-7", EntryPayload::vehicle("T 123 ABC"))
            .await
            .unwrap();

        let record = store.get(id).await.unwrap().unwrap();
        assert!(record.pending());
        assert_eq!(record.checkpoint_id(), "gate-1");
    }

    #[tokio::test]
    async fn blank_fields_are_refused() {
        let store = InMemoryRecordStore::new();
        let err = create(&store, "gate-1", "guard-7", EntryPayload::personnel("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Record(_)));
        assert!(store.is_empty());
    }
}
