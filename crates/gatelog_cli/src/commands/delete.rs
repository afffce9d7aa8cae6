//! Delete command implementation.

use super::{open_store, CliError, CliResult};
use chrono::Utc;
use gatelog_core::RecordId;
use gatelog_storage::RecordStore;
use std::path::Path;
use tracing::info;

/// Soft-deletes the record `id`. Returns false if it was already deleted.
pub async fn soft_delete<S: RecordStore>(store: &S, id: &str) -> CliResult<bool> {
    let record_id = RecordId::parse_str(id).ok_or_else(|| CliError::InvalidId(id.to_string()))?;
    let mut record = store
        .get(record_id)
        .await?
        .ok_or_else(|| CliError::NotFound(id.to_string()))?;
    if record.is_deleted() {
        return Ok(false);
    }
    record.mark_deleted(Utc::now());
    store.put_one(record).await?;
    Ok(true)
}

/// Runs the delete command.
pub async fn run(path: &Path, id: &str) -> CliResult<()> {
    let store = open_store(path, false)?;
    if soft_delete(&store, id).await? {
        info!(id, "marked deleted; will sync on the next run");
    } else {
        println!("{id} is already deleted");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatelog_core::{EntryPayload, Record};
    use gatelog_storage::InMemoryRecordStore;

    fn synced() -> Record {
        Record::new("gate-1", "guard-7", EntryPayload::other("gate jammed"), Utc::now())
            .unwrap()
            .into_synced()
    }

    #[tokio::test]
    async fn deletion_is_a_pending_status_change() {
        let record = synced();
        let store = InMemoryRecordStore::with_records(vec![record.clone()]);

        assert!(soft_delete(&store, &record.id().to_string()).await.unwrap());
        let stored = store.get(record.id()).await.unwrap().unwrap();
        assert!(stored.is_deleted());
        assert!(stored.pending());

        assert!(!soft_delete(&store, &record.id().to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids() {
        let store = InMemoryRecordStore::new();
        assert!(matches!(
            soft_delete(&store, "not-a-uuid").await,
            Err(CliError::InvalidId(_))
        ));
        let missing = RecordId::new().to_string();
        assert!(matches!(
            soft_delete(&store, &missing).await,
            Err(CliError::NotFound(_))
        ));
    }
}
