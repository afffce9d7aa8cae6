//! Pending command implementation.

use super::{open_store, CliResult, Format};
use chrono::{DateTime, Utc};
use gatelog_core::{EntryType, Record, RecordStatus};
use gatelog_storage::RecordStore;
use gatelog_sync_engine::pending;
use serde::Serialize;
use std::path::Path;

/// A record awaiting synchronization.
#[derive(Debug, Serialize)]
pub struct PendingEntry {
    /// Record id.
    pub id: String,
    /// Entry type.
    pub entry_type: EntryType,
    /// Lifecycle status.
    pub status: RecordStatus,
    /// Checkpoint the entry was made at.
    pub checkpoint_id: String,
    /// Name, plate or description.
    pub summary: String,
    /// Last local modification.
    pub updated_at: DateTime<Utc>,
}

impl From<&Record> for PendingEntry {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id().to_string(),
            entry_type: record.entry_type(),
            status: record.status(),
            checkpoint_id: record.checkpoint_id().to_string(),
            summary: record.payload().summary().to_string(),
            updated_at: record.updated_at(),
        }
    }
}

/// Runs the pending command.
pub async fn run(path: &Path, format: &str) -> CliResult<()> {
    let format = Format::parse(format)?;
    let store = open_store(path, false)?;
    let entries: Vec<PendingEntry> = pending(&store.get_all().await?)
        .iter()
        .map(PendingEntry::from)
        .collect();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        Format::Text => {
            if entries.is_empty() {
                println!("Nothing pending.");
            }
            for entry in &entries {
                let deleted = if entry.status == RecordStatus::Deleted {
                    " (deleted)"
                } else {
                    ""
                };
                println!(
                    "{}  {:<9} {}  {}{}",
                    entry.id,
                    entry.entry_type.as_str(),
                    entry.updated_at.format("%Y-%m-%d %H:%M"),
                    entry.summary,
                    deleted
                );
            }
        }
    }
    Ok(())
}
