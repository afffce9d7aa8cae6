//! Inspect command implementation.

use super::{open_store, CliResult, Format};
use gatelog_core::{EntryType, Record, RecordStatus, Watermark, WATERMARK_KEY};
use gatelog_storage::RecordStore;
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Number of records.
    pub record_count: usize,
    /// Number of active records.
    pub active_count: usize,
    /// Number of soft-deleted records.
    pub deleted_count: usize,
    /// Number of records awaiting sync.
    pub pending_count: usize,
    /// Records per entry type.
    pub by_type: Vec<TypeCount>,
    /// Lower bound of the next pull, if any.
    pub watermark: Option<String>,
}

/// Record count for a single entry type.
#[derive(Debug, Serialize)]
pub struct TypeCount {
    /// Entry type.
    pub entry_type: EntryType,
    /// Number of records.
    pub count: usize,
}

/// Summarizes a set of records.
pub fn summarize(path: &Path, records: &[Record], watermark: Option<Watermark>) -> InspectResult {
    let by_type = EntryType::ALL
        .iter()
        .map(|&entry_type| TypeCount {
            entry_type,
            count: records
                .iter()
                .filter(|r| r.entry_type() == entry_type)
                .count(),
        })
        .collect();

    InspectResult {
        path: path.display().to_string(),
        record_count: records.len(),
        active_count: records
            .iter()
            .filter(|r| r.status() == RecordStatus::Active)
            .count(),
        deleted_count: records.iter().filter(|r| r.is_deleted()).count(),
        pending_count: records.iter().filter(|r| r.pending()).count(),
        by_type,
        watermark: watermark.map(Watermark::encode),
    }
}

/// Runs the inspect command.
pub async fn run(path: &Path, format: &str) -> CliResult<()> {
    let format = Format::parse(format)?;
    let store = open_store(path, false)?;
    let records = store.get_all().await?;
    let watermark = store
        .get_app_state(WATERMARK_KEY)
        .await?
        .as_deref()
        .and_then(Watermark::decode);

    let result = summarize(path, &records, watermark);
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Store: {}", result.path);
    println!();
    println!("Records:   {}", result.record_count);
    println!("  Active:  {}", result.active_count);
    println!("  Deleted: {}", result.deleted_count);
    println!("  Pending: {}", result.pending_count);
    println!();
    println!("By type:");
    for entry in &result.by_type {
        println!("  {:<10} {}", entry.entry_type.as_str(), entry.count);
    }
    println!();
    match &result.watermark {
        Some(w) => println!("Last sync watermark: {w}"),
        None => println!("Last sync watermark: never synced"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gatelog_core::EntryPayload;

    #[test]
    fn counts_by_status_and_type() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 6, 0, 0).unwrap();
        let person = Record::new("gate-1", "guard-7", EntryPayload::personnel("Asha"), now).unwrap();
        let truck = Record::new("gate-1", "guard-7", EntryPayload::vehicle("T 1"), now)
            .unwrap()
            .into_synced();
        let mut gone = Record::new("gate-1", "guard-7", EntryPayload::vehicle("T 2"), now)
            .unwrap()
            .into_synced();
        gone.mark_deleted(now);

        let result = summarize(
            Path::new("/tmp/store"),
            &[person, truck, gone],
            Some(Watermark::new(now)),
        );
        assert_eq!(result.record_count, 3);
        assert_eq!(result.active_count, 2);
        assert_eq!(result.deleted_count, 1);
        assert_eq!(result.pending_count, 2);
        let counts: Vec<usize> = result.by_type.iter().map(|t| t.count).collect();
        assert_eq!(counts, vec![1, 2, 0]);
        assert_eq!(result.watermark.as_deref(), Some("2024-06-03T06:00:00.000Z"));
    }

    #[test]
    fn json_uses_wire_names() {
        let result = summarize(Path::new("/tmp/store"), &[], None);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["by_type"][1]["entry_type"], "VEHICLE");
        assert!(json["watermark"].is_null());
    }
}
