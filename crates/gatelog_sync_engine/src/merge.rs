//! Server-wins merge of pulled records.

use gatelog_core::{Record, RecordId};
use std::collections::{BTreeMap, HashMap};

/// Writes needed to fold a pull response into the local store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergePlan {
    /// Records to upsert, all non-pending.
    pub writes: Vec<Record>,
    /// Pulled records that did not exist locally.
    pub inserted: usize,
    /// Local records replaced by the server's version.
    pub overwritten: usize,
    /// Pulled records already stored exactly as received.
    pub unchanged: usize,
}

impl MergePlan {
    /// Returns true if the merge changes nothing.
    pub fn is_noop(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Plans a server-wins merge of `pulled` into `local`.
///
/// Every pulled record replaces the local record with the same id, pending
/// or not, and is stored as not pending. Local records absent from the pull
/// are untouched. When the pull repeats an id, the later entry wins. Records
/// already stored exactly as received produce no write, so merging the same
/// response twice is a no-op the second time.
pub fn merge_pulled(local: &[Record], pulled: Vec<Record>) -> MergePlan {
    let local: HashMap<RecordId, &Record> = local.iter().map(|r| (r.id(), r)).collect();
    let pulled: BTreeMap<RecordId, Record> = pulled
        .into_iter()
        .map(|r| (r.id(), r.into_synced()))
        .collect();

    let mut plan = MergePlan::default();
    for (id, incoming) in pulled {
        match local.get(&id) {
            Some(existing) if **existing == incoming => plan.unchanged += 1,
            Some(_) => {
                plan.overwritten += 1;
                plan.writes.push(incoming);
            }
            None => {
                plan.inserted += 1;
                plan.writes.push(incoming);
            }
        }
    }
    plan
}
