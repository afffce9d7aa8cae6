//! On-disk snapshot format.
//!
//! ```text
//! +--------+---------+------------------+----------------+
//! | magic  | version | sha256(body)     | body (CBOR)    |
//! | 4 B    | 2 B LE  | 32 B             | variable       |
//! +--------+---------+------------------+----------------+
//! ```
//!
//! The body is a single CBOR map holding every record (with its local
//! pending flag) and the app-state table.

use crate::error::{StoreError, StoreResult};
use gatelog_core::{Record, RecordId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Snapshot file magic.
pub(crate) const MAGIC: [u8; 4] = *b"GLSN";
/// Current snapshot format version.
pub(crate) const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 32;

/// In-memory image of a store.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SnapshotState {
    pub records: BTreeMap<RecordId, Record>,
    pub app_state: BTreeMap<String, String>,
}

/// A record together with its local-only pending flag.
#[derive(Serialize, Deserialize)]
struct StoredRecord {
    record: Record,
    pending: bool,
}

#[derive(Serialize, Deserialize)]
struct SnapshotBody {
    records: Vec<StoredRecord>,
    app_state: BTreeMap<String, String>,
}

/// Encodes a state into snapshot bytes.
pub(crate) fn encode(state: &SnapshotState) -> StoreResult<Vec<u8>> {
    let body = SnapshotBody {
        records: state
            .records
            .values()
            .map(|r| StoredRecord {
                pending: r.pending(),
                record: r.clone(),
            })
            .collect(),
        app_state: state.app_state.clone(),
    };

    let mut body_bytes = Vec::new();
    ciborium::into_writer(&body, &mut body_bytes)
        .map_err(|e| StoreError::Encoding(e.to_string()))?;

    let mut out = Vec::with_capacity(HEADER_LEN + body_bytes.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&Sha256::digest(&body_bytes));
    out.extend_from_slice(&body_bytes);
    Ok(out)
}

/// Decodes snapshot bytes.
pub(crate) fn decode(bytes: &[u8]) -> StoreResult<SnapshotState> {
    if bytes.len() < HEADER_LEN {
        return Err(StoreError::Corrupted(format!(
            "snapshot too short: {} bytes",
            bytes.len()
        )));
    }
    if bytes[..4] != MAGIC {
        return Err(StoreError::Corrupted("bad snapshot magic".into()));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(StoreError::Corrupted(format!(
            "unsupported snapshot version {version}"
        )));
    }

    let body = &bytes[HEADER_LEN..];
    if Sha256::digest(body).as_slice() != &bytes[6..HEADER_LEN] {
        return Err(StoreError::Corrupted("snapshot checksum mismatch".into()));
    }

    let body: SnapshotBody =
        ciborium::from_reader(body).map_err(|e| StoreError::Corrupted(e.to_string()))?;

    let records = body
        .records
        .into_iter()
        .map(|stored| {
            let mut record = stored.record;
            record.set_pending(stored.pending);
            (record.id(), record)
        })
        .collect();

    Ok(SnapshotState {
        records,
        app_state: body.app_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gatelog_core::EntryPayload;

    fn state() -> SnapshotState {
        let pending = Record::new("g", "u", EntryPayload::vehicle("AB 12"), Utc::now()).unwrap();
        let synced = Record::new("g", "u", EntryPayload::other("x"), Utc::now())
            .unwrap()
            .into_synced();
        let mut state = SnapshotState::default();
        state.records.insert(pending.id(), pending);
        state.records.insert(synced.id(), synced);
        state
            .app_state
            .insert("lastSyncTimestamp".into(), "2024-01-01T00:00:00.000Z".into());
        state
    }

    #[test]
    fn pending_flag_survives() {
        let original = state();
        let decoded = decode(&encode(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.records.values().filter(|r| r.pending()).count(), 1);
    }

    #[test]
    fn flipped_byte_detected() {
        let mut bytes = encode(&state()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(decode(&bytes), Err(StoreError::Corrupted(_))));
    }

    #[test]
    fn bad_header_detected() {
        assert!(matches!(decode(b"GL"), Err(StoreError::Corrupted(_))));

        let mut bytes = encode(&state()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(StoreError::Corrupted(_))));

        let mut bytes = encode(&state()).unwrap();
        bytes[4] = 9;
        assert!(matches!(decode(&bytes), Err(StoreError::Corrupted(_))));
    }
}
