//! Property-based test generators using proptest.
//!
//! Every generated record passes `Record::from_parts` validation.

use chrono::{DateTime, Duration, TimeZone, Utc};
use gatelog_core::{EntryPayload, Record, RecordId, RecordParts, RecordStatus};
use proptest::prelude::*;

/// Strategy for generating record ids.
pub fn record_id_strategy() -> impl Strategy<Value = RecordId> {
    prop::array::uniform16(any::<u8>()).prop_map(RecordId::from_bytes)
}

/// Strategy for instants within a few days of 2024-06-01, at millisecond
/// precision.
pub fn instant_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..(3 * 24 * 3600 * 1000)).prop_map(|ms| {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
            .single()
            .expect("valid base time")
            + Duration::milliseconds(ms)
    })
}

fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 ]{0,15}").expect("Invalid regex")
}

/// Strategy for generating valid payloads of every entry type.
pub fn payload_strategy() -> impl Strategy<Value = EntryPayload> {
    let note = || prop::option::of(text_strategy());
    prop_oneof![
        (text_strategy(), note()).prop_map(|(name, note)| {
            let payload = EntryPayload::personnel(name);
            match note {
                Some(note) => payload.with_note(note),
                None => payload,
            }
        }),
        (text_strategy(), note()).prop_map(|(plate, note)| {
            let payload = EntryPayload::vehicle(plate);
            match note {
                Some(note) => payload.with_note(note),
                None => payload,
            }
        }),
        (text_strategy(), note()).prop_map(|(description, note)| {
            let payload = EntryPayload::other(description);
            match note {
                Some(note) => payload.with_note(note),
                None => payload,
            }
        }),
    ]
}

/// Strategy for generating a non-pending record with the given id.
pub fn record_with_id_strategy(id: RecordId) -> impl Strategy<Value = Record> {
    (
        payload_strategy(),
        instant_strategy(),
        0i64..3600,
        any::<bool>(),
    )
        .prop_map(move |(payload, created_at, edit_secs, deleted)| {
            Record::from_parts(RecordParts {
                id,
                checkpoint_id: "gate-north".into(),
                logging_user_id: "guard-07".into(),
                entry_type: payload.entry_type(),
                client_timestamp: created_at,
                created_at,
                updated_at: created_at + Duration::seconds(edit_secs),
                status: if deleted {
                    RecordStatus::Deleted
                } else {
                    RecordStatus::Active
                },
                payload,
            })
            .expect("generated record is valid")
        })
}

/// Strategy for generating a non-pending record.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    record_id_strategy().prop_flat_map(record_with_id_strategy)
}

/// Strategy for a record that is either pending or not.
pub fn local_record_strategy() -> impl Strategy<Value = Record> {
    (record_strategy(), any::<bool>()).prop_map(|(mut record, pending)| {
        record.set_pending(pending);
        record
    })
}

/// Strategy for a local set and a pull response that overlap on some ids.
///
/// Returns `(local, pulled)`. Overlapping records carry different content on
/// each side.
pub fn overlapping_sets_strategy() -> impl Strategy<Value = (Vec<Record>, Vec<Record>)> {
    (
        prop::collection::vec(local_record_strategy(), 0..12),
        prop::collection::vec(record_strategy(), 0..12),
        prop::collection::vec(any::<prop::sample::Index>(), 0..6),
    )
        .prop_flat_map(|(local, fresh, picks)| {
            let shared: Vec<RecordId> = if local.is_empty() {
                Vec::new()
            } else {
                picks.iter().map(|i| i.get(&local).id()).collect()
            };
            let overwrites: Vec<_> = shared.into_iter().map(record_with_id_strategy).collect();
            (Just(local), Just(fresh), overwrites)
        })
        .prop_map(|(local, mut pulled, overwrites)| {
            pulled.extend(overwrites);
            (local, pulled)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_records_roundtrip_parts(record in record_strategy()) {
            prop_assert!(!record.pending());
            let rebuilt = Record::from_parts(record.to_parts()).unwrap();
            prop_assert_eq!(rebuilt, record);
        }
    }
}
